use criterion::{Criterion, criterion_group, criterion_main};
use domain::{CartService, CheckoutRequest, validate_checkout};
use store::{
    CartLineKey, InMemoryStore, Item, ItemId, Money, NewCartLine, OrderRequestLine,
    ShippingAddress, User, UserId,
};

fn seeded_service(rt: &tokio::runtime::Runtime) -> CartService<InMemoryStore> {
    let store = InMemoryStore::new();
    rt.block_on(async {
        store
            .put_user(User {
                id: UserId::new(1),
                email: "bench@example.com".to_string(),
                first_name: "Bench".to_string(),
                last_name: "Reader".to_string(),
                activated: true,
            })
            .await;
        store
            .put_item(Item::new(ItemId::new(1), "Bench Book", Money::from_minor(1000), 1_000))
            .await;
    });
    CartService::new(store)
}

fn bench_add_and_remove_line(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let service = seeded_service(&rt);
    let line = NewCartLine {
        user_id: UserId::new(1),
        item_id: ItemId::new(1),
        quantity: 2,
    };

    c.bench_function("domain/cart_add_remove", |b| {
        b.iter(|| {
            rt.block_on(async {
                let created = service.add_line(line).await.unwrap();
                service
                    .remove_line(CartLineKey::Id(created.id))
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_update_quantity(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let service = seeded_service(&rt);
    let key = CartLineKey::UserItem {
        user_id: UserId::new(1),
        item_id: ItemId::new(1),
    };
    rt.block_on(async {
        service
            .add_line(NewCartLine {
                user_id: UserId::new(1),
                item_id: ItemId::new(1),
                quantity: 1,
            })
            .await
            .unwrap()
    });

    c.bench_function("domain/cart_update_quantity", |b| {
        let mut quantity = 0;
        b.iter(|| {
            quantity = quantity % 10 + 1;
            rt.block_on(async { service.update_quantity(key, quantity).await.unwrap() });
        });
    });
}

fn bench_validate_checkout(c: &mut Criterion) {
    let address = ShippingAddress {
        email: "bench@example.com".to_string(),
        first_name: "Bench".to_string(),
        last_name: "Reader".to_string(),
        addresses: "Jl. Braga 10".to_string(),
        postal_code: "40111".to_string(),
        province_id: 32,
        city_id: 3273,
        district_id: 327301,
        subdistrict_id: 3273011001,
        phone: "081234567890".to_string(),
    };
    let lines: Vec<_> = (1..=10)
        .map(|i| OrderRequestLine {
            item_id: ItemId::new(i),
            quantity: 1,
        })
        .collect();

    c.bench_function("domain/validate_checkout", |b| {
        b.iter(|| {
            validate_checkout(CheckoutRequest::member(
                "ABCDEFGHIJKLMNOPQRSTUVWXYZ",
                lines.clone(),
                address.clone(),
            ))
            .unwrap()
        });
    });
}

criterion_group!(
    benches,
    bench_add_and_remove_line,
    bench_update_quantity,
    bench_validate_checkout
);
criterion_main!(benches);
