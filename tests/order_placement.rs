mod common;

use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use common::{settings, shop, shop_with};
use futures::future::join_all;
use storefront_orders::{
    AddressId, Cart, CatalogEntry, Money, OrderError, OrderService, OrderSettings, Page, SnapshotId, StoreError,
    UserId,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_buyers_one_unit_exactly_one_wins() {
    let shop = shop().await;
    let (entry, snap) = shop.list_item("Batik Tulis", "100", 1).await;
    let (user1, addr1) = shop.buyer().await;
    let (user2, addr2) = shop.buyer().await;
    let sid = snap.id();

    let a = {
        let orders = shop.orders.clone();
        tokio::spawn(async move { orders.create_order(user1, Cart::new(addr1, "transfer").with_line(sid, 1)).await })
    };
    let b = {
        let orders = shop.orders.clone();
        tokio::spawn(async move { orders.create_order(user2, Cart::new(addr2, "transfer").with_line(sid, 1)).await })
    };
    let results = vec![a.await.unwrap(), b.await.unwrap()];

    let placed: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(placed.len(), 1);
    let order = placed[0];
    assert_eq!(order.total(), Money::new(100));
    assert_eq!(order.lines().len(), 1);
    assert_eq!(order.lines()[0].subtotal, Money::new(100));

    let rejected: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();
    assert_eq!(rejected.len(), 1);
    match rejected[0] {
        OrderError::OutOfStock { catalog_entry_id, requested, available, .. } => {
            assert_eq!(*catalog_entry_id, entry.id);
            assert_eq!(*requested, 1);
            assert_eq!(*available, 0);
        }
        other => panic!("expected OutOfStock, got {other:?}"),
    }
    assert_eq!(shop.stock(&entry).await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_orders_never_oversell() {
    let shop = shop().await;
    let (entry, snap) = shop.list_item("Kopi Toraja", "45000", 10).await;
    let sid = snap.id();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let (user, addr) = shop.buyer().await;
        let orders = shop.orders.clone();
        handles.push(tokio::spawn(async move {
            orders.create_order(user, Cart::new(addr, "cod").with_line(sid, 3)).await
        }));
    }
    let results: Vec<_> = join_all(handles).await.into_iter().map(|h| h.unwrap()).collect();

    let sold: i32 = results.iter().filter_map(|r| r.as_ref().ok()).map(|o| o.lines()[0].quantity.value()).sum();
    assert_eq!(sold, 9);
    for r in &results {
        if let Err(e) = r {
            assert!(matches!(e, OrderError::OutOfStock { .. }), "unexpected {e:?}");
        }
    }
    assert_eq!(results.iter().filter(|r| r.is_err()).count(), 5);
    assert_eq!(shop.stock(&entry).await, 1);
}

#[tokio::test]
async fn failing_third_line_rolls_back_everything() {
    let shop = shop().await;
    let (a, snap_a) = shop.list_item("Teh", "10", 5).await;
    let (b, snap_b) = shop.list_item("Gula", "20", 5).await;
    let (c, snap_c) = shop.list_item("Susu", "30", 1).await;
    let (d, snap_d) = shop.list_item("Roti", "40", 5).await;
    let (user, addr) = shop.buyer().await;

    let cart = Cart::new(addr, "transfer")
        .with_line(snap_a.id(), 2)
        .with_line(snap_b.id(), 1)
        .with_line(snap_c.id(), 2)
        .with_line(snap_d.id(), 1);
    let err = shop.orders.create_order(user, cart).await.unwrap_err();
    assert!(matches!(err, OrderError::OutOfStock { line: 2, .. }), "got {err:?}");

    for (entry, stock) in [(&a, 5), (&b, 5), (&c, 1), (&d, 5)] {
        assert_eq!(shop.stock(entry).await, stock);
    }
    assert_eq!(shop.storage.order_count().await, 0);
    assert_eq!(shop.storage.line_count().await, 0);
    assert!(shop.orders.list_orders(user, Page::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn same_snapshot_twice_is_two_decrements() {
    let shop = shop().await;
    let (entry, snap) = shop.list_item("Sarung", "75", 3).await;
    let (user, addr) = shop.buyer().await;

    let too_many = Cart::new(addr, "transfer").with_line(snap.id(), 2).with_line(snap.id(), 2);
    let err = shop.orders.create_order(user, too_many).await.unwrap_err();
    assert!(matches!(err, OrderError::OutOfStock { line: 1, available: 1, .. }), "got {err:?}");
    assert_eq!(shop.stock(&entry).await, 3);

    let fits = Cart::new(addr, "transfer").with_line(snap.id(), 1).with_line(snap.id(), 2);
    let order = shop.orders.create_order(user, fits).await.unwrap();
    assert_eq!(order.lines().len(), 2);
    assert_eq!(order.total(), Money::new(225));
    assert_eq!(shop.stock(&entry).await, 0);
}

#[tokio::test]
async fn total_is_sum_of_lines_across_stores() {
    let shop = shop().await;
    let (_, snap_a) = shop.list_item("Keripik", "12000", 50).await;
    let (_, snap_b) = shop.list_item("Dodol", "8500", 50).await;
    let (user, addr) = shop.buyer().await;

    let order = shop
        .orders
        .create_order(user, Cart::new(addr, "transfer").with_line(snap_a.id(), 3).with_line(snap_b.id(), 2))
        .await
        .unwrap();

    let sum = order.lines().iter().fold(0, |acc, l| acc + l.subtotal.amount());
    assert_eq!(order.total().amount(), sum);
    assert_eq!(order.total(), Money::new(53_000));
    assert!(order.is_consistent());
    assert_eq!(order.lines()[0].store_id, snap_a.store_id());
    assert_eq!(order.lines()[1].store_id, snap_b.store_id());
    assert_eq!(order.lines()[0].line_no, 0);
    assert_eq!(order.lines()[1].line_no, 1);

    let stored = shop.orders.get_order(user, order.id()).await.unwrap();
    assert_eq!(stored, order);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn invoice_codes_are_unique_for_one_user() {
    let shop = shop().await;
    let (_, snap) = shop.list_item("Pulpen", "3000", 1_000).await;
    let (user, addr) = shop.buyer().await;
    let sid = snap.id();

    let handles: Vec<_> = (0..25)
        .map(|_| {
            let orders = shop.orders.clone();
            tokio::spawn(async move { orders.create_order(user, Cart::new(addr, "transfer").with_line(sid, 1)).await })
        })
        .collect();

    let codes: HashSet<String> = join_all(handles)
        .await
        .into_iter()
        .map(|h| h.unwrap().unwrap().invoice_code().as_str().to_string())
        .collect();
    assert_eq!(codes.len(), 25);
    assert!(codes.iter().all(|c| c.starts_with("INV-")));
}

#[tokio::test]
async fn orders_are_private_to_their_owner() {
    let shop = shop().await;
    let (_, snap) = shop.list_item("Payung", "55000", 5).await;
    let (alice, addr) = shop.buyer().await;
    let (bob, _) = shop.buyer().await;

    let order = shop.orders.create_order(alice, Cart::new(addr, "transfer").with_line(snap.id(), 1)).await.unwrap();

    assert!(matches!(shop.orders.get_order(bob, order.id()).await, Err(OrderError::NotFound)));
    assert!(matches!(shop.orders.get_order(alice, storefront_orders::OrderId::new()).await, Err(OrderError::NotFound)));
    assert!(shop.orders.list_orders(bob, Page::default()).await.unwrap().is_empty());
    assert_eq!(shop.orders.get_order(alice, order.id()).await.unwrap().lines().len(), 1);
}

#[tokio::test]
async fn listing_pages_newest_first() {
    let shop = shop().await;
    let (_, snap) = shop.list_item("Buku", "20000", 10).await;
    let (user, addr) = shop.buyer().await;

    let mut placed = Vec::new();
    for _ in 0..3 {
        placed.push(shop.orders.create_order(user, Cart::new(addr, "transfer").with_line(snap.id(), 1)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let first = shop.orders.list_orders(user, Page::new(Some(1), Some(2))).await.unwrap();
    let second = shop.orders.list_orders(user, Page::new(Some(2), Some(2))).await.unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 1);
    assert_eq!(first[0].id(), placed[2].id());
    assert_eq!(first[1].id(), placed[1].id());
    assert_eq!(second[0].id(), placed[0].id());
    assert!(first.iter().chain(second.iter()).all(|o| o.lines().len() == 1));
}

#[tokio::test]
async fn hand_built_page_zero_reads_as_first_page() {
    let shop = shop().await;
    let (_, snap) = shop.list_item("Map", "5000", 5).await;
    let (user, addr) = shop.buyer().await;
    let order = shop.orders.create_order(user, Cart::new(addr, "transfer").with_line(snap.id(), 1)).await.unwrap();

    let listed = shop.orders.list_orders(user, Page { page: 0, per_page: 10 }).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id(), order.id());
    assert!(shop.orders.list_orders(UserId::new(), Page { page: 0, per_page: 0 }).await.unwrap().is_empty());
}

#[tokio::test]
async fn placed_order_timestamps_have_storage_precision() {
    let shop = shop().await;
    let (_, snap) = shop.list_item("Lampu", "30000", 5).await;
    let (user, addr) = shop.buyer().await;

    let order = shop.orders.create_order(user, Cart::new(addr, "transfer").with_line(snap.id(), 1)).await.unwrap();
    let header = order.header();
    for at in [header.created_at, header.updated_at, order.lines()[0].created_at] {
        assert_eq!(at.timestamp_subsec_nanos() % 1_000, 0, "{at} is finer than microseconds");
    }
}

#[tokio::test]
async fn unknown_snapshot_is_reported_with_its_line() {
    let shop = shop().await;
    let (entry, snap) = shop.list_item("Lilin", "5000", 4).await;
    let (user, addr) = shop.buyer().await;
    let missing = SnapshotId::new();

    let err = shop
        .orders
        .create_order(user, Cart::new(addr, "transfer").with_line(snap.id(), 2).with_line(missing, 1))
        .await
        .unwrap_err();
    match err {
        OrderError::SnapshotNotFound { line, snapshot_id } => {
            assert_eq!(line, 1);
            assert_eq!(snapshot_id, missing);
        }
        other => panic!("expected SnapshotNotFound, got {other:?}"),
    }
    assert_eq!(shop.stock(&entry).await, 4);
    assert_eq!(shop.storage.order_count().await, 0);
}

#[tokio::test]
async fn malformed_stored_price_is_rejected_not_truncated() {
    let shop = shop().await;
    let mut entry = CatalogEntry::create(shop.draft("Tas", "100", 5), Utc::now()).unwrap();
    entry.consumer_price = "99.90".to_string();
    let snap = shop.storage.seed_catalog_entry(entry.clone()).await;
    let (user, addr) = shop.buyer().await;

    let err = shop.orders.create_order(user, Cart::new(addr, "transfer").with_line(snap.id(), 1)).await.unwrap_err();
    match err {
        OrderError::InvalidPrice { snapshot_id, value } => {
            assert_eq!(snapshot_id, snap.id());
            assert_eq!(value, "99.90");
        }
        other => panic!("expected InvalidPrice, got {other:?}"),
    }
    assert_eq!(shop.stock(&entry).await, 5);
    assert_eq!(shop.storage.order_count().await, 0);
}

#[tokio::test]
async fn invalid_carts_are_rejected_before_any_write() {
    let shop = shop().await;
    let (entry, snap) = shop.list_item("Sabun", "7000", 5).await;
    let (user, addr) = shop.buyer().await;

    for cart in [
        Cart::new(addr, "transfer"),
        Cart::new(addr, "transfer").with_line(snap.id(), 0),
        Cart::new(addr, "transfer").with_line(snap.id(), 1).with_line(snap.id(), -2),
        Cart::new(addr, " ").with_line(snap.id(), 1),
    ] {
        let err = shop.orders.create_order(user, cart).await.unwrap_err();
        assert!(matches!(err, OrderError::InvalidInput(_)), "got {err:?}");
    }
    assert_eq!(shop.stock(&entry).await, 5);
    assert_eq!(shop.storage.order_count().await, 0);
}

#[tokio::test]
async fn shipping_address_must_belong_to_buyer() {
    let shop = shop().await;
    let (_, snap) = shop.list_item("Topi", "15000", 5).await;
    let (user, _) = shop.buyer().await;
    let (_, someone_elses) = shop.buyer().await;

    let err = shop
        .orders
        .create_order(user, Cart::new(someone_elses, "transfer").with_line(snap.id(), 1))
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::InvalidInput(_)), "got {err:?}");

    let lenient = shop_with(OrderSettings { verify_address_ownership: false, ..settings() }).await;
    let (_, snap) = lenient.list_item("Topi", "15000", 5).await;
    let order = lenient
        .orders
        .create_order(UserId::new(), Cart::new(AddressId::new(), "transfer").with_line(snap.id(), 1))
        .await
        .unwrap();
    assert_eq!(order.total(), Money::new(15000));
}

#[tokio::test]
async fn stalled_storage_times_out_and_releases_stock() {
    let shop = shop_with(OrderSettings { timeout: Duration::from_millis(50), ..settings() }).await;
    let (entry, snap) = shop.list_item("Jam", "250000", 2).await;
    let (user, addr) = shop.buyer().await;

    shop.storage.set_stock_delay(Some(Duration::from_millis(300)));
    let err = shop.orders.create_order(user, Cart::new(addr, "transfer").with_line(snap.id(), 1)).await.unwrap_err();
    assert!(matches!(err, OrderError::Storage(StoreError::Timeout(_))), "got {err:?}");
    assert_eq!(shop.stock(&entry).await, 2);
    assert_eq!(shop.storage.order_count().await, 0);

    shop.storage.set_stock_delay(None);
    let order = shop.orders.create_order(user, Cart::new(addr, "transfer").with_line(snap.id(), 2)).await.unwrap();
    assert_eq!(order.total(), Money::new(500000));
    assert_eq!(shop.stock(&entry).await, 0);
}

#[tokio::test]
async fn commit_failure_leaves_nothing_behind() {
    let shop = shop().await;
    let (entry, snap) = shop.list_item("Kipas", "90000", 3).await;
    let (user, addr) = shop.buyer().await;

    shop.storage.fail_next_commit();
    let err = shop.orders.create_order(user, Cart::new(addr, "transfer").with_line(snap.id(), 2)).await.unwrap_err();
    assert!(matches!(err, OrderError::Storage(StoreError::Unavailable(_))), "got {err:?}");
    assert_eq!(shop.stock(&entry).await, 3);
    assert_eq!(shop.storage.order_count().await, 0);
    assert_eq!(shop.storage.line_count().await, 0);
}
