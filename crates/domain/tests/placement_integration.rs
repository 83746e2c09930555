//! Integration tests for order placement against the in-memory store.
//!
//! These cover the transactional guarantees: all-or-nothing writes, no
//! oversell under contention, dense daily codes and frozen prices.

mod support;

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use common::{
    AddressId, CustomerId, Money, OrderStatus, PaymentMethod, PaymentStatus, ProductId,
    ShipmentMethod, ShipmentStatus,
};
use domain::{CheckoutCart, OrderError, PlaceOrder, PlacementConfig};
use order_store::{
    CartItem, FailPoint, OrderQuery, OrderStore, Product, StoreTransaction,
};
use support::{harness, harness_with, pickup};

mod scenarios {
    use super::*;

    #[tokio::test]
    async fn totals_include_shipping_and_lines_freeze_prices() {
        let h = harness();
        h.product(1, "Espresso Cup", 1000, 10).await;
        h.product(2, "Saucer", 500, 10).await;
        h.default_address(7, 1);

        let cmd = PlaceOrder {
            shipment_method: ShipmentMethod::Standard,
            ..pickup(1, &[(1, 2), (2, 1)])
        };
        let order = h.service.place_order(cmd).await.unwrap();

        assert_eq!(order.code, "MOA-20250101-0001");
        assert_eq!(order.subtotal, Money::from_minor(2500));
        assert_eq!(order.shipping_cost, Money::from_minor(490));
        assert_eq!(order.total, Money::from_minor(2990));
        assert_eq!(order.address_id, Some(AddressId::new(7)));
        assert_eq!(order.lines.len(), 2);
        assert_eq!(order.lines_total(), order.subtotal);

        assert_eq!(order.lifecycle.order_status, OrderStatus::Confirmed);
        assert_eq!(order.lifecycle.payment_status, PaymentStatus::Pending);
        assert_eq!(order.lifecycle.shipment_status, ShipmentStatus::Preparing);

        assert_eq!(h.stock_of(1).await, 8);
        assert_eq!(h.stock_of(2).await, 9);
    }

    #[tokio::test]
    async fn same_day_codes_are_sequential_and_reset_next_day() {
        let h = harness();
        h.product(1, "Widget", 100, 10).await;

        let first = h.service.place_order(pickup(1, &[(1, 1)])).await.unwrap();
        let second = h.service.place_order(pickup(2, &[(1, 1)])).await.unwrap();
        assert_eq!(first.code, "MOA-20250101-0001");
        assert_eq!(second.code, "MOA-20250101-0002");

        h.clock.advance(ChronoDuration::days(1));
        let next_day = h.service.place_order(pickup(1, &[(1, 1)])).await.unwrap();
        assert_eq!(next_day.code, "MOA-20250102-0001");
    }

    #[tokio::test]
    async fn configured_prefix_is_used() {
        let h = harness_with(PlacementConfig {
            code_prefix: "SHOP".to_string(),
            ..Default::default()
        });
        h.product(1, "Widget", 100, 1).await;

        let order = h.service.place_order(pickup(1, &[(1, 1)])).await.unwrap();
        assert_eq!(order.code, "SHOP-20250101-0001");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn two_buyers_for_the_last_two_units() {
        let h = harness();
        h.product(1, "Last Lamp", 4500, 2).await;

        let a = {
            let service = Arc::clone(&h.service);
            tokio::spawn(async move { service.place_order(pickup(1, &[(1, 2)])).await })
        };
        let b = {
            let service = Arc::clone(&h.service);
            tokio::spawn(async move { service.place_order(pickup(2, &[(1, 2)])).await })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        let successes = results.iter().filter(|r| r.is_ok()).count();
        let shortages = results
            .iter()
            .filter(|r| matches!(r, Err(OrderError::InsufficientStock { .. })))
            .count();

        assert_eq!(successes, 1);
        assert_eq!(shortages, 1);
        assert_eq!(h.stock_of(1).await, 0);
        assert_eq!(h.store.order_count().await, 1);
    }
}

mod concurrency {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn never_oversells_under_contention() {
        let h = harness();
        h.product(1, "Hot Item", 1000, 10).await;

        let handles: Vec<_> = (0..25)
            .map(|n| {
                let service = Arc::clone(&h.service);
                tokio::spawn(async move { service.place_order(pickup(n, &[(1, 1)])).await })
            })
            .collect();

        let mut placed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => placed += 1,
                Err(OrderError::InsufficientStock { shortages }) => {
                    assert_eq!(shortages[0].available, 0);
                }
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(placed, 10);
        assert_eq!(h.stock_of(1).await, 0);
        assert_eq!(h.store.order_count().await, 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_same_day_codes_are_dense_and_unique() {
        let h = harness();
        for id in 1..=20 {
            h.product(id, &format!("Item {id}"), 100, 1).await;
        }

        let placements = (1..=20).map(|id| {
            let service = Arc::clone(&h.service);
            async move { service.place_order(pickup(id, &[(id, 1)])).await }
        });
        let orders = futures_util::future::join_all(placements).await;

        let mut sequences: Vec<u32> = orders
            .into_iter()
            .map(|r| {
                let code: domain::OrderCode = r.unwrap().code.parse().unwrap();
                code.sequence()
            })
            .collect();
        sequences.sort_unstable();

        assert_eq!(sequences, (1..=20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn placement_times_out_while_stock_row_is_held() {
        let h = harness_with(PlacementConfig {
            transaction_timeout: Duration::from_millis(100),
            ..Default::default()
        });
        h.product(1, "Widget", 100, 5).await;

        let mut blocker = h.store.begin().await.unwrap();
        blocker.lock_products(&[ProductId::new(1)]).await.unwrap();

        let result = h.service.place_order(pickup(1, &[(1, 1)])).await;
        assert!(matches!(result, Err(OrderError::Conflict(_))));

        drop(blocker);
        assert_eq!(h.stock_of(1).await, 5);
        assert_eq!(h.store.order_count().await, 0);

        // The lock is free again.
        h.service.place_order(pickup(1, &[(1, 1)])).await.unwrap();
    }

    #[tokio::test]
    async fn slow_commit_is_awaited_past_the_timeout() {
        let h = harness_with(PlacementConfig {
            transaction_timeout: Duration::from_millis(50),
            ..Default::default()
        });
        h.product(1, "Widget", 100, 5).await;
        h.store.delay_commits(Duration::from_millis(200)).await;

        let order = h.service.place_order(pickup(1, &[(1, 2)])).await.unwrap();

        assert_eq!(h.store.order_count().await, 1);
        assert_eq!(h.service.get_order(order.id).await.unwrap(), order);
        assert_eq!(h.stock_of(1).await, 3);
    }
}

mod atomicity {
    use super::*;

    async fn assert_nothing_written(h: &support::Harness, customer: CustomerId) {
        assert_eq!(h.stock_of(1).await, 5);
        assert_eq!(h.store.order_count().await, 0);
        assert_eq!(h.store.cart_items(customer).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn injected_failures_roll_back_everything() {
        for point in [FailPoint::InsertLines, FailPoint::ClearCart, FailPoint::Commit] {
            let h = harness();
            h.product(1, "Widget", 100, 5).await;
            let customer = CustomerId::new(1);
            h.store
                .put_cart_item(&CartItem {
                    customer_id: customer,
                    product_id: ProductId::new(1),
                    quantity: 2,
                })
                .await
                .unwrap();
            h.store.inject_failure(point, 1).await;

            let result = h
                .service
                .checkout_cart(CheckoutCart {
                    customer_id: customer,
                    payment_method: PaymentMethod::CreditCard,
                    shipment_method: ShipmentMethod::Pickup,
                    address_id: None,
                    note: None,
                })
                .await;

            assert!(
                matches!(result, Err(OrderError::Fatal(_))),
                "{point:?}: {result:?}"
            );
            assert_nothing_written(&h, customer).await;
        }
    }

    #[tokio::test]
    async fn code_collisions_are_retried_above_the_collided_sequence() {
        let h = harness();
        h.product(1, "Widget", 100, 5).await;
        h.store.inject_failure(FailPoint::DuplicateCode, 2).await;

        let order = h.service.place_order(pickup(1, &[(1, 1)])).await.unwrap();
        assert_eq!(order.code, "MOA-20250101-0003");
        assert_eq!(h.stock_of(1).await, 4);
    }

    #[tokio::test]
    async fn exhausted_code_attempts_surface_as_conflict() {
        let h = harness_with(PlacementConfig {
            max_code_attempts: 3,
            ..Default::default()
        });
        h.product(1, "Widget", 100, 5).await;
        h.store.inject_failure(FailPoint::DuplicateCode, 3).await;

        let result = h.service.place_order(pickup(1, &[(1, 1)])).await;
        let err = result.unwrap_err();
        assert_eq!(err.kind(), "conflict");
        assert!(err.is_retryable());
        assert_eq!(h.stock_of(1).await, 5);
        assert_eq!(h.store.order_count().await, 0);
    }
}

mod validation {
    use super::*;

    #[tokio::test]
    async fn rejects_bad_input_before_touching_stock() {
        let h = harness();
        h.product(1, "Widget", 100, 5).await;

        let empty = h.service.place_order(pickup(1, &[])).await;
        assert!(matches!(empty, Err(OrderError::EmptyCart)));

        let zero = h.service.place_order(pickup(1, &[(1, 0)])).await;
        assert!(matches!(zero, Err(OrderError::Validation(_))));

        let long_note = pickup(1, &[(1, 1)]).with_note("x".repeat(1001));
        let note = h.service.place_order(long_note).await;
        assert!(matches!(note, Err(OrderError::Validation(_))));

        assert_eq!(h.stock_of(1).await, 5);
        assert_eq!(h.store.order_count().await, 0);
    }

    #[tokio::test]
    async fn overflowing_amounts_are_rejected_and_rolled_back() {
        let h = harness();
        h.product(1, "Gold Bar", i64::MAX / 2 + 1, 5).await;
        h.product(2, "Crown", i64::MAX, 5).await;
        h.default_address(7, 1);

        let subtotal = h.service.place_order(pickup(1, &[(1, 2)])).await;
        assert!(matches!(subtotal, Err(OrderError::Validation(_))), "{subtotal:?}");

        let with_shipping = PlaceOrder {
            shipment_method: ShipmentMethod::Standard,
            ..pickup(1, &[(2, 1)])
        };
        let total = h.service.place_order(with_shipping).await;
        assert!(matches!(total, Err(OrderError::Validation(_))), "{total:?}");

        assert_eq!(h.stock_of(1).await, 5);
        assert_eq!(h.stock_of(2).await, 5);
        assert_eq!(h.store.order_count().await, 0);
    }

    #[tokio::test]
    async fn duplicate_products_are_merged_into_one_line() {
        let h = harness();
        h.product(1, "Widget", 100, 5).await;

        let order = h
            .service
            .place_order(pickup(1, &[(1, 2), (1, 1)]))
            .await
            .unwrap();
        assert_eq!(order.lines.len(), 1);
        assert_eq!(order.lines[0].quantity, 3);
        assert_eq!(h.stock_of(1).await, 2);
    }

    #[tokio::test]
    async fn unknown_product_is_not_found() {
        let h = harness();
        h.product(1, "Widget", 100, 5).await;

        let result = h.service.place_order(pickup(1, &[(1, 1), (99, 1)])).await;
        assert!(matches!(result, Err(OrderError::NotFound { entity: "Product", .. })));
        assert_eq!(h.stock_of(1).await, 5);
    }

    #[tokio::test]
    async fn every_short_line_is_reported() {
        let h = harness();
        h.product(1, "Widget", 100, 1).await;
        h.product(2, "Gadget", 100, 0).await;
        h.product(3, "Doohickey", 100, 9).await;

        let result = h
            .service
            .place_order(pickup(1, &[(1, 2), (2, 1), (3, 1)]))
            .await;

        let Err(OrderError::InsufficientStock { shortages }) = result else {
            panic!("expected insufficient stock, got {result:?}");
        };
        assert_eq!(shortages.len(), 2);
        assert_eq!(shortages[0].product_id, ProductId::new(1));
        assert_eq!(shortages[0].product_name, "Widget");
        assert_eq!(shortages[0].requested, 2);
        assert_eq!(shortages[0].available, 1);
        assert_eq!(shortages[1].product_id, ProductId::new(2));
        assert_eq!(h.stock_of(3).await, 9);
    }
}

mod addresses {
    use super::*;

    fn standard(customer: i64) -> PlaceOrder {
        PlaceOrder {
            shipment_method: ShipmentMethod::Standard,
            ..pickup(customer, &[(1, 1)])
        }
    }

    #[tokio::test]
    async fn delivery_without_any_address_is_invalid() {
        let h = harness();
        h.product(1, "Widget", 100, 5).await;

        let result = h.service.place_order(standard(1)).await;
        assert!(matches!(result, Err(OrderError::InvalidAddress(_))));
    }

    #[tokio::test]
    async fn foreign_address_is_not_found() {
        let h = harness();
        h.product(1, "Widget", 100, 5).await;
        h.default_address(7, 2);

        let result = h
            .service
            .place_order(standard(1).with_address(AddressId::new(7)))
            .await;
        assert!(matches!(result, Err(OrderError::NotFound { entity: "Address", .. })));
    }

    #[tokio::test]
    async fn pickup_needs_no_address() {
        let h = harness();
        h.product(1, "Widget", 100, 5).await;

        let order = h.service.place_order(pickup(1, &[(1, 1)])).await.unwrap();
        assert_eq!(order.address_id, None);
        assert_eq!(order.shipping_cost, Money::zero());
    }

    #[tokio::test]
    async fn explicit_address_overrides_default() {
        let h = harness();
        h.product(1, "Widget", 100, 5).await;
        h.default_address(7, 1);
        h.addresses.insert(domain::Address {
            id: AddressId::new(8),
            customer_id: CustomerId::new(1),
            recipient: "Ana Lima".to_string(),
            line1: "Office".to_string(),
            city: "Porto".to_string(),
            postal_code: "4000-002".to_string(),
            is_default: false,
        });

        let order = h
            .service
            .place_order(
                PlaceOrder {
                    shipment_method: ShipmentMethod::Express,
                    ..standard(1)
                }
                .with_address(AddressId::new(8)),
            )
            .await
            .unwrap();
        assert_eq!(order.address_id, Some(AddressId::new(8)));
        assert_eq!(order.shipping_cost, Money::from_minor(990));
    }
}

mod cart_checkout {
    use super::*;

    async fn fill_cart(h: &support::Harness, customer: CustomerId, items: &[(i64, u32)]) {
        for &(product, quantity) in items {
            h.store
                .put_cart_item(&CartItem {
                    customer_id: customer,
                    product_id: ProductId::new(product),
                    quantity,
                })
                .await
                .unwrap();
        }
    }

    fn checkout(customer: CustomerId) -> CheckoutCart {
        CheckoutCart {
            customer_id: customer,
            payment_method: PaymentMethod::CreditCard,
            shipment_method: ShipmentMethod::Pickup,
            address_id: None,
            note: None,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_checkouts_of_one_cart_place_one_order() {
        let h = harness();
        h.product(1, "Widget", 100, 10).await;
        let customer = CustomerId::new(3);
        fill_cart(&h, customer, &[(1, 2)]).await;

        let mut blocker = h.store.begin().await.unwrap();
        blocker.lock_products(&[ProductId::new(1)]).await.unwrap();

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let service = Arc::clone(&h.service);
                tokio::spawn(async move { service.checkout_cart(checkout(customer)).await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(blocker);

        let mut placed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(order) => {
                    placed += 1;
                    assert_eq!(order.lines[0].quantity, 2);
                }
                Err(OrderError::EmptyCart) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(placed, 1);
        assert_eq!(h.store.order_count().await, 1);
        assert_eq!(h.stock_of(1).await, 8);
        assert!(h.store.cart_items(customer).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn items_added_during_checkout_stay_in_the_cart() {
        let h = harness();
        h.product(1, "Widget", 100, 10).await;
        h.product(2, "Gadget", 250, 10).await;
        let customer = CustomerId::new(3);
        fill_cart(&h, customer, &[(1, 2)]).await;

        let mut blocker = h.store.begin().await.unwrap();
        blocker.lock_products(&[ProductId::new(1)]).await.unwrap();

        let placing = {
            let service = Arc::clone(&h.service);
            tokio::spawn(async move { service.checkout_cart(checkout(customer)).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let adding = {
            let store = h.store.clone();
            tokio::spawn(async move {
                store
                    .put_cart_item(&CartItem {
                        customer_id: customer,
                        product_id: ProductId::new(2),
                        quantity: 3,
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(blocker);

        let order = placing.await.unwrap().unwrap();
        adding.await.unwrap().unwrap();

        let ordered: Vec<_> = order.lines.iter().map(|l| l.product_id).collect();
        assert_eq!(ordered, vec![ProductId::new(1)]);
        assert_eq!(h.stock_of(2).await, 10);
        assert_eq!(
            h.store.cart_items(customer).await.unwrap(),
            vec![CartItem {
                customer_id: customer,
                product_id: ProductId::new(2),
                quantity: 3,
            }]
        );
    }

    #[tokio::test]
    async fn checkout_places_cart_and_clears_it() {
        let h = harness();
        h.product(1, "Widget", 100, 5).await;
        h.product(2, "Gadget", 250, 5).await;
        let customer = CustomerId::new(3);
        for (product, quantity) in [(1, 2), (2, 1)] {
            h.store
                .put_cart_item(&CartItem {
                    customer_id: customer,
                    product_id: ProductId::new(product),
                    quantity,
                })
                .await
                .unwrap();
        }

        let order = h
            .service
            .checkout_cart(CheckoutCart {
                customer_id: customer,
                payment_method: PaymentMethod::EWallet,
                shipment_method: ShipmentMethod::Pickup,
                address_id: None,
                note: Some("gift wrap".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(order.customer_id, customer);
        assert_eq!(order.subtotal, Money::from_minor(450));
        assert_eq!(order.note.as_deref(), Some("gift wrap"));
        assert!(h.store.cart_items(customer).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_cart_cannot_be_checked_out() {
        let h = harness();
        let result = h
            .service
            .checkout_cart(CheckoutCart {
                customer_id: CustomerId::new(3),
                payment_method: PaymentMethod::CashOnDelivery,
                shipment_method: ShipmentMethod::Pickup,
                address_id: None,
                note: None,
            })
            .await;
        assert!(matches!(result, Err(OrderError::EmptyCart)));
    }
}

mod prices_and_notifications {
    use super::*;

    #[tokio::test]
    async fn later_price_changes_do_not_touch_placed_orders() {
        let h = harness();
        h.product(1, "Widget", 1000, 5).await;

        let order = h.service.place_order(pickup(1, &[(1, 2)])).await.unwrap();

        h.store
            .upsert_product(&Product::new(
                ProductId::new(1),
                "Widget v2",
                Money::from_minor(1500),
                3,
            ))
            .await
            .unwrap();

        let reloaded = h.service.get_order(order.id).await.unwrap();
        assert_eq!(reloaded.lines[0].unit_price, Money::from_minor(1000));
        assert_eq!(reloaded.lines[0].product_name, "Widget");
        assert_eq!(reloaded.subtotal, Money::from_minor(2000));
        assert_eq!(reloaded.lines_total(), reloaded.subtotal);
    }

    #[tokio::test]
    async fn confirmation_is_sent_after_commit() {
        let h = harness();
        h.product(1, "Widget", 100, 5).await;

        let order = h.service.place_order(pickup(4, &[(1, 1)])).await.unwrap();

        assert!(h.notifier.wait_for_attempts(1, Duration::from_secs(2)).await);
        let sent = h.notifier.sent();
        assert_eq!(sent[0].0.code, order.code);
        assert_eq!(sent[0].1, CustomerId::new(4));
    }

    #[tokio::test]
    async fn placement_returns_the_stored_order_without_reading_it_back() {
        let h = harness();
        h.product(1, "Widget", 100, 5).await;
        h.store.inject_failure(FailPoint::GetOrder, 1).await;

        let order = h.service.place_order(pickup(4, &[(1, 3)])).await.unwrap();
        assert_eq!(order.lines.len(), 1);
        assert_eq!(order.subtotal, Money::from_minor(300));
        assert!(h.notifier.wait_for_attempts(1, Duration::from_secs(2)).await);
        assert_eq!(h.notifier.sent()[0].0.code, order.code);

        // The injected read failure is still pending.
        let read = h.service.get_order(order.id).await;
        assert!(matches!(read, Err(OrderError::Fatal(_))));
        assert_eq!(h.service.get_order(order.id).await.unwrap(), order);
    }

    #[tokio::test]
    async fn failed_notification_keeps_the_order() {
        let h = harness();
        h.product(1, "Widget", 100, 5).await;
        h.notifier.set_fail(true);

        let order = h.service.place_order(pickup(4, &[(1, 1)])).await.unwrap();

        assert!(h.notifier.wait_for_attempts(1, Duration::from_secs(2)).await);
        assert!(h.notifier.sent().is_empty());
        assert!(h.service.get_order(order.id).await.is_ok());
        let listed = h.store.query_orders(&OrderQuery::new()).await.unwrap();
        assert_eq!(listed.len(), 1);
    }
}

mod restock {
    use super::*;

    #[tokio::test]
    async fn restock_makes_stock_available_again() {
        let h = harness();
        h.product(1, "Widget", 100, 1).await;
        h.service.place_order(pickup(1, &[(1, 1)])).await.unwrap();

        let sold_out = h.service.place_order(pickup(2, &[(1, 1)])).await;
        assert!(matches!(sold_out, Err(OrderError::InsufficientStock { .. })));

        let product = h.service.restock(ProductId::new(1), 3).await.unwrap();
        assert_eq!(product.stock, 3);
        h.service.place_order(pickup(2, &[(1, 1)])).await.unwrap();

        let zero = h.service.restock(ProductId::new(1), 0).await;
        assert!(matches!(zero, Err(OrderError::Validation(_))));
        let missing = h.service.restock(ProductId::new(42), 1).await;
        assert!(matches!(missing, Err(OrderError::NotFound { .. })));
    }
}
