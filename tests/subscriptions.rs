mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use uuid::Uuid;

use common::*;
use patronage_backend::error::{AppError, PaymentError, SubscriptionError};
use patronage_backend::subscriptions::store::SubscriptionStore;
use patronage_backend::subscriptions::{NewTier, SubscriptionStatus};

fn tier_input(price: rust_decimal::Decimal, max_subscribers: Option<i32>) -> NewTier {
    NewTier {
        name: "Backstage".to_string(),
        price_native: price,
        price_fiat: dec!(5),
        max_subscribers,
    }
}

#[tokio::test]
async fn subscribing_enrolls_and_records_revenue() {
    let world = world();
    let provider = world.add_principal(Some("GARTIST"));
    let fan = world.add_principal(Some("GFAN"));
    let service = world.subscription_service(None);

    let tier = service
        .create_tier(provider, tier_input(dec!(25), Some(100)))
        .await
        .unwrap();

    world.ledger.add(settled_transfer("sub_tx1", "GARTIST", dec!(25)));

    let before = Utc::now();
    let subscription = service.subscribe(fan, tier.id, "sub_tx1".into()).await.unwrap();

    assert_eq!(subscription.status, SubscriptionStatus::Active);
    assert_eq!(subscription.provider_id, provider);
    assert!(subscription.next_billing_date > before + Duration::days(27));

    let tier = service.tiers_for_provider(provider).await.unwrap().remove(0);
    assert_eq!(tier.current_subscribers, 1);

    let revenue = service.revenue_for_provider(provider).await.unwrap();
    assert_eq!(revenue.len(), 1);
    assert_eq!(revenue[0].amount_native, dec!(25));
    assert_eq!(revenue[0].amount_fiat, dec!(5));
    assert_eq!(revenue[0].settlement_ref, "sub_tx1");
    assert_eq!(revenue[0].subscription_id, subscription.id);
}

#[tokio::test]
async fn a_settlement_funds_exactly_one_subscription() {
    let world = world();
    let provider = world.add_principal(Some("GARTIST"));
    let fan = world.add_principal(Some("GFAN"));
    let other_fan = world.add_principal(Some("GFAN2"));
    let service = world.subscription_service(None);

    let tier = service
        .create_tier(provider, tier_input(dec!(25), None))
        .await
        .unwrap();
    world.ledger.add(settled_transfer("sub_tx1", "GARTIST", dec!(25)));

    service.subscribe(fan, tier.id, "sub_tx1".into()).await.unwrap();

    // Replaying the same settlement, even from another principal, is rejected
    let err = service
        .subscribe(other_fan, tier.id, "sub_tx1".into())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Payment(PaymentError::DuplicateSettlement)
    ));

    let tier = service.tiers_for_provider(provider).await.unwrap().remove(0);
    assert_eq!(tier.current_subscribers, 1);
}

#[tokio::test]
async fn one_active_subscription_per_provider() {
    let world = world();
    let provider = world.add_principal(Some("GARTIST"));
    let fan = world.add_principal(Some("GFAN"));
    let service = world.subscription_service(None);

    let tier = service
        .create_tier(provider, tier_input(dec!(10), None))
        .await
        .unwrap();
    world.ledger.add(settled_transfer("sub_tx1", "GARTIST", dec!(10)));
    world.ledger.add(settled_transfer("sub_tx2", "GARTIST", dec!(10)));

    let subscription = service.subscribe(fan, tier.id, "sub_tx1".into()).await.unwrap();

    let err = service
        .subscribe(fan, tier.id, "sub_tx2".into())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Subscription(SubscriptionError::AlreadySubscribed)
    ));

    // After cancelling, a fresh settlement may enroll again
    service.cancel(subscription.id, fan).await.unwrap();
    let renewed = service.subscribe(fan, tier.id, "sub_tx2".into()).await.unwrap();
    assert_eq!(renewed.status, SubscriptionStatus::Active);
}

#[tokio::test]
async fn capacity_holds_under_concurrent_admissions() {
    let world = world();
    let provider = world.add_principal(Some("GARTIST"));
    let service = world.subscription_service(None);

    let tier = service
        .create_tier(provider, tier_input(dec!(5), Some(3)))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..6 {
        let fan = world.add_principal(Some(&format!("GFAN{}", i)));
        let settlement_ref = format!("sub_tx{}", i);
        world
            .ledger
            .add(settled_transfer(&settlement_ref, "GARTIST", dec!(5)));

        let service = service.clone();
        let tier_id = tier.id;
        handles.push(tokio::spawn(async move {
            service.subscribe(fan, tier_id, settlement_ref).await
        }));
    }

    let mut admitted = 0;
    let mut capacity_rejections = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(AppError::Subscription(SubscriptionError::CapacityReached)) => {
                capacity_rejections += 1
            }
            Err(other) => panic!("unexpected admission failure: {other}"),
        }
    }

    assert_eq!(admitted, 3);
    assert_eq!(capacity_rejections, 3);

    let tier = service.tiers_for_provider(provider).await.unwrap().remove(0);
    assert_eq!(tier.current_subscribers, 3);
}

#[tokio::test]
async fn unknown_or_inactive_tiers_cannot_be_joined() {
    let world = world();
    let fan = world.add_principal(Some("GFAN"));
    let service = world.subscription_service(None);

    let err = service
        .subscribe(fan, Uuid::new_v4(), "sub_tx1".into())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Subscription(SubscriptionError::TierNotFound)
    ));
}

#[tokio::test]
async fn settlement_must_cover_the_tier_price() {
    let world = world();
    let provider = world.add_principal(Some("GARTIST"));
    let fan = world.add_principal(Some("GFAN"));
    let generous_fan = world.add_principal(Some("GFAN2"));
    let service = world.subscription_service(None);

    let tier = service
        .create_tier(provider, tier_input(dec!(25), None))
        .await
        .unwrap();

    world.ledger.add(settled_transfer("sub_low", "GARTIST", dec!(24.9)));
    world.ledger.add(settled_transfer("sub_high", "GARTIST", dec!(30)));

    let err = service
        .subscribe(fan, tier.id, "sub_low".into())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Payment(PaymentError::PaymentNotFound)
    ));

    // Overpaying still funds the enrollment
    service
        .subscribe(generous_fan, tier.id, "sub_high".into())
        .await
        .unwrap();
}

#[tokio::test]
async fn lifecycle_transitions_enforce_ownership_and_state() {
    let world = world();
    let provider = world.add_principal(Some("GARTIST"));
    let fan = world.add_principal(Some("GFAN"));
    let stranger = world.add_principal(Some("GSTRANGER"));
    let service = world.subscription_service(None);

    let tier = service
        .create_tier(provider, tier_input(dec!(10), None))
        .await
        .unwrap();
    world.ledger.add(settled_transfer("sub_tx1", "GARTIST", dec!(10)));
    let subscription = service.subscribe(fan, tier.id, "sub_tx1".into()).await.unwrap();

    // Only the owner may act on it
    let err = service.pause(subscription.id, stranger).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Subscription(SubscriptionError::NotOwner)
    ));

    // Resume requires paused
    let err = service.resume(subscription.id, fan).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Subscription(SubscriptionError::InvalidStateTransition { .. })
    ));

    let paused = service.pause(subscription.id, fan).await.unwrap();
    assert_eq!(paused.status, SubscriptionStatus::Paused);

    // Pausing twice is invalid
    let err = service.pause(subscription.id, fan).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Subscription(SubscriptionError::InvalidStateTransition { .. })
    ));

    let resumed = service.resume(subscription.id, fan).await.unwrap();
    assert_eq!(resumed.status, SubscriptionStatus::Active);

    // Cancel releases capacity and is terminal
    let cancelled = service.cancel(subscription.id, fan).await.unwrap();
    assert_eq!(cancelled.status, SubscriptionStatus::Cancelled);
    assert!(cancelled.cancelled_at.is_some());

    let tier = service.tiers_for_provider(provider).await.unwrap().remove(0);
    assert_eq!(tier.current_subscribers, 0);

    let err = service.cancel(subscription.id, fan).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Subscription(SubscriptionError::InvalidStateTransition { .. })
    ));
}

#[tokio::test]
async fn billing_renews_chargeable_subscriptions() {
    let world = world();
    let provider = world.add_principal(Some("GARTIST"));
    let fan = world.add_principal(Some("GFAN"));
    let charge = AlwaysCharge::new();
    let service = world.subscription_service(Some(charge.clone()));

    let tier = service
        .create_tier(provider, tier_input(dec!(10), None))
        .await
        .unwrap();
    world.ledger.add(settled_transfer("sub_tx1", "GARTIST", dec!(10)));
    let subscription = service.subscribe(fan, tier.id, "sub_tx1".into()).await.unwrap();

    // Force the billing date into the past
    world
        .store
        .advance_billing(subscription.id, Utc::now() - Duration::days(1))
        .await
        .unwrap();

    let summary = service.process_billing().await.unwrap();
    assert_eq!(summary.due, 1);
    assert_eq!(summary.renewed, 1);
    assert_eq!(summary.expired, 0);
    assert_eq!(charge.charged.load(Ordering::SeqCst), 1);

    let renewed = service
        .subscriptions_for(fan, None)
        .await
        .unwrap()
        .remove(0);
    assert_eq!(renewed.status, SubscriptionStatus::Active);
    assert!(renewed.next_billing_date > Utc::now() + Duration::days(27));
}

#[tokio::test]
async fn failed_charges_expire_the_subscription_and_release_capacity() {
    let world = world();
    let provider = world.add_principal(Some("GARTIST"));
    let fan = world.add_principal(Some("GFAN"));
    let service = world.subscription_service(Some(Arc::new(NeverCharge)));

    let tier = service
        .create_tier(provider, tier_input(dec!(10), Some(5)))
        .await
        .unwrap();
    world.ledger.add(settled_transfer("sub_tx1", "GARTIST", dec!(10)));
    let subscription = service.subscribe(fan, tier.id, "sub_tx1".into()).await.unwrap();

    world
        .store
        .advance_billing(subscription.id, Utc::now() - Duration::days(1))
        .await
        .unwrap();

    let summary = service.process_billing().await.unwrap();
    assert_eq!(summary.due, 1);
    assert_eq!(summary.expired, 1);

    let expired = service
        .subscriptions_for(fan, None)
        .await
        .unwrap()
        .remove(0);
    assert_eq!(expired.status, SubscriptionStatus::Expired);

    let tier = service.tiers_for_provider(provider).await.unwrap().remove(0);
    assert_eq!(tier.current_subscribers, 0);

    // Revenue from the original admission is untouched by the expiry
    let revenue = service.revenue_for_provider(provider).await.unwrap();
    assert_eq!(revenue.len(), 1);
}

#[tokio::test]
async fn a_missing_charge_capability_counts_as_failure() {
    let world = world();
    let provider = world.add_principal(Some("GARTIST"));
    let fan = world.add_principal(Some("GFAN"));
    let service = world.subscription_service(None);

    let tier = service
        .create_tier(provider, tier_input(dec!(10), None))
        .await
        .unwrap();
    world.ledger.add(settled_transfer("sub_tx1", "GARTIST", dec!(10)));
    let subscription = service.subscribe(fan, tier.id, "sub_tx1".into()).await.unwrap();

    world
        .store
        .advance_billing(subscription.id, Utc::now() - Duration::days(1))
        .await
        .unwrap();

    let summary = service.process_billing().await.unwrap();
    assert_eq!(summary.expired, 1);
}

#[tokio::test]
async fn one_bad_item_does_not_abort_the_billing_batch() {
    let world = world();
    let provider = world.add_principal(Some("GARTIST"));
    let fan_one = world.add_principal(Some("GFAN1"));
    let fan_two = world.add_principal(Some("GFAN2"));

    // Bootstrap with a working charge to enroll both, then re-wire billing
    let bootstrap_service = world.subscription_service(None);
    let tier = bootstrap_service
        .create_tier(provider, tier_input(dec!(10), None))
        .await
        .unwrap();
    world.ledger.add(settled_transfer("sub_tx1", "GARTIST", dec!(10)));
    world.ledger.add(settled_transfer("sub_tx2", "GARTIST", dec!(10)));

    let first = bootstrap_service
        .subscribe(fan_one, tier.id, "sub_tx1".into())
        .await
        .unwrap();
    let second = bootstrap_service
        .subscribe(fan_two, tier.id, "sub_tx2".into())
        .await
        .unwrap();

    for subscription_id in [first.id, second.id] {
        world
            .store
            .advance_billing(subscription_id, Utc::now() - Duration::days(1))
            .await
            .unwrap();
    }

    let service =
        world.subscription_service(Some(Arc::new(SelectiveCharge { fail_for: first.id })));
    let summary = service.process_billing().await.unwrap();

    assert_eq!(summary.due, 2);
    assert_eq!(summary.renewed, 1);
    assert_eq!(summary.expired, 1);

    let first_after = service.subscriptions_for(fan_one, None).await.unwrap().remove(0);
    let second_after = service.subscriptions_for(fan_two, None).await.unwrap().remove(0);
    assert_eq!(first_after.status, SubscriptionStatus::Expired);
    assert_eq!(second_after.status, SubscriptionStatus::Active);
}

#[tokio::test]
async fn paused_subscriptions_are_not_billed() {
    let world = world();
    let provider = world.add_principal(Some("GARTIST"));
    let fan = world.add_principal(Some("GFAN"));
    let charge = AlwaysCharge::new();
    let service = world.subscription_service(Some(charge.clone()));

    let tier = service
        .create_tier(provider, tier_input(dec!(10), None))
        .await
        .unwrap();
    world.ledger.add(settled_transfer("sub_tx1", "GARTIST", dec!(10)));
    let subscription = service.subscribe(fan, tier.id, "sub_tx1".into()).await.unwrap();

    world
        .store
        .advance_billing(subscription.id, Utc::now() - Duration::days(1))
        .await
        .unwrap();
    service.pause(subscription.id, fan).await.unwrap();

    let summary = service.process_billing().await.unwrap();
    assert_eq!(summary.due, 0);
    assert_eq!(charge.charged.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn revenue_summary_totals_the_append_only_ledger() {
    let world = world();
    let provider = world.add_principal(Some("GARTIST"));
    let service = world.subscription_service(None);

    let cheap = service
        .create_tier(provider, tier_input(dec!(10), None))
        .await
        .unwrap();
    let pricey = service
        .create_tier(
            provider,
            NewTier {
                name: "Front row".to_string(),
                price_native: dec!(40),
                price_fiat: dec!(20),
                max_subscribers: None,
            },
        )
        .await
        .unwrap();

    let fan_one = world.add_principal(Some("GFAN1"));
    let fan_two = world.add_principal(Some("GFAN2"));
    world.ledger.add(settled_transfer("sub_tx1", "GARTIST", dec!(10)));
    world.ledger.add(settled_transfer("sub_tx2", "GARTIST", dec!(40)));

    service.subscribe(fan_one, cheap.id, "sub_tx1".into()).await.unwrap();
    let second = service
        .subscribe(fan_two, pricey.id, "sub_tx2".into())
        .await
        .unwrap();

    // Cancellation does not erase historical revenue
    service.cancel(second.id, fan_two).await.unwrap();

    let summary = service.revenue_summary(provider).await.unwrap();
    assert_eq!(summary.entry_count, 2);
    assert_eq!(summary.total_native, dec!(50));
    assert_eq!(summary.total_fiat, dec!(25));
}

#[tokio::test]
async fn tier_deletion_is_guarded() {
    let world = world();
    let provider = world.add_principal(Some("GARTIST"));
    let stranger = world.add_principal(Some("GSTRANGER"));
    let fan = world.add_principal(Some("GFAN"));
    let service = world.subscription_service(None);

    let tier = service
        .create_tier(provider, tier_input(dec!(10), None))
        .await
        .unwrap();

    let err = service.delete_tier(tier.id, stranger).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Subscription(SubscriptionError::NotOwner)
    ));

    world.ledger.add(settled_transfer("sub_tx1", "GARTIST", dec!(10)));
    let subscription = service.subscribe(fan, tier.id, "sub_tx1".into()).await.unwrap();

    let err = service.delete_tier(tier.id, provider).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Subscription(SubscriptionError::TierHasSubscribers)
    ));

    service.cancel(subscription.id, fan).await.unwrap();
    service.delete_tier(tier.id, provider).await.unwrap();
    assert!(service.tiers_for_provider(provider).await.unwrap().is_empty());
}

#[tokio::test]
async fn tiers_list_cheapest_first() {
    let world = world();
    let provider = world.add_principal(Some("GARTIST"));
    let service = world.subscription_service(None);

    for (name, price) in [("Front row", dec!(40)), ("Backstage", dec!(10)), ("Balcony", dec!(25))] {
        service
            .create_tier(
                provider,
                NewTier {
                    name: name.to_string(),
                    price_native: price,
                    price_fiat: dec!(5),
                    max_subscribers: None,
                },
            )
            .await
            .unwrap();
    }

    let tiers = service.tiers_for_provider(provider).await.unwrap();
    let prices: Vec<_> = tiers.iter().map(|t| t.price_native).collect();
    assert_eq!(prices, vec![dec!(10), dec!(25), dec!(40)]);
}
