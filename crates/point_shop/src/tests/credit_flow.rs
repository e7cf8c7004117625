//! External credit intake and the rate-limited manual retry path.

use crate::credit::CreditPayload;
use crate::error::ShopError;
use crate::tests::support::{shop_with_channel, ScriptedChannel};
use crate::types::TransactionStatus;

fn payload_for(eos_id: &str, points: i64) -> CreditPayload {
    CreditPayload {
        eos_id: Some(eos_id.to_string()),
        points,
        ..CreditPayload::default()
    }
}

#[test]
fn webhook_credit_lands_with_provenance_tag() {
    let (shop, _channel) = shop_with_channel(ScriptedChannel::healthy());
    let receipt = shop
        .credit(&payload_for("eos-1", 40), 1_000)
        .expect("credit");
    assert_eq!(receipt.player_id, "eos-1");
    assert_eq!(receipt.new_balance, 40);

    let transactions = shop.ledger().transactions_for("eos-1");
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].status, TransactionStatus::Tip4Serv);
    assert_eq!(transactions[0].source, "tip4serv");
}

#[test]
fn zero_point_webhook_is_rejected_before_any_ledger_effect() {
    let (shop, _channel) = shop_with_channel(ScriptedChannel::healthy());
    let err = shop
        .credit(&payload_for("eos-1", 0), 1_000)
        .expect_err("expected rejection");
    assert!(matches!(err, ShopError::InvalidCreditPayload { .. }));
    assert_eq!(shop.ledger().transaction_count(), 0);
    assert_eq!(shop.balance("eos-1"), 0);
}

#[test]
fn credit_resolves_platform_aliases_to_the_canonical_id() {
    let (shop, _channel) = shop_with_channel(ScriptedChannel::healthy());
    let payload = CreditPayload {
        steam_id: Some("s-100".to_string()),
        points: 25,
        ..CreditPayload::default()
    };
    let receipt = shop.credit(&payload, 1_000).expect("credit");
    assert_eq!(receipt.player_id, "eos-1");
    assert_eq!(shop.balance("eos-1"), 25);
}

#[test]
fn manual_retry_is_capped_per_actor_subject_window() {
    let (shop, _channel) = shop_with_channel(ScriptedChannel::healthy());
    let payload = payload_for("eos-1", 10);

    let first = shop
        .retry_credit("admin", &payload, 1_000)
        .expect("first retry");
    assert_eq!(first.new_balance, 10);
    let second = shop
        .retry_credit("admin", &payload, 2_000)
        .expect("second retry");
    assert_eq!(second.new_balance, 20);

    let third = shop
        .retry_credit("admin", &payload, 3_000)
        .expect_err("expected denial");
    assert_eq!(
        third,
        ShopError::RetryLimitExceeded {
            actor_id: "admin".to_string(),
            subject_id: "eos-1".to_string(),
        }
    );
    // Denied retries leave the ledger untouched.
    assert_eq!(shop.balance("eos-1"), 20);
    assert_eq!(shop.ledger().transaction_count(), 2);

    let transactions = shop.ledger().transactions_for("eos-1");
    assert!(transactions
        .iter()
        .all(|transaction| transaction.status == TransactionStatus::ManualRetry));
    assert_eq!(transactions[0].source, "manual_retry:admin");
}

#[test]
fn denied_retry_burns_no_budget_for_other_actors_or_subjects() {
    let (shop, _channel) = shop_with_channel(ScriptedChannel::healthy());
    let payload = payload_for("eos-1", 10);
    shop.retry_credit("admin", &payload, 1_000).expect("retry");
    shop.retry_credit("admin", &payload, 1_000).expect("retry");
    assert!(shop.retry_credit("admin", &payload, 1_000).is_err());

    // A different actor and a different subject each have a fresh window.
    assert!(shop.retry_credit("moderator", &payload, 1_000).is_ok());
    assert!(shop
        .retry_credit("admin", &payload_for("eos-2", 10), 1_000)
        .is_ok());
}

#[test]
fn admin_reset_restores_the_retry_budget() {
    let (shop, _channel) = shop_with_channel(ScriptedChannel::healthy());
    let payload = payload_for("eos-1", 10);
    shop.retry_credit("admin", &payload, 1_000).expect("retry");
    shop.retry_credit("admin", &payload, 1_000).expect("retry");
    assert!(shop.retry_credit("admin", &payload, 1_000).is_err());

    shop.reset_retry_window("admin", "eos-1").expect("reset");
    let after_reset = shop
        .retry_credit("admin", &payload, 2_000)
        .expect("retry after reset");
    assert_eq!(after_reset.new_balance, 30);
}

#[test]
fn retry_of_an_unresolvable_credit_spends_budget_but_commits_nothing() {
    let (shop, _channel) = shop_with_channel(ScriptedChannel::healthy());
    let payload = CreditPayload {
        steam_id: Some("s-missing".to_string()),
        points: 10,
        ..CreditPayload::default()
    };
    for _ in 0..2 {
        let err = shop
            .retry_credit("admin", &payload, 1_000)
            .expect_err("expected unresolved identity");
        assert!(matches!(err, ShopError::UnresolvedIdentity { .. }));
    }
    let err = shop
        .retry_credit("admin", &payload, 1_000)
        .expect_err("expected denial");
    assert!(matches!(err, ShopError::RetryLimitExceeded { .. }));
    assert_eq!(shop.ledger().transaction_count(), 0);
}
