mod common;

use billing_engine::models::{ApiKeyType, NotificationChannel, NotificationStatus};
use billing_engine::services::{MemoryStore, UsageStore};
use common::*;
use platform_core::error::AppError;
use std::sync::Arc;
use uuid::Uuid;

#[tokio::test]
async fn rebuild_groups_events_and_sums_units() {
    let store = Arc::new(MemoryStore::new());
    let service_id = Uuid::new_v4();
    let template_id = Uuid::new_v4();

    store.add_service(service(service_id, "parking permits")).await;
    store.add_rate(sms_rate("2018-01-01T00:00:00Z", "0.0158")).await;
    store
        .add_event(sms_event(service_id, template_id, 1, "2019-06-14T09:00:00Z"))
        .await;
    store
        .add_event(sms_event(service_id, template_id, 3, "2019-06-14T17:30:00Z"))
        .await;

    let facts = rollup(&store)
        .rebuild_service_day(date("2019-06-14"), service_id)
        .await
        .expect("rebuild");

    assert_eq!(facts.len(), 1);
    assert_eq!(facts[0].billable_units, 4);
    assert_eq!(facts[0].notifications_sent, 2);
    assert_eq!(facts[0].rate, dec("0.0158"));
    assert_eq!(facts[0].provider, "mmg");
    assert!(!facts[0].international);
}

#[tokio::test]
async fn rebuild_excludes_test_keys_and_non_billable_statuses() {
    let store = Arc::new(MemoryStore::new());
    let service_id = Uuid::new_v4();
    let template_id = Uuid::new_v4();

    store.add_service(service(service_id, "blue badge")).await;
    store.add_rate(sms_rate("2018-01-01T00:00:00Z", "0.0158")).await;

    let mut test_key = sms_event(service_id, template_id, 1, "2019-06-14T09:00:00Z");
    test_key.key_type = ApiKeyType::Test;
    store.add_event(test_key).await;

    let mut failed = sms_event(service_id, template_id, 1, "2019-06-14T10:00:00Z");
    failed.status = NotificationStatus::TechnicalFailure;
    store.add_event(failed).await;

    // Email "sent" is not billable even though SMS "sent" is.
    let mut email_sent = email_event(service_id, template_id, "2019-06-14T11:00:00Z");
    email_sent.status = NotificationStatus::Sent;
    store.add_event(email_sent).await;

    store
        .add_event(sms_event(service_id, template_id, 2, "2019-06-14T12:00:00Z"))
        .await;

    let facts = rollup(&store)
        .rebuild_service_day(date("2019-06-14"), service_id)
        .await
        .expect("rebuild");

    assert_eq!(facts.len(), 1);
    assert_eq!(facts[0].channel, NotificationChannel::Sms);
    assert_eq!(facts[0].billable_units, 2);
    assert_eq!(facts[0].notifications_sent, 1);
}

#[tokio::test]
async fn rebuild_respects_service_channel_permission() {
    let store = Arc::new(MemoryStore::new());
    let service_id = Uuid::new_v4();
    let template_id = Uuid::new_v4();

    let mut svc = service(service_id, "sms only");
    svc.permissions = vec![NotificationChannel::Sms];
    store.add_service(svc).await;
    store.add_rate(sms_rate("2018-01-01T00:00:00Z", "0.0158")).await;
    store
        .add_event(sms_event(service_id, template_id, 1, "2019-06-14T09:00:00Z"))
        .await;
    store
        .add_event(email_event(service_id, template_id, "2019-06-14T09:05:00Z"))
        .await;

    let facts = rollup(&store)
        .rebuild_service_day(date("2019-06-14"), service_id)
        .await
        .expect("rebuild");

    assert_eq!(facts.len(), 1);
    assert_eq!(facts[0].channel, NotificationChannel::Sms);
}

#[tokio::test]
async fn rebuild_twice_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let service_id = Uuid::new_v4();
    let template_id = Uuid::new_v4();

    store.add_service(service(service_id, "council tax")).await;
    store.add_rate(sms_rate("2018-01-01T00:00:00Z", "0.0158")).await;
    store
        .add_event(sms_event(service_id, template_id, 2, "2019-06-14T09:00:00Z"))
        .await;
    store
        .add_event(email_event(service_id, template_id, "2019-06-14T09:30:00Z"))
        .await;

    let builder = rollup(&store);
    builder
        .rebuild_service_day(date("2019-06-14"), service_id)
        .await
        .expect("first rebuild");
    let count_after_first = store.fact_count().await;

    builder
        .rebuild_service_day(date("2019-06-14"), service_id)
        .await
        .expect("second rebuild");

    assert_eq!(store.fact_count().await, count_after_first);
    let facts = store
        .facts_for_service(service_id, date("2019-06-14"), date("2019-06-14"))
        .await
        .expect("facts");
    assert_eq!(facts.len(), 2);
    let sms = facts
        .iter()
        .find(|f| f.channel == NotificationChannel::Sms)
        .expect("sms fact");
    assert_eq!(sms.billable_units, 2);
    assert_eq!(sms.notifications_sent, 1);
}

#[tokio::test]
async fn day_window_follows_the_reporting_zone() {
    let store = Arc::new(MemoryStore::new());
    let service_id = Uuid::new_v4();
    let template_id = Uuid::new_v4();

    store.add_service(service(service_id, "bst boundary")).await;
    store.add_rate(sms_rate("2016-01-01T00:00:00Z", "1.2")).await;
    // 23:30 UTC on September 30 is already October 1 in London during BST.
    store
        .add_event(sms_event(service_id, template_id, 1, "2018-09-30T23:30:00Z"))
        .await;

    let builder = rollup(&store);
    let previous_day = builder
        .rebuild_service_day(date("2018-09-30"), service_id)
        .await
        .expect("rebuild");
    assert!(previous_day.is_empty());

    let next_day = builder
        .rebuild_service_day(date("2018-10-01"), service_id)
        .await
        .expect("rebuild");
    assert_eq!(next_day.len(), 1);
    assert_eq!(next_day[0].local_date, date("2018-10-01"));
}

#[tokio::test]
async fn one_failing_service_does_not_block_the_day() {
    let store = Arc::new(MemoryStore::new());
    let sms_service = Uuid::new_v4();
    let email_service = Uuid::new_v4();
    let template_id = Uuid::new_v4();

    store.add_service(service(sms_service, "no rate rows")).await;
    store.add_service(service(email_service, "email only")).await;
    // No SMS rates seeded, so the SMS service's unit must fail.
    store
        .add_event(sms_event(sms_service, template_id, 1, "2019-06-14T09:00:00Z"))
        .await;
    store
        .add_event(email_event(email_service, template_id, "2019-06-14T09:00:00Z"))
        .await;

    let outcome = rollup(&store)
        .rebuild_day(date("2019-06-14"))
        .await
        .expect("rebuild_day");

    assert_eq!(outcome.facts_written, 1);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].service_id, Some(sms_service));
    assert!(matches!(
        outcome.failures[0].error,
        AppError::MissingRate { .. }
    ));
}

#[tokio::test]
async fn rebuild_range_rejects_inverted_ranges() {
    let store = Arc::new(MemoryStore::new());
    let result = rollup(&store)
        .rebuild_range(date("2019-06-14"), date("2019-06-01"))
        .await;
    assert!(matches!(result, Err(AppError::InvalidDateRange(_))));
}

#[tokio::test]
async fn rebuild_range_covers_every_day() {
    let store = Arc::new(MemoryStore::new());
    let service_id = Uuid::new_v4();
    let template_id = Uuid::new_v4();

    store.add_service(service(service_id, "range")).await;
    store.add_rate(sms_rate("2018-01-01T00:00:00Z", "0.0158")).await;
    store
        .add_event(sms_event(service_id, template_id, 1, "2019-06-10T09:00:00Z"))
        .await;
    store
        .add_event(sms_event(service_id, template_id, 1, "2019-06-12T09:00:00Z"))
        .await;

    let outcome = rollup(&store)
        .rebuild_range(date("2019-06-10"), date("2019-06-12"))
        .await
        .expect("rebuild_range");

    assert!(outcome.is_clean());
    assert_eq!(outcome.facts_written, 2);
    assert_eq!(store.fact_count().await, 2);
}
