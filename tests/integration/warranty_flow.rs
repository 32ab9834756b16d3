//! End-to-end warranty lifecycle tests
//!
//! Walks a single appointment through finish, backjob filing, dispute
//! resolution, and the reconciliation sweep, checking the appointment, the
//! backjob application, and the derived conversation at each step.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use fixhub::db;
use fixhub::domain::{
    Appointment, AppointmentStatus, BackjobOutcome, BackjobStatus, ConversationStatus,
    WarrantyError,
};
use fixhub::events::{Event, EventBus};
use fixhub::service::WarrantyService;
use fixhub::sweep::{SweepConfig, Sweeper};

fn at(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .unwrap()
        .with_timezone(&Utc)
}

async fn setup() -> (sqlx::SqlitePool, EventBus, WarrantyService, Appointment) {
    let pool = db::init_database("sqlite::memory:").await.unwrap();
    let bus = EventBus::new();
    let service = WarrantyService::new(pool.clone(), bus.clone());

    let mut appointment =
        Appointment::new(Uuid::new_v4(), Uuid::new_v4(), at("2024-12-20T00:00:00Z"));
    appointment.status = AppointmentStatus::InProgress;
    db::create_appointment(&pool, &appointment).await.unwrap();

    (pool, bus, service, appointment)
}

#[tokio::test]
async fn full_lifecycle_finish_backjob_resolve_expire() {
    let (pool, bus, service, appointment) = setup().await;
    let sweeper = Arc::new(Sweeper::new(
        pool.clone(),
        bus.clone(),
        SweepConfig {
            interval: Duration::from_secs(300),
            batch_size: 100,
        },
    ));

    // Service finishes with a 15-day warranty
    let finished = service
        .mark_finished(&appointment.id, at("2025-01-01T00:00:00Z"), 15)
        .await
        .unwrap();
    assert_eq!(finished.status, AppointmentStatus::InWarranty);
    assert_eq!(finished.warranty_expires_at, Some(at("2025-01-16T00:00:00Z")));

    // Customer complains five days in; ten whole days remain
    let app = service
        .file_backjob(
            &appointment.id,
            &appointment.customer_id,
            "Faucet drips again".to_string(),
            Some(serde_json::json!({"video": "drip.mp4"})),
            at("2025-01-06T00:00:00Z"),
        )
        .await
        .unwrap();

    let paused = db::get_appointment(&pool, &appointment.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(paused.status, AppointmentStatus::Backjob);
    assert_eq!(paused.warranty_paused_at, Some(at("2025-01-06T00:00:00Z")));
    assert_eq!(paused.warranty_remaining_days, Some(10));

    // Admin cancels the complaint three days later; the ten banked days
    // restart from the resolution instant
    let resolved = service
        .resolve_backjob(
            &app.id,
            &Uuid::new_v4(),
            BackjobOutcome::CancelledByAdmin,
            Some("Provider photos show no defect".to_string()),
            at("2025-01-09T00:00:00Z"),
        )
        .await
        .unwrap();
    assert_eq!(resolved.status, BackjobStatus::CancelledByAdmin);

    let resumed = db::get_appointment(&pool, &appointment.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resumed.status, AppointmentStatus::InWarranty);
    assert_eq!(resumed.warranty_expires_at, Some(at("2025-01-19T00:00:00Z")));
    assert!(resumed.warranty_paused_at.is_none());
    assert!(resumed.warranty_remaining_days.is_none());

    let conversation = db::get_conversation(&pool, &appointment.customer_id, &appointment.provider_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(conversation.status, ConversationStatus::Active);
    assert_eq!(conversation.warranty_expires, Some(at("2025-01-19T00:00:00Z")));

    // The sweep finds the elapsed window and closes everything down
    let report = sweeper
        .try_run(at("2025-01-20T00:00:00Z"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.expired, 1);

    let completed = db::get_appointment(&pool, &appointment.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(completed.status, AppointmentStatus::Completed);

    let conversation = db::get_conversation(&pool, &appointment.customer_id, &appointment.provider_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(conversation.status, ConversationStatus::Closed);
    assert!(conversation.warranty_expires.is_none());
}

#[tokio::test]
async fn backjob_window_enforced_end_to_end() {
    let (_pool, _bus, service, appointment) = setup().await;

    service
        .mark_finished(&appointment.id, at("2025-01-01T00:00:00Z"), 15)
        .await
        .unwrap();

    // Exactly at expiry the window is closed
    let err = service
        .file_backjob(
            &appointment.id,
            &appointment.customer_id,
            "too late".to_string(),
            None,
            at("2025-01-16T00:00:00Z"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WarrantyError::WarrantyExpired { .. }));

    // One second earlier it is still open
    let app = service
        .file_backjob(
            &appointment.id,
            &appointment.customer_id,
            "just in time".to_string(),
            None,
            at("2025-01-15T23:59:59Z"),
        )
        .await
        .unwrap();
    assert_eq!(app.status, BackjobStatus::Pending);
    assert!(app.is_open());
}

#[tokio::test]
async fn conversation_tracks_latest_warranty_across_appointments() {
    let (pool, bus, service, first) = setup().await;

    // Second appointment for the same pair
    let mut second = Appointment::new(first.customer_id, first.provider_id, at("2025-01-02T00:00:00Z"));
    second.status = AppointmentStatus::InProgress;
    db::create_appointment(&pool, &second).await.unwrap();

    service
        .mark_finished(&first.id, at("2025-01-01T00:00:00Z"), 10)
        .await
        .unwrap();
    service
        .mark_finished(&second.id, at("2025-01-05T00:00:00Z"), 30)
        .await
        .unwrap();

    // Aggregate follows the later expiry
    let conversation = db::get_conversation(&pool, &first.customer_id, &first.provider_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(conversation.status, ConversationStatus::Active);
    assert_eq!(conversation.warranty_expires, Some(at("2025-02-04T00:00:00Z")));

    // After the first window lapses the second still holds the pair open
    let sweeper = Arc::new(Sweeper::new(pool.clone(), bus, SweepConfig::default()));
    let report = sweeper
        .try_run(at("2025-01-15T00:00:00Z"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.expired, 1);

    let conversation = db::get_conversation(&pool, &first.customer_id, &first.provider_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(conversation.status, ConversationStatus::Active);
    assert_eq!(conversation.warranty_expires, Some(at("2025-02-04T00:00:00Z")));
}

#[tokio::test]
async fn sweep_repairs_crash_between_update_and_sync() {
    let (pool, bus, service, appointment) = setup().await;

    service
        .mark_finished(&appointment.id, at("2025-01-01T00:00:00Z"), 15)
        .await
        .unwrap();

    // Simulate a crashed writer: the conversation was left claiming an
    // expiry older than the appointment's true window
    db::upsert_conversation(
        &pool,
        &appointment.customer_id,
        &appointment.provider_id,
        ConversationStatus::Active,
        Some(at("2025-01-02T00:00:00Z")),
        at("2025-01-01T12:00:00Z"),
    )
    .await
    .unwrap();

    let sweeper = Arc::new(Sweeper::new(pool.clone(), bus, SweepConfig::default()));
    let report = sweeper
        .try_run(at("2025-01-10T00:00:00Z"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.conversations_repaired, 1);

    let conversation = db::get_conversation(&pool, &appointment.customer_id, &appointment.provider_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(conversation.warranty_expires, Some(at("2025-01-16T00:00:00Z")));
}

#[tokio::test]
async fn events_published_through_lifecycle() {
    let (_pool, bus, service, appointment) = setup().await;
    let mut receiver = bus.subscribe();

    service
        .mark_finished(&appointment.id, at("2025-01-01T00:00:00Z"), 15)
        .await
        .unwrap();

    // First event is the conversation sync, then the warranty start
    let mut saw_started = false;
    let mut saw_synced = false;
    while let Ok(event) = receiver.try_recv() {
        match event {
            Event::WarrantyStarted { appointment_id, expires_at, .. } => {
                assert_eq!(appointment_id, appointment.id);
                assert_eq!(expires_at, at("2025-01-16T00:00:00Z"));
                saw_started = true;
            }
            Event::ConversationSynced { customer_id, .. } => {
                assert_eq!(customer_id, appointment.customer_id);
                saw_synced = true;
            }
            _ => {}
        }
    }
    assert!(saw_started);
    assert!(saw_synced);
}
