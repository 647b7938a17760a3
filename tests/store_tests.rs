//! Durability tests for the SQLite license store.

#![cfg(feature = "sqlite")]

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use sqlx::sqlite::SqlitePoolOptions;

use apex_license::activation::{ActivationManager, InstallationStatus};
use apex_license::clock::ManualClock;
use apex_license::config::{ApexConfig, DatabaseConfig};
use apex_license::license::{LicenseKind, LicenseRecord, LicenseStatus};
use apex_license::license_key::{generate_license_key, LicenseKeyConfig};
use apex_license::store::{InstallationState, LicenseStore};

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 10, 1, 8, 30, 0).unwrap(),
    ))
}

/// A single-connection pool so every handle sees the same in-memory database.
async fn shared_pool() -> sqlx::SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("failed to open in-memory SQLite")
}

#[tokio::test]
async fn activation_is_visible_to_a_new_manager() {
    let pool = shared_pool().await;
    let config = ApexConfig::default();
    let clock = clock();

    let first = ActivationManager::new(
        Arc::new(LicenseStore::from_sqlite_pool(pool.clone()).await.unwrap()),
        &config,
        clock.clone(),
    );
    let trial = first.generate_trial("a@b.com", 7).await.unwrap();
    first.activate(&trial.license_key, "a@b.com").await.unwrap();
    drop(first);

    let second = ActivationManager::new(
        Arc::new(LicenseStore::from_sqlite_pool(pool).await.unwrap()),
        &config,
        clock,
    );
    let report = second.status().await.unwrap();
    assert_eq!(report.status, InstallationStatus::Active);
    assert_eq!(report.license_key.as_deref(), Some(trial.license_key.as_str()));
    assert_eq!(report.email.as_deref(), Some("a@b.com"));
}

#[tokio::test]
async fn lazy_expiry_is_persisted() {
    let pool = shared_pool().await;
    let clock = clock();
    let store = Arc::new(LicenseStore::from_sqlite_pool(pool).await.unwrap());
    let manager = ActivationManager::new(store.clone(), &ApexConfig::default(), clock.clone());

    let trial = manager.generate_trial("a@b.com", 7).await.unwrap();
    manager.activate(&trial.license_key, "a@b.com").await.unwrap();

    clock.advance(Duration::days(8));
    assert_eq!(
        manager.status().await.unwrap().status,
        InstallationStatus::Expired
    );

    let stored = store.get_license(&trial.license_key).await.unwrap().unwrap();
    assert_eq!(stored.status, LicenseStatus::Expired);
}

#[tokio::test]
async fn records_round_trip_through_sqlite() {
    let pool = shared_pool().await;
    let store = LicenseStore::from_sqlite_pool(pool).await.unwrap();
    let manager = ActivationManager::new(
        Arc::new(store.clone()),
        &ApexConfig::default(),
        clock(),
    );

    let trial = manager.generate_trial("a@b.com", 30).await.unwrap();
    let revoked = manager
        .revoke(&trial.license_key, Some("fraud"))
        .await
        .unwrap();

    let stored = store.get_license(&trial.license_key).await.unwrap().unwrap();
    assert_eq!(stored, revoked);
    assert!(store.license_exists(&trial.license_key).await.unwrap());
    assert!(!store.license_exists("WARP-2222-2222-2222-2222").await.unwrap());
}

#[tokio::test]
async fn duplicate_key_does_not_overwrite_existing_license() {
    let pool = shared_pool().await;
    let store = LicenseStore::from_sqlite_pool(pool).await.unwrap();

    let now = Utc.with_ymd_and_hms(2026, 10, 1, 8, 30, 0).unwrap();
    let key = generate_license_key(&LicenseKeyConfig::default());
    let mut active = LicenseRecord::issue(
        key.clone(),
        "owner@example.com".to_string(),
        LicenseKind::Paid,
        now,
        30,
    )
    .unwrap();
    active.status = LicenseStatus::Active;
    active.activated_at = Some(now);
    assert!(store.insert_new_license(&active).await.unwrap());

    let collision = LicenseRecord::issue(
        key.clone(),
        "other@example.com".to_string(),
        LicenseKind::Trial,
        now,
        7,
    )
    .unwrap();
    assert!(!store.insert_new_license(&collision).await.unwrap());

    assert_eq!(store.get_license(&key).await.unwrap(), Some(active));
}

#[tokio::test]
async fn commit_replaces_installation_binding() {
    let pool = shared_pool().await;
    let store = LicenseStore::from_sqlite_pool(pool).await.unwrap();
    assert!(store.installation().await.unwrap().is_none());

    let now = Utc.with_ymd_and_hms(2026, 10, 1, 8, 30, 0).unwrap();
    let key = generate_license_key(&LicenseKeyConfig::default());
    let mut record =
        LicenseRecord::issue(key.clone(), "a@b.com".to_string(), LicenseKind::Paid, now, 30)
            .unwrap();
    record.status = LicenseStatus::Active;
    record.activated_at = Some(now);

    let state = InstallationState {
        license_key: Some(key.clone()),
        updated_at: now,
    };
    store.commit(&[record.clone()], &state).await.unwrap();
    assert_eq!(store.installation().await.unwrap(), Some(state));
    assert_eq!(store.get_license(&key).await.unwrap(), Some(record));

    let cleared = InstallationState {
        license_key: None,
        updated_at: now + Duration::minutes(1),
    };
    store.commit(&[], &cleared).await.unwrap();
    assert_eq!(store.installation().await.unwrap(), Some(cleared));
}

#[tokio::test]
async fn file_store_survives_reconnect() {
    let path = std::env::temp_dir().join(format!("apex-license-{}.db", uuid::Uuid::new_v4()));
    let config = DatabaseConfig {
        db_type: "sqlite".to_string(),
        sqlite_url: format!("sqlite://{}?mode=rwc", path.display()),
    };
    let clock = clock();

    let key = {
        let store = LicenseStore::connect(&config).await.unwrap();
        let manager = ActivationManager::new(store.clone(), &ApexConfig::default(), clock.clone());
        let trial = manager.generate_trial("a@b.com", 7).await.unwrap();
        manager.activate(&trial.license_key, "a@b.com").await.unwrap();
        if let LicenseStore::SQLite(pool) = &*store {
            pool.close().await;
        }
        trial.license_key
    };

    let store = LicenseStore::connect(&config).await.unwrap();
    let manager = ActivationManager::new(store.clone(), &ApexConfig::default(), clock);
    let report = manager.status().await.unwrap();
    assert_eq!(report.status, InstallationStatus::Active);
    assert_eq!(report.license_key.as_deref(), Some(key.as_str()));

    if let LicenseStore::SQLite(pool) = &*store {
        pool.close().await;
    }
    let _ = std::fs::remove_file(&path);
}
