//! End-to-end lifecycle scenarios with a live sweeper task, run against
//! tokio's paused clock for determinism.

use std::{path::Path, sync::Arc, time::Duration};

use well_pits::{PitRegistry, RegistryConfig, run_sweeper};

async fn fast_registry(dir: &Path) -> Arc<PitRegistry> {
    let registry = PitRegistry::open(RegistryConfig {
        dir: dir.to_path_buf(),
        ttl: Duration::from_millis(100),
        cleanup_interval: Duration::from_millis(50),
    })
    .await
    .unwrap();
    Arc::new(registry)
}

#[tokio::test(start_paused = true)]
async fn idle_pit_is_swept_after_ttl() {
    let dir = tempfile::tempdir().unwrap();
    let registry = fast_registry(dir.path()).await;
    let sweeper = tokio::spawn(run_sweeper(Arc::clone(&registry)));

    registry.ensure("x").await.unwrap();
    assert_eq!(registry.stats().await.total_pits, 1);

    tokio::time::sleep(Duration::from_millis(200)).await;

    let stats = registry.stats().await;
    assert_eq!(stats.total_pits, 0);
    assert!(!registry.exists("x").await);
    sweeper.abort();
}

#[tokio::test(start_paused = true)]
async fn connected_pit_outlives_any_idle_window() {
    let dir = tempfile::tempdir().unwrap();
    let registry = fast_registry(dir.path()).await;
    let sweeper = tokio::spawn(run_sweeper(Arc::clone(&registry)));

    registry.ensure("x").await.unwrap();
    registry.increment_connections("x").await;

    tokio::time::sleep(Duration::from_millis(500)).await;

    let stats = registry.stats().await;
    assert_eq!(stats.total_pits, 1);
    assert_eq!(stats.pits[0].connections, 1);
    sweeper.abort();
}

#[tokio::test(start_paused = true)]
async fn reconnection_cancels_pending_eviction() {
    let dir = tempfile::tempdir().unwrap();
    let registry = fast_registry(dir.path()).await;
    let sweeper = tokio::spawn(run_sweeper(Arc::clone(&registry)));

    // Last client leaves at t=0; the pit starts its idle clock.
    registry.ensure("y").await.unwrap();
    registry.increment_connections("y").await;
    registry.decrement_connections("y").await;

    // A new client shows up before the next sweep fires.
    tokio::time::sleep(Duration::from_millis(40)).await;
    registry.ensure("y").await.unwrap();
    registry.increment_connections("y").await;

    // Ride through several sweep intervals; the pit must stay active.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let stats = registry.stats().await;
    assert_eq!(stats.total_pits, 1);
    assert_eq!(stats.pits[0].slug, "y");
    assert_eq!(stats.pits[0].connections, 1);
    sweeper.abort();
}

#[tokio::test(start_paused = true)]
async fn sweep_removes_snapshot_files_with_the_pit() {
    let dir = tempfile::tempdir().unwrap();
    let registry = fast_registry(dir.path()).await;
    let sweeper = tokio::spawn(run_sweeper(Arc::clone(&registry)));

    registry.ensure("z").await.unwrap();
    registry.increment_connections("z").await;
    registry.decrement_connections("z").await;
    assert!(dir.path().join("z.pit").exists());
    assert!(dir.path().join("z.meta.json").exists());

    tokio::time::sleep(Duration::from_millis(300)).await;

    // Stats take the registry lock, which the eviction holds until its file
    // deletes finish; this synchronizes the assertions below.
    assert_eq!(registry.stats().await.total_pits, 0);
    assert!(!dir.path().join("z.pit").exists());
    assert!(!dir.path().join("z.meta.json").exists());
    sweeper.abort();
}
