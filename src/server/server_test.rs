use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::sleep;

use super::*;
use crate::AddressSpace;
use crate::NodeId;
use crate::ServerConfig;

fn config(simulation: bool) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.simulation.enabled = simulation;
    config
}

#[tokio::test]
async fn test_build_installs_simulated_sensors() {
    let (_tx, rx) = watch::channel(());
    let server = ServerBuilder::init(config(true), rx).build().unwrap().ready().unwrap();

    let space = &server.context().address_space;
    for id in 1000..=1003 {
        assert!(space.contains(&NodeId::numeric(2, id)));
    }
}

#[tokio::test]
async fn test_build_without_simulation_keeps_bare_skeleton() {
    let (_tx, rx) = watch::channel(());
    let server = ServerBuilder::init(config(false), rx).build().unwrap().ready().unwrap();

    assert_eq!(server.context().address_space.len(), AddressSpace::with_standard_folders().len());
}

#[tokio::test]
async fn test_custom_address_space_is_served() {
    let (_tx, rx) = watch::channel(());
    let space = Arc::new(AddressSpace::with_standard_folders());
    let server = ServerBuilder::init(config(true), rx)
        .address_space(space.clone())
        .build()
        .unwrap()
        .ready()
        .unwrap();

    assert!(Arc::ptr_eq(&server.context().address_space, &space));
    assert!(space.contains(&NodeId::numeric(2, 1000)));
}

#[tokio::test]
async fn test_duplicate_sensor_install_fails_build() {
    let (_tx, rx) = watch::channel(());
    let space = Arc::new(AddressSpace::with_standard_folders());
    crate::SimulationDriver::install(&config(true).simulation, &space).unwrap();

    let result = ServerBuilder::init(config(true), rx).address_space(space).build();
    assert!(result.is_err());
}

#[tokio::test]
async fn test_ready_requires_build() {
    let (_tx, rx) = watch::channel(());
    assert!(ServerBuilder::init(config(false), rx).ready().is_err());
}

#[tokio::test]
async fn test_serve_stops_on_shutdown() {
    let (tx, rx) = watch::channel(());
    let server = ServerBuilder::init(config(true), rx).build().unwrap().ready().unwrap();
    let ctx = server.context().clone();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let handle = tokio::spawn(server.serve(listener));

    sleep(Duration::from_millis(50)).await;
    tx.send(()).unwrap();
    handle.await.unwrap().unwrap();

    assert!(ctx.channels.is_empty());
    assert!(ctx.subscriptions.sampling_intervals().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_sweep_loop_runs_on_its_period() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = watch::channel(());

    let counter = calls.clone();
    let handle = tokio::spawn(sweep_loop("test", Duration::from_millis(1000), rx, move || {
        counter.fetch_add(1, Ordering::SeqCst);
        0
    }));

    sleep(Duration::from_millis(3500)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    tx.send(()).unwrap();
    handle.await.unwrap().unwrap();
}
