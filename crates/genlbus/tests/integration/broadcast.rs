//! Broadcast scheduler integration tests.

use std::time::Duration;

use genlbus::Result;
use genlbus::bus::{self, SchedulerConfig, SubscriptionSet};
use genlbus::netlink::genl::GenlConnection;

use crate::common::producer;

#[tokio::test(start_paused = true)]
async fn test_scheduler_reaches_every_family() -> Result<()> {
    let (bus, mut registry) = producer()?;

    let conn = GenlConnection::from_socket(bus.socket());
    let groups = SubscriptionSet::from_ids([0, 100, 200, 300, 400])?;
    let mut subscriber = bus::subscribe(conn, &groups).await?;

    registry.start_broadcast(SchedulerConfig {
        interval: Duration::from_millis(100),
        ..SchedulerConfig::default()
    });

    let mut texts = Vec::new();
    for _ in 0..5 {
        texts.push(subscriber.next().await?.to_string());
    }
    texts.sort();
    let expected: Vec<String> = (0..5)
        .map(|i| format!("Kernel says: Hello from family {i}, group genl_mcgrp0"))
        .collect();
    assert_eq!(texts, expected);

    // The timer rearms itself
    let again = subscriber.next().await?;
    assert!(again.to_string().starts_with("Kernel says: Hello from family"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_teardown_stops_scheduler() -> Result<()> {
    let (bus, mut registry) = producer()?;

    let conn = GenlConnection::from_socket(bus.socket());
    let subscriber = bus::subscribe(conn, &SubscriptionSet::from_ids([0])?).await?;

    registry.start_broadcast(SchedulerConfig::default());
    registry.teardown_all();
    assert!(!registry.is_broadcasting());

    tokio::time::sleep(SchedulerConfig::default().interval * 3).await;
    assert_eq!(subscriber.connection().socket().pending(), 0);
    assert!(bus.families().is_empty());
    Ok(())
}
