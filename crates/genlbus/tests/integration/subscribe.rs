//! Subscription and receive loop integration tests.

use std::ops::ControlFlow;

use genlbus::bus::{
    self, BusCmd, GroupAddress, MessageText, SchedulerConfig, SubscriptionSet, broadcast_once,
    protocol::build_message,
};
use genlbus::netlink::MessageBuilder;
use genlbus::netlink::genl::{FamilySpec, GenlConnection, Registrar};
use genlbus::netlink::loopback::LoopbackBus;
use genlbus::{Error, Result};

use crate::common::{FailingJoins, producer};

#[tokio::test]
async fn test_subscribe_and_receive_broadcast() -> Result<()> {
    let (bus, registry) = producer()?;
    let view = registry.view();

    let conn = GenlConnection::from_socket(bus.socket());
    let mut subscriber = bus::subscribe(conn, &SubscriptionSet::from_ids([0, 150])?).await?;

    let addresses: Vec<GroupAddress> = subscriber.groups().iter().map(|g| g.address).collect();
    assert_eq!(
        addresses,
        vec![
            GroupAddress { family: 0, group: 0 },
            GroupAddress { family: 1, group: 50 },
        ]
    );

    // Every family greets its group 0; only family 0's is joined
    let reports = broadcast_once(&bus, &view, &SchedulerConfig::default());
    assert_eq!(*reports[0].outcome.as_ref().unwrap(), 1);
    assert_eq!(*reports[1].outcome.as_ref().unwrap(), 0);

    let notification = subscriber.next().await?;
    assert_eq!(notification.family_id, view.families()[0].id);
    assert_eq!(
        notification.to_string(),
        "Kernel says: Hello from family 0, group genl_mcgrp0"
    );
    assert_eq!(subscriber.connection().socket().pending(), 0);
    Ok(())
}

#[tokio::test]
async fn test_receive_on_non_zero_group() -> Result<()> {
    let (bus, registry) = producer()?;
    let family = registry.view().families()[1].clone();

    let conn = GenlConnection::from_socket(bus.socket());
    let mut subscriber = bus::subscribe(conn, &SubscriptionSet::from_ids([150])?).await?;

    let frame = build_message(family.id, 0, Some(&MessageText::new("to group 50")));
    assert_eq!(bus.multicast(family.group_ids[50], &frame)?, 1);
    assert_eq!(bus.multicast(family.group_ids[51], &frame)?, 0);

    assert_eq!(subscriber.next().await?.text.as_deref(), Some("to group 50"));
    Ok(())
}

#[tokio::test]
async fn test_empty_message_keeps_loop_running() -> Result<()> {
    let (bus, registry) = producer()?;
    let family = registry.view().families()[0].clone();

    let conn = GenlConnection::from_socket(bus.socket());
    let mut subscriber = bus::subscribe(conn, &SubscriptionSet::from_ids([0])?).await?;

    bus.multicast(family.group_ids[0], &build_message(family.id, 0, None))?;
    bus.multicast(
        family.group_ids[0],
        &build_message(family.id, 0, Some(&MessageText::new("hi"))),
    )?;

    let mut seen = Vec::new();
    subscriber
        .run(|notification| {
            seen.push(notification.to_string());
            if seen.len() == 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .await?;

    assert_eq!(seen, vec!["Kernel sent empty message!!", "Kernel says: hi"]);
    Ok(())
}

#[tokio::test]
async fn test_policy_violation_prints_empty_message() -> Result<()> {
    let (bus, registry) = producer()?;
    let family = registry.view().families()[0].clone();

    let conn = GenlConnection::from_socket(bus.socket());
    let mut subscriber = bus::subscribe(conn, &SubscriptionSet::from_ids([0])?).await?;

    let mut oversized = MessageBuilder::genl(family.id, 0, BusCmd::Msg as u8, 1);
    oversized.append_attr_str(1, &"x".repeat(512));
    bus.multicast(family.group_ids[0], &oversized.finish())?;
    bus.multicast(
        family.group_ids[0],
        &build_message(family.id, 0, Some(&MessageText::new("after"))),
    )?;

    let first = subscriber.next().await?;
    assert_eq!(first.to_string(), "Kernel sent empty message!!");
    assert_eq!(subscriber.next().await?.text.as_deref(), Some("after"));
    Ok(())
}

#[tokio::test]
async fn test_missing_family_fails_without_membership() {
    let bus = LoopbackBus::new();
    let conn = GenlConnection::from_socket(bus.socket());

    let err = bus::subscribe(conn, &SubscriptionSet::from_ids([3, 250]).unwrap())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::ResolutionFailed { ref target, .. } if target == "genl_test0"));
}

#[tokio::test]
async fn test_missing_group_aborts_before_join() -> Result<()> {
    let bus = LoopbackBus::new();
    // A producer that only knows group 0
    let registered = bus.register_family(&FamilySpec {
        name: "genl_test0",
        version: 1,
        max_attr: 1,
        groups: vec!["genl_mcgrp0"],
        ops: &[],
    })?;

    let conn = GenlConnection::from_socket(bus.socket());
    let err = bus::subscribe(conn, &SubscriptionSet::from_ids([0, 5])?)
        .await
        .err()
        .unwrap();
    match &err {
        Error::ResolutionFailed { target, source } => {
            assert_eq!(target, "genl_test0/genl_mcgrp5");
            assert!(matches!(**source, Error::GroupNotFound { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }

    // Group 0 resolved first but was never joined
    let frame = build_message(registered.id, 0, None);
    assert_eq!(bus.multicast(registered.group_ids[0], &frame)?, 0);
    Ok(())
}

#[tokio::test]
async fn test_failed_join_releases_socket() -> Result<()> {
    let (bus, registry) = producer()?;
    let view = registry.view();

    // The second join is refused
    let conn = GenlConnection::from_socket(FailingJoins::new(bus.socket(), 2));
    let err = bus::subscribe(conn, &SubscriptionSet::from_ids([0, 150])?)
        .await
        .err()
        .unwrap();
    assert_eq!(err.errno(), Some(libc::ENOBUFS));
    assert!(err.to_string().contains("genl_test1/genl_mcgrp50"));

    // The group joined before the failure no longer reaches anyone
    let frame = build_message(view.families()[0].id, 0, Some(&MessageText::new("late")));
    assert_eq!(bus.multicast(view.families()[0].group_ids[0], &frame)?, 0);
    assert_eq!(bus.multicast(view.families()[1].group_ids[50], &frame)?, 0);
    Ok(())
}
