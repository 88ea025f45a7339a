//! Command channel integration tests.

use genlbus::bus::protocol::parse_message;
use genlbus::bus::{self, BUS_VERSION, BusCmd, MSG_MAX_LEN, MessageText};
use genlbus::netlink::genl::GenlConnection;
use genlbus::netlink::loopback::LoopbackBus;
use genlbus::netlink::{NLMSG_HDRLEN, Transport};
use genlbus::{Error, Result};

use crate::common::producer;

#[tokio::test]
async fn test_send_command() -> Result<()> {
    let (bus, registry) = producer()?;
    let mut monitor = bus.monitor();

    let conn = GenlConnection::from_socket(bus.socket());
    bus::send_command(&conn, 0, &MessageText::new("hello")).await?;

    let event = monitor.recv().await.unwrap();
    assert_eq!(event.pid, conn.socket().pid());
    assert_eq!(event.family, "genl_test0");
    assert_eq!(event.error, 0);
    assert_eq!(
        parse_message(&event.frame[NLMSG_HDRLEN..])?.as_deref(),
        Some("hello")
    );

    // Only the ack came back, and it was consumed
    assert_eq!(conn.socket().pending(), 0);
    assert_eq!(registry.families()[0].name(), event.family);
    Ok(())
}

#[tokio::test]
async fn test_command_without_text_is_rejected() -> Result<()> {
    let (bus, registry) = producer()?;
    let mut monitor = bus.monitor();
    let family_id = registry.families()[0].id();

    let conn = GenlConnection::from_socket(bus.socket());
    let err = conn
        .request(family_id, BusCmd::Msg as u8, BUS_VERSION, |_| {})
        .await
        .unwrap_err();
    assert_eq!(err.errno(), Some(libc::EINVAL));

    let event = monitor.recv().await.unwrap();
    assert_eq!(event.error, -libc::EINVAL);

    // The family keeps serving commands
    bus::send_command(&conn, 0, &MessageText::new("still here")).await?;
    Ok(())
}

#[tokio::test]
async fn test_unknown_command() -> Result<()> {
    let (bus, registry) = producer()?;
    let conn = GenlConnection::from_socket(bus.socket());

    let err = conn
        .request(registry.families()[0].id(), 7, BUS_VERSION, |_| {})
        .await
        .unwrap_err();
    assert_eq!(err.errno(), Some(libc::EOPNOTSUPP));
    Ok(())
}

#[tokio::test]
async fn test_long_text_is_truncated() -> Result<()> {
    let (bus, _registry) = producer()?;
    let mut monitor = bus.monitor();

    let conn = GenlConnection::from_socket(bus.socket());
    bus::send_command(&conn, 0, &MessageText::new("a".repeat(1000))).await?;

    let event = monitor.recv().await.unwrap();
    let text = parse_message(&event.frame[NLMSG_HDRLEN..])?.unwrap();
    assert_eq!(text.len(), MSG_MAX_LEN - 1);
    Ok(())
}

#[tokio::test]
async fn test_send_without_producer() {
    let bus = LoopbackBus::new();
    let conn = GenlConnection::from_socket(bus.socket());

    let err = bus::send_command(&conn, 0, &MessageText::new("hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ResolutionFailed { .. }));
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_send_to_other_family() -> Result<()> {
    let (bus, _registry) = producer()?;
    let mut monitor = bus.monitor();

    let conn = GenlConnection::from_socket(bus.socket());
    bus::send_command(&conn, 4, &MessageText::new("to four")).await?;
    assert_eq!(monitor.recv().await.unwrap().family, "genl_test4");

    let err = bus::send_command(&conn, 5, &MessageText::new("nope"))
        .await
        .unwrap_err();
    assert!(err.is_usage());
    Ok(())
}
