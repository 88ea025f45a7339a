//! Run a producer and two clients over the in-process loopback bus.
//!
//! Run with: cargo run -p genlbus --example loopback
//!
//! The producer registers the five bus families and greets group 0 of each
//! family every second. A subscriber listens on groups 0 and 150 and
//! prints what it receives; a sender delivers one command to family 0.
//! Set `RUST_LOG=genlbus=info` to see the producer side log the command.

use std::ops::ControlFlow;
use std::time::Duration;

use genlbus::bus::{self, FamilyRegistry, MessageText, SchedulerConfig, SubscriptionSet};
use genlbus::netlink::genl::GenlConnection;
use genlbus::netlink::loopback::LoopbackBus;

#[tokio::main]
async fn main() -> genlbus::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let loopback = LoopbackBus::new();
    let mut registry = FamilyRegistry::new(loopback.clone());
    registry.register_all()?;
    registry.start_broadcast(SchedulerConfig {
        interval: Duration::from_secs(1),
        ..SchedulerConfig::default()
    });
    println!("Registered families: {}", loopback.families().join(", "));

    let listener = GenlConnection::from_socket(loopback.socket());
    let mut subscriber = bus::subscribe(listener, &SubscriptionSet::from_ids([0, 150])?).await?;
    for group in subscriber.groups() {
        println!(
            "Joined {} ({}): family id {}, group id {}",
            group.global, group.address, group.family_id, group.group_id
        );
    }

    let sender = GenlConnection::from_socket(loopback.socket());
    bus::send_command(&sender, 0, &MessageText::new("hello from the sender")).await?;

    let mut received = 0;
    subscriber
        .run(|notification| {
            println!("{}", notification);
            received += 1;
            if received == 3 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .await?;

    registry.teardown_all();
    Ok(())
}
