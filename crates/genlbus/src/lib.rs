//! Publish/subscribe bus over Generic Netlink.
//!
//! A producer registers five Generic Netlink families (`genl_test0` to
//! `genl_test4`), each owning a hundred multicast groups (`genl_mcgrp0` to
//! `genl_mcgrp99`). Clients address groups by one flat number in `0..500`,
//! subscribe to any of them and print what arrives, or send a one-shot text
//! command to family 0.
//!
//! # Example
//!
//! ```ignore
//! use genlbus::bus::{self, SubscriptionSet};
//! use genlbus::netlink::genl::GenlConnection;
//!
//! #[tokio::main]
//! async fn main() -> genlbus::Result<()> {
//!     let conn = GenlConnection::new()?;
//!     let groups = SubscriptionSet::from_ids([0, 150])?;
//!
//!     let mut subscriber = bus::subscribe(conn, &groups).await?;
//!     loop {
//!         println!("{}", subscriber.next().await?);
//!     }
//! }
//! ```
//!
//! # Producer
//!
//! ```ignore
//! use genlbus::bus::{FamilyRegistry, SchedulerConfig};
//! use genlbus::netlink::loopback::LoopbackBus;
//!
//! let bus = LoopbackBus::new();
//! let mut registry = FamilyRegistry::new(bus.clone());
//! registry.register_all()?;
//! registry.start_broadcast(SchedulerConfig::default());
//! ```

pub mod bus;
pub mod netlink;

pub use netlink::{Error, Result};
