//! Generic Netlink transport.
//!
//! Wire codec (`nlmsghdr`, `genlmsghdr`, TLV attributes with declared
//! policies), an async kernel socket, a [`GenlConnection`](genl::GenlConnection)
//! that resolves family and multicast group names, and an in-process
//! [`LoopbackBus`](loopback::LoopbackBus) controller speaking the same wire
//! format.
//!
//! # Quick Start
//!
//! ```ignore
//! use genlbus::netlink::genl::GenlConnection;
//!
//! let conn = GenlConnection::new()?;
//! let family = conn.get_family("genl_test0").await?;
//! for (name, id) in &family.mcast_groups {
//!     println!("{name}: {id}");
//! }
//! ```

pub mod attr;
mod builder;
mod error;
pub mod genl;
pub mod loopback;
pub mod message;
mod socket;

pub use attr::{AttrIter, AttrKind, AttrPolicy, NlAttr, ParsedAttrs, Policy};
pub use builder::{MessageBuilder, NestToken};
pub use error::{Error, Result};
pub use message::{MessageIter, NLMSG_HDRLEN, NlMsgHdr, NlMsgType};
pub use socket::{NetlinkSocket, Transport};
