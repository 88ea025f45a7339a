//! Generic Netlink (GENL) support.
//!
//! Generic Netlink extends the standard netlink protocol with:
//! - Dynamic family ID allocation (resolved via control family)
//! - Family-specific commands and attributes
//! - Multicast group support per family
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ bus (resolve / command / receive)       │
//! └────────────────┬────────────────────────┘
//!                  │
//! ┌────────────────▼────────────────────────┐
//! │ GenlConnection<T: Transport>            │
//! │ (family resolution, family cache, acks) │
//! └────────────────┬────────────────────────┘
//!                  │
//! ┌────────────────▼────────────────────────┐
//! │ NetlinkSocket  |  LoopbackSocket        │
//! └─────────────────────────────────────────┘
//! ```
//!
//! The producer side registers families through a [`Registrar`], which is
//! implemented by the in-process [`LoopbackBus`](crate::netlink::loopback::LoopbackBus).
//!
//! # Example
//!
//! ```rust,no_run
//! use genlbus::netlink::genl::GenlConnection;
//!
//! # async fn example() -> genlbus::Result<()> {
//! let conn = GenlConnection::new()?;
//!
//! let family = conn.get_family("genl_test0").await?;
//! println!("genl_test0 family ID: {}", family.id);
//! # Ok(())
//! # }
//! ```

mod connection;
mod family;
mod header;

pub use connection::{FamilyInfo, GenlConnection};
pub use family::{CommandInfo, DoIt, FamilySpec, Operation, Registered, Registrar};
pub use header::{GENL_HDRLEN, GenlMsgHdr};

use super::attr::{AttrPolicy, Policy};

// Control family constants (fixed, not dynamically assigned)
pub const GENL_ID_CTRL: u16 = 0x10;

/// Name the control family is registered under.
pub const GENL_CTRL_NAME: &str = "nlctrl";

/// Control family commands
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtrlCmd {
    Unspec = 0,
    NewFamily = 1,
    DelFamily = 2,
    GetFamily = 3,
}

/// Control family attributes
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtrlAttr {
    Unspec = 0,
    FamilyId = 1,
    FamilyName = 2,
    Version = 3,
    HdrSize = 4,
    MaxAttr = 5,
    Ops = 6,
    McastGroups = 7,
}

/// Control family multicast group attributes
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtrlAttrMcastGrp {
    Unspec = 0,
    Name = 1,
    Id = 2,
}

/// Family names are limited to GENL_NAMSIZ bytes including the terminator.
pub const GENL_NAMSIZ: usize = 16;

/// Policy the controller applies to `CTRL_CMD_GETFAMILY` requests.
pub static CTRL_POLICY: Policy = Policy::new(&[
    AttrPolicy::UNSPEC,
    AttrPolicy::u16(),
    AttrPolicy::string(GENL_NAMSIZ),
]);
