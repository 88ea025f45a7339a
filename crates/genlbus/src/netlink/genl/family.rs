//! Producer-side family registration boundary.
//!
//! A [`Registrar`] is whatever owns the Generic Netlink controller: it
//! assigns family and multicast group ids, dispatches unicast commands to
//! the family's [`Operation`] table and fans multicast messages out to
//! member sockets.

use crate::netlink::attr::{ParsedAttrs, Policy};
use crate::netlink::error::Result;

/// Command handler. Errors are reported back to the sender as a negative
/// errno in the netlink acknowledgement.
pub type DoIt = fn(&CommandInfo<'_>) -> Result<()>;

/// One entry of a family's command table (mirrors `struct genl_ops`).
#[derive(Debug, Clone, Copy)]
pub struct Operation {
    /// Command code this entry handles.
    pub cmd: u8,
    /// Policy the request attributes are validated against.
    pub policy: Policy,
    /// Handler invoked for valid requests.
    pub doit: DoIt,
}

/// Everything a handler learns about one received command
/// (mirrors `struct genl_info`).
#[derive(Debug)]
pub struct CommandInfo<'a> {
    /// Port id of the sending socket.
    pub snd_portid: u32,
    /// Sequence number of the request.
    pub snd_seq: u32,
    /// Name of the family the command was addressed to.
    pub family: &'a str,
    /// Command code.
    pub cmd: u8,
    /// Request attributes, already validated against the op's policy.
    pub attrs: &'a ParsedAttrs<'a>,
}

/// Family definition handed to a [`Registrar`].
#[derive(Debug, Clone)]
pub struct FamilySpec<'a> {
    /// Family name.
    pub name: &'a str,
    /// Interface version.
    pub version: u8,
    /// Highest attribute tag.
    pub max_attr: u16,
    /// Multicast group names, in local-index order.
    pub groups: Vec<&'a str>,
    /// Command table.
    pub ops: &'a [Operation],
}

/// Ids assigned by the controller when a family is registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registered {
    /// Family id (the `nlmsg_type` of its messages).
    pub id: u16,
    /// Multicast group ids, same order as [`FamilySpec::groups`].
    pub group_ids: Vec<u32>,
}

/// Controller side of Generic Netlink.
pub trait Registrar: Send + Sync {
    /// Register a family, assigning it a family id and one group id per
    /// multicast group.
    fn register_family(&self, spec: &FamilySpec<'_>) -> Result<Registered>;

    /// Remove a family. Its groups stop being joinable and every socket
    /// membership in them is dropped.
    fn unregister_family(&self, id: u16) -> Result<()>;

    /// Deliver `msg` to every socket joined to `group_id`. Returns how many
    /// sockets received it; zero listeners is not an error.
    fn multicast(&self, group_id: u32, msg: &[u8]) -> Result<usize>;
}

impl<R: Registrar + ?Sized> Registrar for std::sync::Arc<R> {
    fn register_family(&self, spec: &FamilySpec<'_>) -> Result<Registered> {
        (**self).register_family(spec)
    }

    fn unregister_family(&self, id: u16) -> Result<()> {
        (**self).unregister_family(id)
    }

    fn multicast(&self, group_id: u32, msg: &[u8]) -> Result<usize> {
        (**self).multicast(group_id, msg)
    }
}
