//! Generic Netlink connection with family resolution.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use super::header::GenlMsgHdr;
use super::{CtrlAttr, CtrlAttrMcastGrp, CtrlCmd, GENL_ID_CTRL};
use crate::netlink::attr::{AttrIter, get};
use crate::netlink::builder::MessageBuilder;
use crate::netlink::error::{Error, Result};
use crate::netlink::message::{MessageIter, NLM_F_ACK, NLM_F_REQUEST, NlMsgError};
use crate::netlink::socket::{NetlinkSocket, Transport};

/// Information about a Generic Netlink family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilyInfo {
    /// Family name as registered.
    pub name: String,
    /// Dynamically assigned family ID (used as nlmsg_type).
    pub id: u16,
    /// Family version.
    pub version: u8,
    /// Header size (additional bytes after genlmsghdr).
    pub hdr_size: u32,
    /// Maximum attribute number.
    pub max_attr: u32,
    /// Multicast groups: name -> group ID.
    pub mcast_groups: HashMap<String, u32>,
}

impl FamilyInfo {
    /// Look up a multicast group id by name.
    pub fn group_id(&self, group: &str) -> Result<u32> {
        self.mcast_groups
            .get(group)
            .copied()
            .ok_or_else(|| Error::GroupNotFound {
                family: self.name.clone(),
                group: group.to_string(),
            })
    }
}

/// Generic Netlink connection.
///
/// Provides family ID resolution and acknowledged GENL requests over any
/// [`Transport`]. Family information is cached for the lifetime of the
/// connection; nothing outlives it.
///
/// # Example
///
/// ```rust,no_run
/// use genlbus::netlink::genl::GenlConnection;
///
/// # async fn example() -> genlbus::Result<()> {
/// let conn = GenlConnection::new()?;
///
/// // Get family info (cached after first call)
/// let family = conn.get_family("genl_test1").await?;
/// let group = family.group_id("genl_mcgrp50")?;
/// println!("genl_test1 = {}, genl_mcgrp50 = {}", family.id, group);
/// # Ok(())
/// # }
/// ```
pub struct GenlConnection<T: Transport = NetlinkSocket> {
    socket: T,
    cache: RwLock<HashMap<String, FamilyInfo>>,
}

impl GenlConnection<NetlinkSocket> {
    /// Create a new Generic Netlink connection to the kernel.
    pub fn new() -> Result<Self> {
        Ok(Self::from_socket(NetlinkSocket::new()?))
    }
}

impl<T: Transport> GenlConnection<T> {
    /// Create a GENL connection from an existing socket.
    pub fn from_socket(socket: T) -> Self {
        Self {
            socket,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Get the underlying socket.
    pub fn socket(&self) -> &T {
        &self.socket
    }

    /// Join a multicast group on the underlying socket.
    pub fn add_membership(&mut self, group: u32) -> Result<()> {
        self.socket.add_membership(group)
    }

    /// Get information about a Generic Netlink family.
    ///
    /// The result is cached, so subsequent calls for the same family
    /// on this connection do not query the controller again.
    pub async fn get_family(&self, name: &str) -> Result<FamilyInfo> {
        let cached = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned();
        if let Some(info) = cached {
            return Ok(info);
        }

        let info = self.query_family(name).await?;

        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), info.clone());

        Ok(info)
    }

    /// Get the family ID for a given family name.
    pub async fn get_family_id(&self, name: &str) -> Result<u16> {
        Ok(self.get_family(name).await?.id)
    }

    /// Resolve a multicast group id by family and group name.
    pub async fn get_group_id(&self, family: &str, group: &str) -> Result<u32> {
        self.get_family(family).await?.group_id(group)
    }

    /// Query the controller for family information.
    async fn query_family(&self, name: &str) -> Result<FamilyInfo> {
        let mut builder = MessageBuilder::genl(
            GENL_ID_CTRL,
            NLM_F_REQUEST | NLM_F_ACK,
            CtrlCmd::GetFamily as u8,
            1,
        );
        builder.append_attr_str(CtrlAttr::FamilyName as u16, name);

        let replies = match self.transact(builder).await {
            Err(Error::Kernel { errno, .. }) if errno == libc::ENOENT => {
                return Err(Error::FamilyNotFound {
                    name: name.to_string(),
                });
            }
            other => other?,
        };

        let reply = replies.first().ok_or_else(|| Error::FamilyNotFound {
            name: name.to_string(),
        })?;
        let (_, attrs) = GenlMsgHdr::split(reply)?;
        parse_family_attrs(attrs)
    }

    /// Send a GENL command and wait for its acknowledgement.
    ///
    /// The request carries `NLM_F_ACK`; replies are matched on sequence
    /// number and a non-zero errno in the ack is returned as an error.
    pub async fn request(
        &self,
        family_id: u16,
        cmd: u8,
        version: u8,
        build_attrs: impl FnOnce(&mut MessageBuilder),
    ) -> Result<()> {
        let mut builder = MessageBuilder::genl(family_id, NLM_F_REQUEST | NLM_F_ACK, cmd, version);
        build_attrs(&mut builder);
        self.transact(builder).await?;
        Ok(())
    }

    /// Send an acknowledged request and collect every data reply that
    /// precedes the ack.
    ///
    /// Messages carrying another sequence number (late replies, multicast
    /// traffic) are skipped.
    async fn transact(&self, mut builder: MessageBuilder) -> Result<Vec<Vec<u8>>> {
        let seq = self.socket.next_seq();
        builder.set_seq(seq);
        builder.set_pid(self.socket.pid());

        let msg = builder.finish();
        self.socket.send(&msg).await?;

        let mut replies = Vec::new();
        loop {
            let data = self.socket.recv_msg().await?;

            for result in MessageIter::new(&data) {
                let (header, payload) = result?;

                if header.nlmsg_seq != seq {
                    continue;
                }

                if header.is_error() {
                    let err = NlMsgError::from_bytes(payload)?;
                    if err.is_ack() {
                        return Ok(replies);
                    }
                    return Err(Error::from_errno(err.error));
                }

                if header.is_done() {
                    return Ok(replies);
                }

                replies.push(payload.to_vec());
            }
        }
    }
}

/// Parse family attributes from a CTRL_CMD_NEWFAMILY reply.
fn parse_family_attrs(data: &[u8]) -> Result<FamilyInfo> {
    let mut id: Option<u16> = None;
    let mut name = String::new();
    let mut version: u8 = 0;
    let mut hdr_size: u32 = 0;
    let mut max_attr: u32 = 0;
    let mut mcast_groups = HashMap::new();

    for (attr_type, payload) in AttrIter::new(data) {
        match attr_type {
            t if t == CtrlAttr::FamilyId as u16 => {
                id = Some(get::u16_ne(payload)?);
            }
            t if t == CtrlAttr::FamilyName as u16 => {
                name = get::string(payload)?.to_string();
            }
            t if t == CtrlAttr::Version as u16 => {
                version = get::u32_ne(payload)? as u8;
            }
            t if t == CtrlAttr::HdrSize as u16 => {
                hdr_size = get::u32_ne(payload)?;
            }
            t if t == CtrlAttr::MaxAttr as u16 => {
                max_attr = get::u32_ne(payload)?;
            }
            t if t == CtrlAttr::McastGroups as u16 => {
                mcast_groups = parse_mcast_groups(payload)?;
            }
            _ => {}
        }
    }

    let id = id.ok_or_else(|| Error::InvalidMessage("missing family ID".into()))?;

    Ok(FamilyInfo {
        name,
        id,
        version,
        hdr_size,
        max_attr,
        mcast_groups,
    })
}

/// Parse multicast groups from CTRL_ATTR_MCAST_GROUPS.
fn parse_mcast_groups(data: &[u8]) -> Result<HashMap<String, u32>> {
    let mut groups = HashMap::new();

    // One nested entry per group, each holding a name and an id
    for (_group_idx, group_payload) in AttrIter::new(data) {
        let mut name: Option<String> = None;
        let mut grp_id: Option<u32> = None;

        for (attr_type, payload) in AttrIter::new(group_payload) {
            match attr_type {
                t if t == CtrlAttrMcastGrp::Name as u16 => {
                    name = Some(get::string(payload)?.to_string());
                }
                t if t == CtrlAttrMcastGrp::Id as u16 => {
                    grp_id = Some(get::u32_ne(payload)?);
                }
                _ => {}
            }
        }

        if let (Some(name), Some(id)) = (name, grp_id) {
            groups.insert(name, id);
        }
    }

    Ok(groups)
}
