//! Consumer receive loop.
//!
//! A [`Subscriber`] owns a connection joined to a set of groups and decodes
//! every inbound datagram into [`Notification`]s. There is no sequence
//! check: notifications are unsolicited. Netlink error frames with a
//! non-zero errno end the loop; acks and other control frames are ignored;
//! a message whose attributes violate the policy is logged and reported
//! without text.

use std::collections::VecDeque;
use std::fmt;
use std::ops::ControlFlow;

use tracing::{debug, warn};

use super::protocol::parse_message;
use super::resolve::ResolvedGroup;
use crate::netlink::genl::GenlConnection;
use crate::netlink::message::NlMsgError;
use crate::netlink::{Error, MessageIter, NetlinkSocket, Result, Transport};

/// One decoded bus message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Family the message was sent by.
    pub family_id: u16,
    /// Sender port id; 0 for the kernel.
    pub sender: u32,
    /// The `MSG` text, `None` when the attribute was absent or invalid.
    pub text: Option<String>,
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.text {
            Some(text) => write!(f, "Kernel says: {}", text.trim_end_matches('\n')),
            None => f.write_str("Kernel sent empty message!!"),
        }
    }
}

/// A connection joined to its resolved groups.
pub struct Subscriber<T: Transport = NetlinkSocket> {
    conn: GenlConnection<T>,
    groups: Vec<ResolvedGroup>,
    queued: VecDeque<Notification>,
}

impl<T: Transport> Subscriber<T> {
    pub(crate) fn new(conn: GenlConnection<T>, groups: Vec<ResolvedGroup>) -> Self {
        Self {
            conn,
            groups,
            queued: VecDeque::new(),
        }
    }

    /// Joined groups, in join order.
    pub fn groups(&self) -> &[ResolvedGroup] {
        &self.groups
    }

    pub fn connection(&self) -> &GenlConnection<T> {
        &self.conn
    }

    /// Wait for the next notification.
    pub async fn next(&mut self) -> Result<Notification> {
        loop {
            if let Some(notification) = self.queued.pop_front() {
                return Ok(notification);
            }
            let data = self.conn.socket().recv_msg().await?;
            self.decode(&data)?;
        }
    }

    /// Feed every notification to `sink` until it breaks or the transport
    /// fails.
    pub async fn run<F>(&mut self, mut sink: F) -> Result<()>
    where
        F: FnMut(&Notification) -> ControlFlow<()>,
    {
        loop {
            let notification = self.next().await?;
            if sink(&notification).is_break() {
                debug!("receive loop stopped by sink");
                return Ok(());
            }
        }
    }

    fn decode(&mut self, data: &[u8]) -> Result<()> {
        for result in MessageIter::new(data) {
            let (header, payload) = match result {
                Ok(msg) => msg,
                Err(err) => {
                    warn!(error = %err, "dropping malformed datagram");
                    break;
                }
            };

            if header.is_error() {
                let err = NlMsgError::from_bytes(payload)?;
                if err.is_ack() {
                    continue;
                }
                return Err(Error::from_errno(err.error));
            }
            if header.is_control() {
                continue;
            }

            // An attribute that fails validation is treated as absent
            let text = parse_message(payload).unwrap_or_else(|err| {
                warn!(family_id = header.nlmsg_type, error = %err, "invalid notification");
                None
            });
            self.queued.push_back(Notification {
                family_id: header.nlmsg_type,
                sender: header.nlmsg_pid,
                text,
            });
        }
        Ok(())
    }
}
