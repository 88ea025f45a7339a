//! Client and scheduler configuration.
//!
//! A [`ClientConfig`] is built once from command-line input and never
//! changes afterwards. Mode validation happens here, before any socket is
//! opened.

use std::time::Duration;

use super::address::GlobalGroupId;
use super::protocol::MessageText;
use crate::netlink::{Error, Result};

/// Default period between two broadcast passes.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(5000);

/// Ordered set of subscribed groups.
///
/// Keeps the order the groups were given in; repeated ids collapse to
/// their first occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionSet {
    groups: Vec<GlobalGroupId>,
}

impl SubscriptionSet {
    /// Build a set from `groups`.
    pub fn new(groups: impl IntoIterator<Item = GlobalGroupId>) -> Self {
        let mut set = Self::default();
        for group in groups {
            if !set.groups.contains(&group) {
                set.groups.push(group);
            }
        }
        set
    }

    /// Build a set from raw numbers, rejecting out-of-range ones.
    pub fn from_ids(ids: impl IntoIterator<Item = usize>) -> Result<Self> {
        let groups = ids
            .into_iter()
            .map(GlobalGroupId::new)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(groups))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Groups in subscription order.
    pub fn iter(&self) -> impl Iterator<Item = GlobalGroupId> + '_ {
        self.groups.iter().copied()
    }

    pub fn contains(&self, group: GlobalGroupId) -> bool {
        self.groups.contains(&group)
    }
}

/// What a client process does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Join the groups and print every notification.
    Subscribe(SubscriptionSet),
    /// Send one command and exit.
    Send(MessageText),
}

/// Validated client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Selected mode.
    pub mode: Mode,
    /// Index of the family commands are sent to.
    pub target_family: usize,
}

impl ClientConfig {
    /// Validate raw client options.
    ///
    /// Returns `Ok(None)` when neither mode was requested.
    pub fn from_args(
        groups: Vec<GlobalGroupId>,
        send: bool,
        message: Option<String>,
    ) -> Result<Option<Self>> {
        let mode = match (groups.is_empty(), send) {
            (true, false) => return Ok(None),
            (false, true) => {
                return Err(Error::Usage(
                    "I can either receive or send messages.".into(),
                ));
            }
            (false, false) => Mode::Subscribe(SubscriptionSet::new(groups)),
            (true, true) => match message {
                Some(text) if !text.is_empty() => Mode::Send(MessageText::new(text)),
                _ => {
                    return Err(Error::Usage(
                        "What is the message you want to send?".into(),
                    ));
                }
            },
        };

        Ok(Some(Self {
            mode,
            target_family: 0,
        }))
    }
}

/// Broadcast scheduler settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Time between two broadcast passes.
    pub interval: Duration,
    /// Local group every family broadcasts to.
    pub local_group: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            local_group: 0,
        }
    }
}
