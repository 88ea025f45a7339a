//! Wire shape shared by every bus family.
//!
//! One command (`MSG`) carrying one attribute (`MSG`, a NUL-terminated
//! string of at most [`MSG_MAX_LEN`] bytes including the terminator). The
//! same shape is used for unicast commands and multicast notifications.

use std::fmt;

use crate::netlink::genl::GenlMsgHdr;
use crate::netlink::{AttrPolicy, MessageBuilder, Policy, Result};

/// Interface version of every bus family.
pub const BUS_VERSION: u8 = 1;

/// Size limit of the `MSG` attribute, terminator included.
pub const MSG_MAX_LEN: usize = 256;

/// Bus command codes.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusCmd {
    Unspec = 0,
    Msg = 1,
}

/// Bus attribute tags.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusAttr {
    Unspec = 0,
    Msg = 1,
}

/// Attribute policy applied to commands and notifications alike.
pub const BUS_POLICY: Policy =
    Policy::new(&[AttrPolicy::UNSPEC, AttrPolicy::string(MSG_MAX_LEN)]);

/// Text carried in a `MSG` attribute.
///
/// Longer input is cut to `MSG_MAX_LEN - 1` bytes, backing off to a char
/// boundary, so the encoded attribute always fits the policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageText(String);

impl MessageText {
    /// Wrap `text`, truncating it if needed.
    pub fn new(text: impl Into<String>) -> Self {
        let mut text = text.into();
        let limit = MSG_MAX_LEN - 1;
        if text.len() > limit {
            let mut end = limit;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            text.truncate(end);
        }
        Self(text)
    }

    /// The text, without terminator.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the text is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for MessageText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Append the `MSG` attribute to a message under construction.
pub fn append_text(builder: &mut MessageBuilder, text: &MessageText) {
    builder.append_attr_str(BusAttr::Msg as u16, text.as_str());
}

/// Build a complete `MSG` frame for `family_id`.
///
/// `text` may be omitted to produce a frame without the attribute.
pub fn build_message(family_id: u16, flags: u16, text: Option<&MessageText>) -> Vec<u8> {
    let mut builder = MessageBuilder::genl(family_id, flags, BusCmd::Msg as u8, BUS_VERSION);
    if let Some(text) = text {
        append_text(&mut builder, text);
    }
    builder.finish()
}

/// Decode the payload (everything after `nlmsghdr`) of a bus message.
///
/// Returns `Ok(None)` when the message has no `MSG` attribute and an error
/// when the attributes violate [`BUS_POLICY`].
pub fn parse_message(payload: &[u8]) -> Result<Option<String>> {
    let (_, attrs) = GenlMsgHdr::split(payload)?;
    let parsed = BUS_POLICY.parse(attrs)?;
    Ok(parsed.string(BusAttr::Msg as u16)?.map(str::to_string))
}
