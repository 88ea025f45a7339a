//! Netlink attribute (nlattr) handling and attribute policies.

use super::error::{Error, Result};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Netlink attribute alignment.
pub const NLA_ALIGNTO: usize = 4;

/// Align a length to NLA_ALIGNTO boundary.
#[inline]
pub const fn nla_align(len: usize) -> usize {
    (len + NLA_ALIGNTO - 1) & !(NLA_ALIGNTO - 1)
}

/// Size of the attribute header.
pub const NLA_HDRLEN: usize = 4;

/// Netlink attribute header (mirrors struct nlattr).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NlAttr {
    /// Length including header.
    pub nla_len: u16,
    /// Attribute type.
    pub nla_type: u16,
}

/// Attribute type flags.
pub const NLA_F_NESTED: u16 = 1 << 15;
pub const NLA_F_NET_BYTEORDER: u16 = 1 << 14;
pub const NLA_TYPE_MASK: u16 = !(NLA_F_NESTED | NLA_F_NET_BYTEORDER);

impl NlAttr {
    /// Create a new attribute header.
    pub fn new(attr_type: u16, data_len: usize) -> Self {
        Self {
            nla_len: (NLA_HDRLEN + data_len) as u16,
            nla_type: attr_type,
        }
    }

    /// Get the attribute type without flags.
    pub fn kind(&self) -> u16 {
        self.nla_type & NLA_TYPE_MASK
    }

    /// Convert to bytes.
    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }

    /// Parse from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        Self::ref_from_prefix(data)
            .map(|(r, _)| r)
            .map_err(|_| Error::Truncated {
                expected: std::mem::size_of::<Self>(),
                actual: data.len(),
            })
    }
}

/// Iterator over netlink attributes in a buffer.
///
/// Stops silently at the first malformed header, like the kernel's
/// `nla_for_each_attr`.
pub struct AttrIter<'a> {
    data: &'a [u8],
}

impl<'a> AttrIter<'a> {
    /// Create a new attribute iterator.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl<'a> Iterator for AttrIter<'a> {
    /// Returns (attribute type, payload data).
    type Item = (u16, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let attr = NlAttr::from_bytes(self.data).ok()?;

        let len = attr.nla_len as usize;
        if len < NLA_HDRLEN || len > self.data.len() {
            return None;
        }

        let payload = &self.data[NLA_HDRLEN..len];
        let aligned_len = nla_align(len);
        self.data = self.data.get(aligned_len..).unwrap_or(&[]);

        Some((attr.kind(), payload))
    }
}

/// Data type an attribute is declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    /// No validation.
    Unspec,
    /// 16-bit unsigned integer, native endian.
    U16,
    /// 32-bit unsigned integer, native endian.
    U32,
    /// NUL-terminated string.
    String,
}

/// Validation rule for one attribute tag (mirrors `struct nla_policy`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttrPolicy {
    /// Declared type.
    pub kind: AttrKind,
    /// Maximum payload length in bytes, terminator included; 0 means unbounded.
    pub max_len: usize,
}

impl AttrPolicy {
    /// Placeholder for reserved tag 0 and unvalidated tags.
    pub const UNSPEC: Self = Self {
        kind: AttrKind::Unspec,
        max_len: 0,
    };

    /// A string attribute bounded to `max_len` bytes including its terminator.
    pub const fn string(max_len: usize) -> Self {
        Self {
            kind: AttrKind::String,
            max_len,
        }
    }

    /// A u16 attribute.
    pub const fn u16() -> Self {
        Self {
            kind: AttrKind::U16,
            max_len: 0,
        }
    }

    /// A u32 attribute.
    pub const fn u32() -> Self {
        Self {
            kind: AttrKind::U32,
            max_len: 0,
        }
    }

    fn validate(&self, tag: u16, payload: &[u8]) -> Result<()> {
        let min = match self.kind {
            AttrKind::Unspec | AttrKind::String => 0,
            AttrKind::U16 => 2,
            AttrKind::U32 => 4,
        };
        if payload.len() < min {
            return Err(Error::InvalidAttribute(format!(
                "attribute {tag}: {} bytes, need {min}",
                payload.len()
            )));
        }
        if self.max_len != 0 && payload.len() > self.max_len {
            return Err(Error::InvalidAttribute(format!(
                "attribute {tag}: {} bytes exceeds limit of {}",
                payload.len(),
                self.max_len
            )));
        }
        Ok(())
    }
}

/// Attribute policy table indexed by tag. The highest tag in the table is
/// the family's max-attribute bound.
#[derive(Debug, Clone, Copy)]
pub struct Policy {
    entries: &'static [AttrPolicy],
}

impl Policy {
    /// Build a policy from a table whose index is the attribute tag.
    pub const fn new(entries: &'static [AttrPolicy]) -> Self {
        Self { entries }
    }

    /// Highest attribute tag covered by this policy.
    pub fn max_attr(&self) -> u16 {
        self.entries.len().saturating_sub(1) as u16
    }

    /// Parse and validate the attributes in `data`.
    ///
    /// Tags above [`max_attr`](Self::max_attr) are ignored. A later
    /// occurrence of a tag replaces an earlier one.
    pub fn parse<'a>(&self, data: &'a [u8]) -> Result<ParsedAttrs<'a>> {
        let mut slots = vec![None; self.entries.len()];
        for (tag, payload) in AttrIter::new(data) {
            let Some(rule) = self.entries.get(tag as usize) else {
                continue;
            };
            rule.validate(tag, payload)?;
            slots[tag as usize] = Some(payload);
        }
        Ok(ParsedAttrs { slots })
    }
}

/// Attributes of one message, parsed against a [`Policy`].
#[derive(Debug, Clone, Default)]
pub struct ParsedAttrs<'a> {
    slots: Vec<Option<&'a [u8]>>,
}

impl<'a> ParsedAttrs<'a> {
    /// Raw payload of `tag`, if present.
    pub fn get(&self, tag: u16) -> Option<&'a [u8]> {
        self.slots.get(tag as usize).copied().flatten()
    }

    /// Payload of `tag` read as a string.
    pub fn string(&self, tag: u16) -> Result<Option<&'a str>> {
        self.get(tag).map(get::string).transpose()
    }

    /// Check whether `tag` was present.
    pub fn has(&self, tag: u16) -> bool {
        self.get(tag).is_some()
    }
}

/// Helper functions for extracting typed values from attribute payloads.
pub mod get {
    use super::*;

    /// Extract a u16 value (native endian).
    pub fn u16_ne(data: &[u8]) -> Result<u16> {
        match data {
            [a, b, ..] => Ok(u16::from_ne_bytes([*a, *b])),
            _ => Err(Error::InvalidAttribute("truncated u16 attribute".into())),
        }
    }

    /// Extract a u32 value (native endian).
    pub fn u32_ne(data: &[u8]) -> Result<u32> {
        match data {
            [a, b, c, d, ..] => Ok(u32::from_ne_bytes([*a, *b, *c, *d])),
            _ => Err(Error::InvalidAttribute("truncated u32 attribute".into())),
        }
    }

    /// Extract a null-terminated string.
    pub fn string(data: &[u8]) -> Result<&str> {
        // Find null terminator or use whole buffer
        let len = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        std::str::from_utf8(&data[..len])
            .map_err(|e| Error::InvalidAttribute(format!("invalid UTF-8: {}", e)))
    }
}
