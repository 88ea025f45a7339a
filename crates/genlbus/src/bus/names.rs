//! Allocation of family and group names.
//!
//! Names are owned values: dropping a [`Name`] releases it. Allocators can
//! attach a lease to each name to observe releases.

use std::any::Any;
use std::fmt;

use crate::netlink::Result;

/// An allocated name.
pub struct Name {
    text: String,
    _lease: Option<Box<dyn Any + Send + Sync>>,
}

impl Name {
    /// A name with nothing attached.
    pub fn new(text: String) -> Self {
        Self { text, _lease: None }
    }

    /// A name that keeps `lease` alive until it is released.
    pub fn with_lease(text: String, lease: impl Any + Send + Sync) -> Self {
        Self {
            text,
            _lease: Some(Box::new(lease)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Name").field(&self.text).finish()
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Source of family and group names.
pub trait NameAllocator: Send + Sync {
    /// Allocate storage for `text`. Fails with
    /// [`Error::ResourceExhausted`](crate::netlink::Error::ResourceExhausted)
    /// when no more names can be handed out.
    fn allocate(&self, text: String) -> Result<Name>;
}

/// Default allocator backed by the heap. Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeapNames;

impl NameAllocator for HeapNames {
    fn allocate(&self, text: String) -> Result<Name> {
        Ok(Name::new(text))
    }
}

impl<A: NameAllocator + ?Sized> NameAllocator for std::sync::Arc<A> {
    fn allocate(&self, text: String) -> Result<Name> {
        (**self).allocate(text)
    }
}
