//! Producer-side family registry.
//!
//! Registers the [`FAMILY_COUNT`] bus families, each with
//! [`GROUPS_PER_FAMILY`] multicast groups, through a [`Registrar`]. Startup
//! is all or nothing: a failure at any family unregisters every family
//! registered before it and releases every name. Teardown runs on drop.
//!
//! # Example
//!
//! ```rust,no_run
//! use genlbus::bus::{FamilyRegistry, SchedulerConfig};
//! use genlbus::netlink::loopback::LoopbackBus;
//!
//! # async fn example() -> genlbus::Result<()> {
//! let bus = LoopbackBus::new();
//! let mut registry = FamilyRegistry::new(bus.clone());
//! registry.register_all()?;
//! registry.start_broadcast(SchedulerConfig::default());
//! // ...
//! registry.teardown_all();
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::address::{FAMILY_COUNT, GROUPS_PER_FAMILY, GroupAddress, family_name, group_name};
use super::broadcast;
use super::command::handle_command;
use super::config::SchedulerConfig;
use super::names::{HeapNames, Name, NameAllocator};
use super::protocol::{BUS_POLICY, BUS_VERSION, BusCmd};
use crate::netlink::genl::{FamilySpec, Operation, Registrar};
use crate::netlink::{Error, Result};

/// Command table shared by every bus family.
pub static BUS_OPS: [Operation; 1] = [Operation {
    cmd: BusCmd::Msg as u8,
    policy: BUS_POLICY,
    doit: handle_command,
}];

/// A multicast group owned by a registered family.
#[derive(Debug)]
pub struct GroupDescriptor {
    name: Name,
    id: u32,
}

impl GroupDescriptor {
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Group id assigned at registration.
    pub fn id(&self) -> u32 {
        self.id
    }
}

/// A registered bus family.
#[derive(Debug)]
pub struct FamilyDescriptor {
    index: usize,
    name: Name,
    id: u16,
    version: u8,
    max_attr: u16,
    ops: &'static [Operation],
    groups: Vec<GroupDescriptor>,
}

impl FamilyDescriptor {
    /// Position of the family in `0..FAMILY_COUNT`.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Family id assigned at registration.
    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    /// Highest attribute tag accepted by the family's commands.
    pub fn max_attr(&self) -> u16 {
        self.max_attr
    }

    /// Command table.
    pub fn ops(&self) -> &'static [Operation] {
        self.ops
    }

    /// Groups in local-index order.
    pub fn groups(&self) -> &[GroupDescriptor] {
        &self.groups
    }
}

/// Read-only snapshot of one registered family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilyView {
    pub index: usize,
    pub name: String,
    pub id: u16,
    /// Group ids in local-index order.
    pub group_ids: Vec<u32>,
}

/// Cheaply clonable snapshot of the registry.
#[derive(Debug, Clone, Default)]
pub struct RegistryView {
    families: Arc<[FamilyView]>,
}

impl RegistryView {
    pub fn families(&self) -> &[FamilyView] {
        &self.families
    }

    pub fn len(&self) -> usize {
        self.families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }
}

/// Owner of the bus families on the producer side.
pub struct FamilyRegistry<R: Registrar, A: NameAllocator = HeapNames> {
    registrar: R,
    names: A,
    families: Vec<FamilyDescriptor>,
    scheduler: Option<JoinHandle<()>>,
}

impl<R: Registrar> FamilyRegistry<R> {
    /// Create an empty registry using heap-allocated names.
    pub fn new(registrar: R) -> Self {
        Self::with_allocator(registrar, HeapNames)
    }
}

impl<R: Registrar, A: NameAllocator> FamilyRegistry<R, A> {
    /// Create an empty registry drawing names from `names`.
    pub fn with_allocator(registrar: R, names: A) -> Self {
        Self {
            registrar,
            names,
            families: Vec::new(),
            scheduler: None,
        }
    }

    /// Registered families in index order.
    pub fn families(&self) -> &[FamilyDescriptor] {
        &self.families
    }

    /// Whether a broadcast task is attached.
    pub fn is_broadcasting(&self) -> bool {
        self.scheduler.is_some()
    }

    /// Allocate the group names of family `family_index`.
    ///
    /// On failure every name already allocated for this family is released
    /// before the error is returned.
    pub fn initialize_groups(&self, family_index: usize) -> Result<Vec<Name>> {
        GroupAddress::new(family_index, 0)?;

        let mut names = Vec::with_capacity(GROUPS_PER_FAMILY);
        for local in 0..GROUPS_PER_FAMILY {
            match self.names.allocate(group_name(local)) {
                Ok(name) => names.push(name),
                Err(err) => {
                    warn!(
                        family = family_index,
                        allocated = names.len(),
                        error = %err,
                        "group name allocation failed"
                    );
                    return Err(err);
                }
            }
        }
        Ok(names)
    }

    /// Register every bus family in index order.
    ///
    /// On failure at family *k*, families `0..k` are unregistered in reverse
    /// order and [`Error::Startup`] is returned. Calling this on a registry
    /// that already holds families does nothing.
    pub fn register_all(&mut self) -> Result<()> {
        if !self.families.is_empty() {
            debug!("families already registered");
            return Ok(());
        }

        for index in 0..FAMILY_COUNT {
            match self.register_family(index) {
                Ok(family) => {
                    info!(
                        family = family.name(),
                        id = family.id,
                        groups = family.groups.len(),
                        "registered family"
                    );
                    self.families.push(family);
                }
                Err(source) => {
                    let rolled_back = self.families.len();
                    self.unregister_registered();
                    return Err(Error::Startup {
                        family: family_name(index),
                        rolled_back,
                        source: Box::new(source),
                    });
                }
            }
        }
        Ok(())
    }

    fn register_family(&self, index: usize) -> Result<FamilyDescriptor> {
        let name = self.names.allocate(family_name(index))?;
        let group_names = self.initialize_groups(index)?;

        let (version, max_attr, ops) = (BUS_VERSION, BUS_POLICY.max_attr(), &BUS_OPS[..]);
        let registered = self.registrar.register_family(&FamilySpec {
            name: name.as_str(),
            version,
            max_attr,
            groups: group_names.iter().map(Name::as_str).collect(),
            ops,
        })?;

        if registered.group_ids.len() != group_names.len() {
            if let Err(err) = self.registrar.unregister_family(registered.id) {
                warn!(family = %name, error = %err, "failed to unregister family");
            }
            return Err(Error::InvalidMessage(format!(
                "{} group ids assigned to {name}, expected {}",
                registered.group_ids.len(),
                group_names.len()
            )));
        }

        let groups = group_names
            .into_iter()
            .zip(registered.group_ids)
            .map(|(name, id)| GroupDescriptor { name, id })
            .collect();

        Ok(FamilyDescriptor {
            index,
            name,
            id: registered.id,
            version,
            max_attr,
            ops,
            groups,
        })
    }

    /// Unregister registered families, newest first, dropping their names.
    fn unregister_registered(&mut self) -> usize {
        let count = self.families.len();
        while let Some(family) = self.families.pop() {
            match self.registrar.unregister_family(family.id) {
                Ok(()) => debug!(family = family.name(), "unregistered family"),
                Err(err) => {
                    warn!(family = family.name(), error = %err, "failed to unregister family")
                }
            }
        }
        count
    }

    /// Stop broadcasting, unregister every family and release all names.
    ///
    /// Safe to call any number of times, including after a failed
    /// [`register_all`](Self::register_all).
    pub fn teardown_all(&mut self) {
        if let Some(task) = self.scheduler.take() {
            task.abort();
            debug!("broadcast task stopped");
        }
        let count = self.unregister_registered();
        if count > 0 {
            info!(families = count, "bus families removed");
        }
    }

    /// Snapshot of the registered families.
    pub fn view(&self) -> RegistryView {
        let families: Vec<FamilyView> = self
            .families
            .iter()
            .map(|f| FamilyView {
                index: f.index,
                name: f.name().to_string(),
                id: f.id,
                group_ids: f.groups.iter().map(GroupDescriptor::id).collect(),
            })
            .collect();
        RegistryView {
            families: families.into(),
        }
    }
}

impl<R: Registrar + Clone + 'static, A: NameAllocator> FamilyRegistry<R, A> {
    /// Start the periodic broadcast over the current families.
    ///
    /// Must be called from within a tokio runtime. A running broadcast task
    /// is replaced.
    pub fn start_broadcast(&mut self, config: SchedulerConfig) {
        let task = broadcast::spawn(self.registrar.clone(), self.view(), config);
        if let Some(previous) = self.scheduler.replace(task) {
            previous.abort();
        }
    }
}

impl<R: Registrar, A: NameAllocator> Drop for FamilyRegistry<R, A> {
    fn drop(&mut self) {
        self.teardown_all();
    }
}
