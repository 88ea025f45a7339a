//! Periodic greetings from every family to one of its groups.

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

use super::address::{GroupAddress, group_name};
use super::config::SchedulerConfig;
use super::protocol::{MessageText, build_message};
use super::registry::{FamilyView, RegistryView};
use crate::netlink::genl::Registrar;
use crate::netlink::{Error, Result};

/// Text broadcast by family `family_index` to `local_group`.
pub fn greeting(family_index: usize, local_group: usize) -> MessageText {
    MessageText::new(format!(
        "Hello from family {family_index}, group {}\n",
        group_name(local_group)
    ))
}

/// Outcome of one family's broadcast in a pass.
#[derive(Debug)]
pub struct BroadcastReport {
    /// Index of the family.
    pub family: usize,
    /// Number of sockets reached, or why nothing was sent.
    pub outcome: Result<usize>,
}

impl BroadcastReport {
    /// Whether the family was skipped for being outside the address space.
    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, Err(Error::OutOfRange { .. }))
    }
}

/// Multicast the greeting of `family` to its group `local_group`.
pub fn greet_group<R: Registrar + ?Sized>(
    registrar: &R,
    family: &FamilyView,
    local_group: usize,
) -> Result<usize> {
    GroupAddress::new(family.index, local_group)?;
    let group_id = *family
        .group_ids
        .get(local_group)
        .ok_or(Error::OutOfRange {
            what: "local group",
            value: local_group,
            max: family.group_ids.len().saturating_sub(1),
        })?;

    let frame = build_message(family.id, 0, Some(&greeting(family.index, local_group)));
    registrar.multicast(group_id, &frame)
}

/// One broadcast pass over every family in `view`.
///
/// Failures are logged and reported per family; they never stop the pass.
pub fn broadcast_once<R: Registrar + ?Sized>(
    registrar: &R,
    view: &RegistryView,
    config: &SchedulerConfig,
) -> Vec<BroadcastReport> {
    view.families()
        .iter()
        .map(|family| {
            let outcome = greet_group(registrar, family, config.local_group);
            match &outcome {
                Ok(0) => trace!(family = %family.name, "no subscribers"),
                Ok(delivered) => debug!(family = %family.name, delivered, "broadcast sent"),
                Err(err @ Error::OutOfRange { .. }) => {
                    warn!(family = %family.name, error = %err, "skipping family")
                }
                Err(err) => warn!(family = %family.name, error = %err, "broadcast failed"),
            }
            BroadcastReport {
                family: family.index,
                outcome,
            }
        })
        .collect()
}

/// Spawn the broadcast task.
///
/// The first pass runs one interval after the call; passes that fall
/// behind are skipped rather than bunched up. The task runs until its
/// handle is aborted.
pub fn spawn<R>(registrar: R, view: RegistryView, config: SchedulerConfig) -> JoinHandle<()>
where
    R: Registrar + 'static,
{
    tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + config.interval, config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            broadcast_once(&registrar, &view, &config);
        }
    })
}
