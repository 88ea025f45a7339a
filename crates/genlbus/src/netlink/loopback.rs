//! In-process Generic Netlink controller.
//!
//! [`LoopbackBus`] plays the kernel's part for a set of [`LoopbackSocket`]s:
//! it registers families through the [`Registrar`] trait, answers
//! `CTRL_CMD_GETFAMILY` lookups, tracks socket group membership, dispatches
//! unicast commands to family handlers and fans multicast messages out. All
//! traffic is exchanged as real netlink frames, so the same
//! [`GenlConnection`](super::genl::GenlConnection) code runs against it and
//! against the kernel.
//!
//! # Example
//!
//! ```rust,no_run
//! use genlbus::netlink::genl::GenlConnection;
//! use genlbus::netlink::loopback::LoopbackBus;
//!
//! # async fn example() -> genlbus::Result<()> {
//! let bus = LoopbackBus::new();
//! let conn = GenlConnection::from_socket(bus.socket());
//! assert!(conn.get_family("genl_test0").await.is_err());
//! # Ok(())
//! # }
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::attr::{ParsedAttrs, get};
use super::builder::MessageBuilder;
use super::error::{Error, Result};
use super::genl::{
    CTRL_POLICY, CommandInfo, CtrlAttr, CtrlAttrMcastGrp, CtrlCmd, FamilySpec, GENL_ID_CTRL,
    GENL_NAMSIZ, GenlMsgHdr, Operation, Registered, Registrar,
};
use super::message::{MessageIter, NLM_F_REQUEST, NlMsgError, NlMsgHdr, NlMsgType};
use super::socket::Transport;

/// First dynamically assigned family id; lower ids are reserved.
const FIRST_FAMILY_ID: u16 = GENL_ID_CTRL + 3;

/// First dynamically assigned group id; group 1 belongs to the controller.
const FIRST_GROUP_ID: u32 = 2;

/// Port ids handed to loopback sockets start here.
const FIRST_PID: u32 = 1000;

/// One unicast command seen by the controller, with the errno its handler
/// produced (0 on success).
#[derive(Debug, Clone)]
pub struct MonitorEvent {
    /// Port id of the sender.
    pub pid: u32,
    /// Family the command was addressed to.
    pub family: String,
    /// The complete request frame.
    pub frame: Vec<u8>,
    /// Negative errno returned by the handler, or 0.
    pub error: i32,
}

struct FamilyEntry {
    id: u16,
    name: String,
    version: u8,
    max_attr: u16,
    groups: Vec<(String, u32)>,
    ops: Vec<Operation>,
}

struct SocketEntry {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    groups: HashSet<u32>,
}

struct Controller {
    next_family_id: u16,
    next_group_id: u32,
    next_pid: u32,
    families: Vec<FamilyEntry>,
    sockets: HashMap<u32, SocketEntry>,
    monitors: Vec<mpsc::UnboundedSender<MonitorEvent>>,
}

impl Default for Controller {
    fn default() -> Self {
        Self {
            next_family_id: FIRST_FAMILY_ID,
            next_group_id: FIRST_GROUP_ID,
            next_pid: FIRST_PID,
            families: Vec::new(),
            sockets: HashMap::new(),
            monitors: Vec::new(),
        }
    }
}

impl Controller {
    fn family_by_id(&self, id: u16) -> Option<&FamilyEntry> {
        self.families.iter().find(|f| f.id == id)
    }

    fn family_by_name(&self, name: &str) -> Option<&FamilyEntry> {
        self.families.iter().find(|f| f.name == name)
    }

    fn group_exists(&self, group: u32) -> bool {
        self.families
            .iter()
            .any(|f| f.groups.iter().any(|(_, id)| *id == group))
    }

    fn reply(&self, pid: u32, frame: Vec<u8>) {
        if let Some(socket) = self.sockets.get(&pid) {
            // A receiver that is already gone just loses the reply.
            let _ = socket.tx.send(frame);
        }
    }
}

/// In-process Generic Netlink controller shared by producer and consumers.
#[derive(Clone, Default)]
pub struct LoopbackBus {
    inner: Arc<Mutex<Controller>>,
}

impl LoopbackBus {
    /// Create an empty controller with no registered families.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Controller> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a socket bound to a fresh port id.
    pub fn socket(&self) -> LoopbackSocket {
        let (tx, rx) = mpsc::unbounded_channel();
        let pid = {
            let mut ctrl = self.lock();
            let pid = ctrl.next_pid;
            ctrl.next_pid += 1;
            ctrl.sockets.insert(
                pid,
                SocketEntry {
                    tx,
                    groups: HashSet::new(),
                },
            );
            pid
        };
        trace!(pid, "loopback socket opened");

        LoopbackSocket {
            bus: self.clone(),
            pid,
            seq: AtomicU32::new(1),
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    /// Names of the currently registered families, in registration order.
    pub fn families(&self) -> Vec<String> {
        self.lock().families.iter().map(|f| f.name.clone()).collect()
    }

    /// Subscribe to every unicast command the controller dispatches.
    pub fn monitor(&self) -> mpsc::UnboundedReceiver<MonitorEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().monitors.push(tx);
        rx
    }

    fn join(&self, pid: u32, group: u32) -> Result<()> {
        let mut ctrl = self.lock();
        if !ctrl.group_exists(group) {
            return Err(Error::from_errno(-libc::EINVAL));
        }
        let socket = ctrl
            .sockets
            .get_mut(&pid)
            .ok_or_else(|| Error::from_errno(-libc::EBADF))?;
        socket.groups.insert(group);
        debug!(pid, group, "joined multicast group");
        Ok(())
    }

    fn close(&self, pid: u32) {
        self.lock().sockets.remove(&pid);
        trace!(pid, "loopback socket closed");
    }

    /// Handle every message in a datagram sent by `pid`.
    fn deliver(&self, pid: u32, data: &[u8]) -> Result<()> {
        for result in MessageIter::new(data) {
            let (header, payload) = result?;

            let outcome = if header.nlmsg_flags & NLM_F_REQUEST == 0 || header.is_control() {
                Ok(())
            } else if header.nlmsg_type == GENL_ID_CTRL {
                self.ctrl_request(pid, header, payload)
            } else {
                self.family_request(pid, header, payload)
            };

            let error = match outcome {
                Ok(()) => 0,
                Err(err) => err.to_nl_errno(),
            };
            if error != 0 || header.wants_ack() {
                self.ack(pid, header, error);
            }
        }
        Ok(())
    }

    fn ack(&self, pid: u32, request: &NlMsgHdr, error: i32) {
        let mut builder = MessageBuilder::new(NlMsgType::ERROR, 0);
        builder.set_seq(request.nlmsg_seq);
        builder.set_pid(pid);
        builder.append(&NlMsgError::new(error, *request));
        self.lock().reply(pid, builder.finish());
    }

    fn ctrl_request(&self, pid: u32, header: &NlMsgHdr, payload: &[u8]) -> Result<()> {
        let (genl, attrs) = GenlMsgHdr::split(payload)?;
        if genl.cmd != CtrlCmd::GetFamily as u8 {
            return Err(Error::from_errno(-libc::EOPNOTSUPP));
        }
        let attrs = CTRL_POLICY.parse(attrs)?;

        let ctrl = self.lock();
        let family = if let Some(name) = attrs.string(CtrlAttr::FamilyName as u16)? {
            ctrl.family_by_name(name)
        } else if let Some(id) = attrs.get(CtrlAttr::FamilyId as u16) {
            ctrl.family_by_id(get::u16_ne(id)?)
        } else {
            return Err(Error::from_errno(-libc::EINVAL));
        };
        let family = family.ok_or_else(|| Error::from_errno(-libc::ENOENT))?;

        let mut reply = MessageBuilder::genl(GENL_ID_CTRL, 0, CtrlCmd::NewFamily as u8, 2);
        reply.set_seq(header.nlmsg_seq);
        reply.set_pid(pid);
        reply.append_attr_u16(CtrlAttr::FamilyId as u16, family.id);
        reply.append_attr_str(CtrlAttr::FamilyName as u16, &family.name);
        reply.append_attr_u32(CtrlAttr::Version as u16, family.version.into());
        reply.append_attr_u32(CtrlAttr::HdrSize as u16, 0);
        reply.append_attr_u32(CtrlAttr::MaxAttr as u16, family.max_attr.into());
        if !family.groups.is_empty() {
            let groups = reply.nest_start(CtrlAttr::McastGroups as u16);
            for (idx, (name, id)) in family.groups.iter().enumerate() {
                let entry = reply.nest_start(idx as u16 + 1);
                reply.append_attr_str(CtrlAttrMcastGrp::Name as u16, name);
                reply.append_attr_u32(CtrlAttrMcastGrp::Id as u16, *id);
                reply.nest_end(entry);
            }
            reply.nest_end(groups);
        }

        ctrl.reply(pid, reply.finish());
        Ok(())
    }

    fn family_request(&self, pid: u32, header: &NlMsgHdr, payload: &[u8]) -> Result<()> {
        let (genl, attrs) = GenlMsgHdr::split(payload)?;

        // Handlers run without the controller lock held.
        let (family, op) = {
            let ctrl = self.lock();
            let family = ctrl
                .family_by_id(header.nlmsg_type)
                .ok_or_else(|| Error::from_errno(-libc::ENOENT))?;
            let op = family.ops.iter().find(|op| op.cmd == genl.cmd).copied();
            (family.name.clone(), op)
        };

        let result = match op {
            Some(op) => op.policy.parse(attrs).and_then(|parsed: ParsedAttrs<'_>| {
                (op.doit)(&CommandInfo {
                    snd_portid: pid,
                    snd_seq: header.nlmsg_seq,
                    family: &family,
                    cmd: genl.cmd,
                    attrs: &parsed,
                })
            }),
            None => Err(Error::from_errno(-libc::EOPNOTSUPP)),
        };

        let error = result.as_ref().map_or_else(Error::to_nl_errno, |_| 0);
        let mut frame = header.as_bytes().to_vec();
        frame.extend_from_slice(payload);
        self.lock().monitors.retain(|tx| {
            tx.send(MonitorEvent {
                pid,
                family: family.clone(),
                frame: frame.clone(),
                error,
            })
            .is_ok()
        });

        result
    }
}

impl Registrar for LoopbackBus {
    fn register_family(&self, spec: &FamilySpec<'_>) -> Result<Registered> {
        if spec.name.is_empty() || spec.name.len() >= GENL_NAMSIZ {
            return Err(Error::from_errno_with_context(
                -libc::EINVAL,
                format!("registering family {}", spec.name),
            ));
        }

        let mut ctrl = self.lock();
        if ctrl.family_by_name(spec.name).is_some() {
            return Err(Error::from_errno_with_context(
                -libc::EEXIST,
                format!("registering family {}", spec.name),
            ));
        }

        let id = ctrl.next_family_id;
        ctrl.next_family_id = id
            .checked_add(1)
            .ok_or_else(|| Error::ResourceExhausted("family ids".into()))?;

        let first_group = ctrl.next_group_id;
        let group_ids: Vec<u32> = (first_group..).take(spec.groups.len()).collect();
        ctrl.next_group_id = first_group + spec.groups.len() as u32;

        ctrl.families.push(FamilyEntry {
            id,
            name: spec.name.to_string(),
            version: spec.version,
            max_attr: spec.max_attr,
            groups: spec
                .groups
                .iter()
                .map(|g| g.to_string())
                .zip(group_ids.iter().copied())
                .collect(),
            ops: spec.ops.to_vec(),
        });
        debug!(family = spec.name, id, groups = group_ids.len(), "family registered");

        Ok(Registered { id, group_ids })
    }

    fn unregister_family(&self, id: u16) -> Result<()> {
        let mut ctrl = self.lock();
        let pos = ctrl
            .families
            .iter()
            .position(|f| f.id == id)
            .ok_or_else(|| Error::from_errno(-libc::ENOENT))?;
        let family = ctrl.families.remove(pos);

        for socket in ctrl.sockets.values_mut() {
            for (_, group) in &family.groups {
                socket.groups.remove(group);
            }
        }
        debug!(family = %family.name, id, "family unregistered");
        Ok(())
    }

    fn multicast(&self, group_id: u32, msg: &[u8]) -> Result<usize> {
        let ctrl = self.lock();
        if !ctrl.group_exists(group_id) {
            return Err(Error::from_errno(-libc::EINVAL));
        }

        let mut delivered = 0;
        for socket in ctrl.sockets.values() {
            if socket.groups.contains(&group_id) && socket.tx.send(msg.to_vec()).is_ok() {
                delivered += 1;
            }
        }
        trace!(group = group_id, delivered, "multicast");
        Ok(delivered)
    }
}

/// Socket attached to a [`LoopbackBus`].
pub struct LoopbackSocket {
    bus: LoopbackBus,
    pid: u32,
    seq: AtomicU32,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl LoopbackSocket {
    /// Number of datagrams queued and not yet received.
    pub fn pending(&self) -> usize {
        self.rx.try_lock().map(|rx| rx.len()).unwrap_or(0)
    }
}

impl Transport for LoopbackSocket {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn next_seq(&self) -> u32 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    fn add_membership(&mut self, group: u32) -> Result<()> {
        self.bus.join(self.pid, group)
    }

    async fn send(&self, msg: &[u8]) -> Result<()> {
        self.bus.deliver(self.pid, msg)
    }

    async fn recv_msg(&self) -> Result<Vec<u8>> {
        self.rx
            .lock()
            .await
            .recv()
            .await
            .ok_or(Error::ConnectionClosed)
    }
}

impl Drop for LoopbackSocket {
    fn drop(&mut self) {
        self.bus.close(self.pid);
    }
}
