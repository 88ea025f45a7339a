//! The bus itself: addressing, producer registry, client operations.
//!
//! ```text
//!   producer                              consumer
//!   ─────────────────────────             ─────────────────────────
//!   FamilyRegistry::register_all          resolve::subscribe
//!     5 families x 100 groups               name -> family id, group id
//!   broadcast task (every 5 s)   ───►       join groups
//!     family k -> group 0                  Subscriber::run
//!   handle_command               ◄───     command::send_command
//! ```

pub mod address;
pub mod broadcast;
pub mod command;
pub mod config;
pub mod names;
pub mod protocol;
pub mod receive;
pub mod registry;
pub mod resolve;

pub use address::{
    FAMILY_BASE_NAME, FAMILY_COUNT, GROUP_BASE_NAME, GROUPS_PER_FAMILY, GlobalGroupId,
    GroupAddress, TOTAL_GROUPS, compose, decompose, family_name, group_name,
};
pub use broadcast::{BroadcastReport, broadcast_once, greeting};
pub use command::{handle_command, send_command};
pub use config::{ClientConfig, Mode, SchedulerConfig, SubscriptionSet};
pub use names::{HeapNames, Name, NameAllocator};
pub use protocol::{BUS_POLICY, BUS_VERSION, BusAttr, BusCmd, MSG_MAX_LEN, MessageText};
pub use receive::{Notification, Subscriber};
pub use registry::{
    FamilyDescriptor, FamilyRegistry, FamilyView, GroupDescriptor, RegistryView,
};
pub use resolve::{ResolvedGroup, resolve_all, resolve_group, subscribe};
