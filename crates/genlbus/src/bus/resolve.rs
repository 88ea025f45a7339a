//! Consumer-side resolution of global group numbers.

use tracing::debug;

use super::address::{GlobalGroupId, GroupAddress};
use super::config::SubscriptionSet;
use super::receive::Subscriber;
use crate::netlink::genl::GenlConnection;
use crate::netlink::{Error, Result, Transport};

/// A global group number together with the ids it resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedGroup {
    pub global: GlobalGroupId,
    pub address: GroupAddress,
    /// Runtime family id.
    pub family_id: u16,
    /// Runtime multicast group id.
    pub group_id: u32,
}

/// Resolve one group by family and group name.
pub async fn resolve_group<T: Transport>(
    conn: &GenlConnection<T>,
    global: GlobalGroupId,
) -> Result<ResolvedGroup> {
    let address = global.address();
    let family = address.family_name();
    let group = address.group_name();

    let family_id = conn
        .get_family_id(&family)
        .await
        .map_err(|e| Error::resolution(family.as_str(), e))?;
    // Served from the connection's family cache
    let group_id = conn
        .get_group_id(&family, &group)
        .await
        .map_err(|e| Error::resolution(format!("{family}/{group}"), e))?;

    debug!(%global, %address, family_id, group_id, "resolved group");
    Ok(ResolvedGroup {
        global,
        address,
        family_id,
        group_id,
    })
}

/// Resolve every group of `set`, in set order. The first failure aborts.
pub async fn resolve_all<T: Transport>(
    conn: &GenlConnection<T>,
    set: &SubscriptionSet,
) -> Result<Vec<ResolvedGroup>> {
    let mut resolved = Vec::with_capacity(set.len());
    for global in set.iter() {
        resolved.push(resolve_group(conn, global).await?);
    }
    Ok(resolved)
}

/// Resolve every group of `set` and join them on `conn`.
///
/// Joining only starts once every group resolved, so a lookup failure
/// leaves no membership behind. The connection is dropped on any error.
pub async fn subscribe<T: Transport>(
    mut conn: GenlConnection<T>,
    set: &SubscriptionSet,
) -> Result<Subscriber<T>> {
    if set.is_empty() {
        return Err(Error::Usage("no groups to subscribe to".into()));
    }

    let groups = resolve_all(&conn, set).await?;
    for group in &groups {
        conn.add_membership(group.group_id)
            .map_err(|e| e.with_context(format!("joining {}", group.address)))?;
        debug!(group = %group.global, id = group.group_id, "joined group");
    }

    Ok(Subscriber::new(conn, groups))
}
