//! Unicast commands from a client to a bus family.

use tracing::{debug, error, info};

use super::address::{GroupAddress, family_name};
use super::protocol::{BUS_VERSION, BusAttr, BusCmd, MessageText, append_text};
use crate::netlink::genl::{CommandInfo, GenlConnection};
use crate::netlink::{Error, Result, Transport};

/// Producer-side handler for `MSG` commands.
///
/// Logs the sender's port id, the family and the text. A command without
/// the `MSG` attribute is rejected with
/// [`Error::MissingAttribute`], which reaches the sender as `EINVAL`.
pub fn handle_command(info: &CommandInfo<'_>) -> Result<()> {
    let Some(text) = info.attrs.string(BusAttr::Msg as u16)? else {
        error!(
            port = info.snd_portid,
            family = info.family,
            "command without MSG attribute"
        );
        return Err(Error::MissingAttribute("MSG"));
    };

    info!(
        port = info.snd_portid,
        family = info.family,
        seq = info.snd_seq,
        "received: {text}"
    );
    Ok(())
}

/// Send `text` to family `family_index` and wait for the acknowledgement.
///
/// The family id is looked up by name first; a lookup failure is reported
/// as [`Error::ResolutionFailed`]. Nothing is retried.
pub async fn send_command<T: Transport>(
    conn: &GenlConnection<T>,
    family_index: usize,
    text: &MessageText,
) -> Result<()> {
    GroupAddress::new(family_index, 0)?;
    let name = family_name(family_index);

    let family_id = conn
        .get_family_id(&name)
        .await
        .map_err(|e| Error::resolution(name.as_str(), e))?;
    debug!(family = %name, family_id, "resolved command target");

    conn.request(family_id, BusCmd::Msg as u8, BUS_VERSION, |b| {
        append_text(b, text)
    })
    .await
    .map_err(|e| e.with_context(format!("sending to {name}")))
}
