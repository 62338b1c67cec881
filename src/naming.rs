//! Key naming convention between the wire and the local tree.
//!
//! Wire keys are hyphenated (`dhcp-relay-ip`), local keys use underscores
//! (`dhcp_relay_ip`). Only the wire-to-local direction is derived; a field
//! table always stores both keys, because a handful of FortiOS keys break the
//! rule (`secondary-IP` is `secondary_ip` locally, `vrip6_link_local` keeps
//! its underscores on the wire).

/// Derive the local key for a wire key.
pub fn wire_to_local(wire_key: &str) -> String {
    wire_key.replace('-', "_")
}
