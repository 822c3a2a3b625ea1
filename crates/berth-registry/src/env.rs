//! Container environment contract.
//!
//! Every deployed container receives `CS_CONTAINER_ID`, `CS_APPLICATION`,
//! `CS_CLUSTER_ID`, and one `CS_DISCOVERY_PORT_<APPLICATION>` per known
//! application. Other components depend on these names bit for bit.

use std::collections::BTreeMap;

pub const CONTAINER_ID: &str = "CS_CONTAINER_ID";
pub const APPLICATION: &str = "CS_APPLICATION";
pub const CLUSTER_ID: &str = "CS_CLUSTER_ID";

const DISCOVERY_PORT_PREFIX: &str = "CS_DISCOVERY_PORT_";

/// Name of the discovery-port variable for `application`.
pub fn discovery_port_var(application: &str) -> String {
    format!("{DISCOVERY_PORT_PREFIX}{}", application.to_uppercase())
}

/// Fill in the identity variables without overriding values already set.
pub fn apply_identity(
    env: &mut BTreeMap<String, String>,
    container_id: &str,
    application: &str,
    cluster_id: &str,
) {
    env.entry(CONTAINER_ID.to_string())
        .or_insert_with(|| container_id.to_string());
    env.entry(APPLICATION.to_string())
        .or_insert_with(|| application.to_string());
    env.entry(CLUSTER_ID.to_string())
        .or_insert_with(|| cluster_id.to_string());
}

/// Overwrite one discovery-port variable per `(application, port)` pair.
///
/// Recomputed on every deploy from the live application set.
pub fn apply_discovery_ports<'a>(
    env: &mut BTreeMap<String, String>,
    ports: impl IntoIterator<Item = (&'a str, u16)>,
) {
    for (application, port) in ports {
        env.insert(discovery_port_var(application), port.to_string());
    }
}
