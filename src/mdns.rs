//! mDNS advertisement and remote discovery (spec.md §6). This server
//! advertises `_touch-able._tcp.local.` so Remote apps can find it, and
//! browses `_touch-remote._tcp.local.` to learn about remotes wanting to
//! pair.
//!
//! Grounded on `imbolc-net`'s `discovery.rs` (`ServiceDaemon`,
//! `ServiceInfo`, `ServiceEvent::ServiceResolved`) -- that module runs its
//! browse loop on a dedicated `std::thread` because `mdns-sd`'s receiver
//! is synchronous; this crate instead bridges it onto a `tokio::task`
//! with `blocking_recv`, since everything else here already runs on the
//! tokio runtime.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};

use crate::pairing::{RemoteDescriptor, TouchRemoteListener};

const ADVERTISED_SERVICE: &str = "_touch-able._tcp.local.";
const REMOTE_SERVICE: &str = "_touch-remote._tcp.local.";

#[derive(Debug, thiserror::Error)]
pub enum MdnsError {
    #[error("mdns daemon error: {0}")]
    Daemon(String),
}

/// Advertise this server as a touch-able iTunes-compatible DACP host.
/// TXT keys match `dacp/constants.py`'s server announcement record.
pub fn advertise(port: u16, server_name: &str, server_id: &str) -> Result<ServiceDaemon, MdnsError> {
    let daemon = ServiceDaemon::new().map_err(|e| MdnsError::Daemon(e.to_string()))?;
    let hostname = gethostname_or_default();

    let mut properties = HashMap::new();
    properties.insert("txtvers".to_string(), "1".to_string());
    properties.insert("OSsi".to_string(), "0x122D9F".to_string());
    properties.insert("CtlN".to_string(), server_name.to_string());
    properties.insert("Ver".to_string(), "131073".to_string());
    properties.insert("DvSv".to_string(), "2306".to_string());
    properties.insert("DvTy".to_string(), "iTunes".to_string());
    properties.insert("DbId".to_string(), server_id.to_string());

    let instance_name = format!("{server_id}._{server_name}");
    let service = ServiceInfo::new(
        ADVERTISED_SERVICE,
        &instance_name,
        &format!("{hostname}.local."),
        (),
        port,
        properties,
    )
    .map_err(|e| MdnsError::Daemon(e.to_string()))?;

    daemon.register(service).map_err(|e| MdnsError::Daemon(e.to_string()))?;
    tracing::info!(%server_name, port, "advertising _touch-able._tcp.local.");
    Ok(daemon)
}

fn gethostname_or_default() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "euphonic".to_string())
}

/// Browse for `_touch-remote._tcp.local.` services and feed each one
/// into `listener` as it resolves. Runs until the daemon is dropped.
pub fn spawn_remote_browser(listener: Arc<TouchRemoteListener>) -> Result<ServiceDaemon, MdnsError> {
    let daemon = ServiceDaemon::new().map_err(|e| MdnsError::Daemon(e.to_string()))?;
    let receiver = daemon.browse(REMOTE_SERVICE).map_err(|e| MdnsError::Daemon(e.to_string()))?;

    tokio::task::spawn_blocking(move || {
        while let Ok(event) = receiver.recv() {
            if let ServiceEvent::ServiceResolved(info) = event {
                if let Some(remote) = remote_from_service_info(&info) {
                    tracing::info!(%remote, "discovered touch remote");
                    listener.observe(remote);
                }
            }
        }
    });

    Ok(daemon)
}

fn remote_from_service_info(info: &ServiceInfo) -> Option<RemoteDescriptor> {
    let properties = info.get_properties();
    let pair_id = properties.get_property_val_str("DvNm").map(str::to_string).unwrap_or_else(|| {
        info.get_fullname().split('.').next().unwrap_or_default().to_string()
    });
    let name = properties
        .get_property_val_str("CtlN")
        .unwrap_or_else(|| info.get_hostname())
        .to_string();
    let ip = info.get_addresses().iter().next()?;
    let addr = SocketAddr::new(*ip, info.get_port());
    Some(RemoteDescriptor { pair_id, name, addr })
}
