//! Discovery: advertises this agent over mDNS and watches for others.
//! `mdns-sd` speaks through synchronous channels, so the watch loop runs on
//! a blocking task wrapping the sync API with `spawn_blocking`, and forwards
//! discovered peers into [`AppState::discovered_peers`].
//!
//! Purely advisory: pairing still requires the full handshake.

use std::sync::Arc;

use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};

use crate::state::AppState;

const SERVICE_TYPE: &str = "_adbtoolkit._tcp.local.";

pub struct Discovery {
    daemon: ServiceDaemon,
}

impl Discovery {
    /// Registers this agent's HTTP port as an mDNS service instance and
    /// starts the background task that watches for other instances.
    pub fn start(state: Arc<AppState>, device_id: &str, http_port: u16) -> Result<Self, mdns_sd::Error> {
        let daemon = ServiceDaemon::new()?;

        let host_ip = local_ipv4().unwrap_or_else(|| "0.0.0.0".to_string());
        let host_name = format!("{device_id}.local.");
        let instance_name = device_id.to_string();

        let service_info = ServiceInfo::new(
            SERVICE_TYPE,
            &instance_name,
            &host_name,
            host_ip.as_str(),
            http_port,
            None,
        )?;
        daemon.register(service_info)?;

        let receiver = daemon.browse(SERVICE_TYPE)?;
        tokio::task::spawn_blocking(move || {
            while let Ok(event) = receiver.recv() {
                match event {
                    ServiceEvent::ServiceResolved(info) => {
                        let Some(addr) = info.get_addresses().iter().next() else { continue };
                        state
                            .discovered_peers
                            .insert(info.get_fullname().to_string(), (addr.to_string(), info.get_port()));
                        tracing::info!(service = %info.get_fullname(), "discovered peer agent");
                    }
                    ServiceEvent::ServiceRemoved(_ty, fullname) => {
                        state.discovered_peers.remove(&fullname);
                        tracing::info!(%fullname, "peer agent no longer advertised");
                    }
                    _ => {}
                }
            }
        });

        Ok(Self { daemon })
    }

    pub fn shutdown(self) {
        if let Err(e) = self.daemon.shutdown() {
            tracing::warn!(error = %e, "mDNS daemon shutdown reported an error");
        }
    }
}

/// Best-effort local IPv4 address for the mDNS advertisement; falls back to
/// the wildcard address if none can be determined.
fn local_ipv4() -> Option<String> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    socket.local_addr().ok().map(|addr| addr.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_type_matches_spec_instance_type() {
        assert_eq!(SERVICE_TYPE, "_adbtoolkit._tcp.local.");
    }
}
