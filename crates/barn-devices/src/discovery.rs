/*!
 * Alpaca discovery responder.
 *
 * Clients find Alpaca servers by broadcasting a UDP datagram starting with
 * `alpacadiscovery1`. Every such probe is answered, to its sender, with a
 * small JSON document carrying the REST port. Anything else is ignored.
 */
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tracing::{debug, info, warn, Instrument};

use barn_core::logging::component_span;
use barn_core::utils::spawn_and_log;

use crate::device::Result;

/// Prefix identifying a discovery probe
pub const DISCOVERY_PREFIX: &[u8] = b"alpacadiscovery1";

/// Fallback discovery port
pub const DEFAULT_DISCOVERY_PORT: u16 = 32227;

/// Fallback REST port advertised when the configured one is invalid
pub const DEFAULT_ALPACA_PORT: u16 = 11111;

const RECEIVE_BUFFER_SIZE: usize = 1024;

/// Validated discovery and REST ports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryPorts {
    /// UDP port the responder listens on
    pub listen_port: u16,
    /// TCP port advertised to clients
    pub api_port: u16,
}

impl DiscoveryPorts {
    /// Validate raw port numbers, substituting defaults for values outside 1-65535
    pub fn new(listen_port: u32, api_port: u32) -> Self {
        Self {
            listen_port: valid_port(listen_port).unwrap_or(DEFAULT_DISCOVERY_PORT),
            api_port: valid_port(api_port).unwrap_or(DEFAULT_ALPACA_PORT),
        }
    }

    /// Wildcard address the responder binds to
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.listen_port))
    }
}

impl Default for DiscoveryPorts {
    fn default() -> Self {
        Self {
            listen_port: DEFAULT_DISCOVERY_PORT,
            api_port: DEFAULT_ALPACA_PORT,
        }
    }
}

fn valid_port(port: u32) -> Option<u16> {
    u16::try_from(port).ok().filter(|port| *port != 0)
}

/// Whether a datagram is a discovery probe
pub fn is_discovery_probe(datagram: &[u8]) -> bool {
    datagram.starts_with(DISCOVERY_PREFIX)
}

/// The reply advertising `api_port`
pub fn discovery_reply(api_port: u16) -> String {
    format!("{{\n\"AlpacaPort\":{}\n}}", api_port)
}

/// Answers discovery probes on a UDP socket
#[derive(Debug)]
pub struct DiscoveryResponder {
    socket: Arc<UdpSocket>,
    reply: Arc<str>,
}

impl DiscoveryResponder {
    /// Bind to the wildcard address on the configured discovery port
    pub async fn bind(ports: DiscoveryPorts) -> Result<Self> {
        Self::bind_addr(ports.listen_addr(), ports.api_port).await
    }

    /// Bind to a specific address
    pub async fn bind_addr(addr: SocketAddr, api_port: u16) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        info!(addr = %socket.local_addr()?, api_port, "Discovery responder listening");
        Ok(Self {
            socket: Arc::new(socket),
            reply: Arc::from(discovery_reply(api_port)),
        })
    }

    /// Address the socket is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Serve probes until the task is dropped.
    ///
    /// Each reply is sent from its own task so a slow send never delays the
    /// next receive. Receive errors are logged and the loop continues.
    pub async fn run(self) {
        let span = component_span("discovery", None);
        self.serve().instrument(span).await
    }

    async fn serve(self) {
        let mut buf = [0u8; RECEIVE_BUFFER_SIZE];

        loop {
            let (len, peer) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    warn!("Discovery receive failed: {}", e);
                    continue;
                }
            };

            if !is_discovery_probe(&buf[..len]) {
                debug!(peer = %peer, len, "Ignoring non-discovery datagram");
                continue;
            }

            debug!(peer = %peer, "Answering discovery probe");
            let socket = Arc::clone(&self.socket);
            let reply = Arc::clone(&self.reply);
            spawn_and_log("discovery reply", async move {
                socket.send_to(reply.as_bytes(), peer).await
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::time::timeout;

    #[test]
    fn test_reply_format() {
        assert_eq!(discovery_reply(11111), "{\n\"AlpacaPort\":11111\n}");
    }

    #[test]
    fn test_probe_detection() {
        assert!(is_discovery_probe(b"alpacadiscovery1"));
        assert!(is_discovery_probe(b"alpacadiscovery1 extra"));
        assert!(!is_discovery_probe(b"alpacadiscovery"));
        assert!(!is_discovery_probe(b"hello"));
    }

    #[test]
    fn test_invalid_ports_fall_back() {
        assert_eq!(DiscoveryPorts::new(0, 70000), DiscoveryPorts::default());
        assert_eq!(
            DiscoveryPorts::new(40000, 8080),
            DiscoveryPorts {
                listen_port: 40000,
                api_port: 8080
            }
        );
    }

    #[tokio::test]
    async fn test_answers_probe_and_ignores_noise() {
        let responder = DiscoveryResponder::bind_addr(SocketAddr::from(([127, 0, 0, 1], 0)), 8080)
            .await
            .unwrap();
        let server = responder.local_addr().unwrap();
        let task = tokio::spawn(responder.run());

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut buf = [0u8; 128];

        client.send_to(b"not a probe", server).await.unwrap();
        assert!(timeout(Duration::from_millis(200), client.recv_from(&mut buf))
            .await
            .is_err());

        client.send_to(b"alpacadiscovery1", server).await.unwrap();
        let (len, from) = timeout(Duration::from_secs(2), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(from, server);

        let reply: serde_json::Value = serde_json::from_slice(&buf[..len]).unwrap();
        assert_eq!(reply["AlpacaPort"], 8080);

        task.abort();
    }
}
