// crates/reputon-probe/src/responder.rs
//
// Probe echo responder: the listening side of reachability probing.
//
// Answers every challenge with expected_response(challenge, local key) on a
// set of TCP and UDP ports. TCP connections may carry any number of
// newline-terminated challenges; each UDP datagram is one challenge.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::task::JoinHandle;

use reputon_core::error::ReputonError;
use reputon_core::identity::PeerKey;

use crate::challenge::expected_response;

const MAX_CHALLENGE_LEN: usize = 1024;

/// Answers probes for one node identity.
#[derive(Debug, Clone)]
pub struct ProbeResponder {
    local: Arc<PeerKey>,
}

/// Running listeners. They serve until `shutdown`; dropping the handle
/// leaves them running.
#[derive(Debug)]
pub struct ResponderHandle {
    pub tcp_addrs: Vec<SocketAddr>,
    pub udp_addrs: Vec<SocketAddr>,
    tasks: Vec<JoinHandle<()>>,
}

impl ResponderHandle {
    pub fn shutdown(self) {
        for task in self.tasks {
            task.abort();
        }
    }
}

impl ProbeResponder {
    pub fn new(local: PeerKey) -> Self {
        Self {
            local: Arc::new(local),
        }
    }

    /// Bind `host` on every port in `tcp_ports` and `udp_ports` and serve
    /// until shut down. Port 0 binds an ephemeral port; the bound addresses
    /// are reported on the handle.
    pub async fn bind(
        &self,
        host: &str,
        tcp_ports: &[u16],
        udp_ports: &[u16],
    ) -> Result<ResponderHandle, ReputonError> {
        let mut handle = ResponderHandle {
            tcp_addrs: Vec::new(),
            udp_addrs: Vec::new(),
            tasks: Vec::new(),
        };

        for port in tcp_ports {
            let listener = TcpListener::bind((host, *port)).await.map_err(|e| {
                ReputonError::ProbeTransport(format!("failed to bind tcp {}:{}: {}", host, port, e))
            })?;
            let addr = listener
                .local_addr()
                .map_err(|e| ReputonError::ProbeTransport(e.to_string()))?;
            tracing::info!("Probe responder listening on tcp {}", addr);
            handle.tcp_addrs.push(addr);
            handle.tasks.push(tokio::spawn(serve_tcp(listener, self.local.clone())));
        }

        for port in udp_ports {
            let socket = UdpSocket::bind((host, *port)).await.map_err(|e| {
                ReputonError::ProbeTransport(format!("failed to bind udp {}:{}: {}", host, port, e))
            })?;
            let addr = socket
                .local_addr()
                .map_err(|e| ReputonError::ProbeTransport(e.to_string()))?;
            tracing::info!("Probe responder listening on udp {}", addr);
            handle.udp_addrs.push(addr);
            handle.tasks.push(tokio::spawn(serve_udp(socket, self.local.clone())));
        }

        Ok(handle)
    }
}

async fn serve_tcp(listener: TcpListener, local: Arc<PeerKey>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let local = local.clone();
                tokio::spawn(async move {
                    if let Err(e) = answer_tcp(stream, &local).await {
                        tracing::debug!("tcp probe from {} ended: {}", peer, e);
                    }
                });
            }
            Err(e) => {
                tracing::warn!("tcp accept failed: {}", e);
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

async fn answer_tcp(stream: TcpStream, local: &PeerKey) -> Result<(), ReputonError> {
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);
    let mut line = String::new();

    loop {
        line.clear();
        let n = (&mut reader)
            .take(MAX_CHALLENGE_LEN as u64)
            .read_line(&mut line)
            .await?;
        if n == 0 {
            return Ok(());
        }
        let response = expected_response(line.trim(), local)?;
        write.write_all(format!("{}\n", response).as_bytes()).await?;
    }
}

async fn serve_udp(socket: UdpSocket, local: Arc<PeerKey>) {
    let mut buf = vec![0u8; MAX_CHALLENGE_LEN];
    loop {
        let (n, peer) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                tracing::debug!("udp receive failed: {}", e);
                continue;
            }
        };

        let challenge = String::from_utf8_lossy(&buf[..n]);
        match expected_response(challenge.trim(), &local) {
            Ok(response) => {
                if let Err(e) = socket.send_to(response.as_bytes(), peer).await {
                    tracing::debug!("udp reply to {} failed: {}", peer, e);
                }
            }
            Err(e) => tracing::debug!("Ignoring udp challenge from {}: {}", peer, e),
        }
    }
}
