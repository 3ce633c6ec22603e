// crates/reputon-probe/src/prober.rs
//
// Outbound reachability probes.
//
// TCP: connect, send the challenge as one newline-terminated line, read one
// line back. UDP: send the challenge as one datagram, wait for one datagram.
// Every probe carries its own timeout and any failure (timeout, refused,
// wrong answer) only zeroes that probe.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpStream, UdpSocket};
use tokio::task::JoinSet;

use reputon_core::error::ReputonError;
use reputon_core::identity::PeerKey;
use reputon_core::instance::InstanceInfo;
use reputon_core::params::ProbeParams;

use crate::challenge::expected_response;

/// Largest response accepted from a probed port.
const MAX_RESPONSE_LEN: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeTransport {
    Tcp,
    Udp,
}

impl fmt::Display for ProbeTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeTransport::Tcp => write!(f, "tcp"),
            ProbeTransport::Udp => write!(f, "udp"),
        }
    }
}

/// Probe every advertised port of `target` concurrently.
///
/// Returns the number of probes that received the expected response and the
/// number issued. A peer whose info cannot be probed gets zero of zero.
/// Otherwise the issued count is always `probes_per_peer()`: a port past
/// 65535 counts as a failed probe.
pub async fn probe_peer(
    target: &PeerKey,
    info: &InstanceInfo,
    challenge: &str,
    params: &ProbeParams,
) -> Result<(u32, u32), ReputonError> {
    let host = match info.domain.as_deref() {
        Some(domain) if info.is_probeable() => domain.to_string(),
        _ => return Ok((0, 0)),
    };
    let expected = expected_response(challenge, target)?;
    let timeout = Duration::from_millis(params.probe_timeout_ms);

    let mut probes = JoinSet::new();
    let ports = info
        .tcp_ports(params.ports_per_transport)
        .into_iter()
        .map(|p| (ProbeTransport::Tcp, p))
        .chain(
            info.udp_ports(params.ports_per_transport)
                .into_iter()
                .map(|p| (ProbeTransport::Udp, p)),
        );

    for (transport, port) in ports {
        let host = host.clone();
        let challenge = challenge.to_string();
        let expected = expected.clone();
        probes.spawn(async move {
            let result = probe_port(transport, &host, port, &challenge, &expected, timeout).await;
            (transport, port, result)
        });
    }

    let issued = params.probes_per_peer();
    let unformed = issued.saturating_sub(probes.len() as u32);
    if unformed > 0 {
        tracing::debug!("{} probe ports for {} are past 65535", unformed, target);
    }

    let mut successes = 0u32;
    while let Some(joined) = probes.join_next().await {
        match joined {
            Ok((transport, port, Ok(()))) => {
                tracing::debug!("Probe {} {}:{} for {} succeeded", transport, host, port, target);
                successes += 1;
            }
            Ok((transport, port, Err(e))) => {
                tracing::debug!("Probe {} {}:{} for {} failed: {}", transport, host, port, target, e);
            }
            Err(e) => {
                tracing::warn!("Probe task for {} aborted: {}", target, e);
            }
        }
    }

    Ok((successes, issued))
}

/// One probe against one port, bounded by `timeout`.
pub async fn probe_port(
    transport: ProbeTransport,
    host: &str,
    port: u16,
    challenge: &str,
    expected: &str,
    timeout: Duration,
) -> Result<(), ReputonError> {
    let attempt = async {
        match transport {
            ProbeTransport::Tcp => tcp_exchange(host, port, challenge).await,
            ProbeTransport::Udp => udp_exchange(host, port, challenge).await,
        }
    };

    let response = tokio::time::timeout(timeout, attempt)
        .await
        .map_err(|_| {
            ReputonError::ProbeTimeout(format!("{} {}:{} after {:?}", transport, host, port, timeout))
        })??;

    if response.trim().eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(ReputonError::ProbeTransport(format!(
            "{} {}:{} answered with an unexpected response",
            transport, host, port
        )))
    }
}

async fn tcp_exchange(host: &str, port: u16, challenge: &str) -> Result<String, ReputonError> {
    let transport_err =
        |e: std::io::Error| ReputonError::ProbeTransport(format!("tcp {}:{}: {}", host, port, e));

    let mut stream = TcpStream::connect((host, port)).await.map_err(transport_err)?;
    stream
        .write_all(format!("{}\n", challenge).as_bytes())
        .await
        .map_err(transport_err)?;

    let mut reader = BufReader::new(stream).take(MAX_RESPONSE_LEN as u64);
    let mut line = String::new();
    let n = reader.read_line(&mut line).await.map_err(transport_err)?;
    if n == 0 {
        return Err(ReputonError::ProbeTransport(format!(
            "tcp {}:{} closed without answering",
            host, port
        )));
    }
    Ok(line)
}

async fn udp_exchange(host: &str, port: u16, challenge: &str) -> Result<String, ReputonError> {
    let transport_err =
        |e: std::io::Error| ReputonError::ProbeTransport(format!("udp {}:{}: {}", host, port, e));

    let target = tokio::net::lookup_host((host, port))
        .await
        .map_err(transport_err)?
        .next()
        .ok_or_else(|| {
            ReputonError::ProbeTransport(format!("udp {}:{}: no address resolved", host, port))
        })?;

    let local: SocketAddr = match target {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let socket = UdpSocket::bind(local).await.map_err(transport_err)?;
    socket.connect(target).await.map_err(transport_err)?;
    socket
        .send(challenge.as_bytes())
        .await
        .map_err(transport_err)?;

    let mut buf = vec![0u8; MAX_RESPONSE_LEN];
    let n = socket.recv(&mut buf).await.map_err(transport_err)?;
    Ok(String::from_utf8_lossy(&buf[..n]).into_owned())
}
