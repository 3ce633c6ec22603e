// crates/reputon-daemon/src/runtime.rs
//
// Stdio host-runtime adapter.
//
// The host consensus runtime talks to the node with newline-delimited JSON.
//
// Inbound (host -> node):
//   {"type":"round","context":{...}}
//   {"type":"peer_message","peer":"ed..","payload":<json>}
//   {"type":"user_input","user":"..","payload":<json>}
//   {"type":"end"}
//
// Outbound (node -> host):
//   {"type":"broadcast","payload":<json>}
//   {"type":"user_reply","user":"..","payload":<json>}
//   {"type":"round_complete","outcome":{...}}
//   {"type":"round_failed","error":".."}
//
// One invocation serves exactly one round. Peer messages and user inputs
// that arrive before the round context are held until it does.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use reputon_core::error::ReputonError;
use reputon_core::identity::PeerKey;
use reputon_core::round::RoundContext;
use reputon_core::traits::RoundTransport;
use reputon_round::{round_inbox, QueryService, RoundOutcome, RoundRunner};

/// A line from the host.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
    Round { context: RoundContext },
    PeerMessage { peer: PeerKey, payload: Value },
    UserInput { user: String, payload: Value },
    End,
}

/// A line to the host.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeMessage {
    Broadcast { payload: Value },
    UserReply { user: String, payload: Value },
    RoundComplete { outcome: RoundOutcome },
    RoundFailed { error: String },
}

/// Outbound half of the adapter. Cloning shares the writer.
pub struct HostChannel<W> {
    out: Arc<Mutex<W>>,
}

impl<W> Clone for HostChannel<W> {
    fn clone(&self) -> Self {
        Self {
            out: self.out.clone(),
        }
    }
}

impl<W: AsyncWrite + Unpin + Send> HostChannel<W> {
    pub fn new(writer: W) -> Self {
        Self {
            out: Arc::new(Mutex::new(writer)),
        }
    }

    /// Write one message as a single line.
    pub async fn emit(&self, message: &NodeMessage) -> Result<(), ReputonError> {
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');
        let mut out = self.out.lock().await;
        out.write_all(&line).await?;
        out.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> RoundTransport for HostChannel<W> {
    async fn broadcast(&self, payload: Vec<u8>) -> Result<(), ReputonError> {
        let payload: Value = serde_json::from_slice(&payload)?;
        self.emit(&NodeMessage::Broadcast { payload }).await
    }
}

/// Peer payloads arrive as JSON; a JSON string carries the raw payload text.
fn payload_bytes(payload: &Value) -> Result<Vec<u8>, ReputonError> {
    match payload {
        Value::String(text) => Ok(text.as_bytes().to_vec()),
        other => Ok(serde_json::to_vec(other)?),
    }
}

fn parse_line(line: &str) -> Option<HostMessage> {
    match serde_json::from_str(line) {
        Ok(message) => Some(message),
        Err(e) => {
            tracing::warn!("Ignoring unreadable host message: {}", e);
            None
        }
    }
}

/// Serve one invocation from `reader`.
///
/// Read-only rounds answer every user input until the host sends `end`.
/// Writing rounds run the round while still accepting peer messages, then
/// report the outcome. Returns the outcome of a writing round.
pub async fn serve_invocation<R, W>(
    reader: R,
    host: HostChannel<W>,
    runner: &RoundRunner,
    queries: &QueryService,
) -> Result<Option<RoundOutcome>, ReputonError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send,
{
    let mut lines = reader.lines();
    let (handle, inbox) = round_inbox();
    let mut pending_inputs: Vec<(String, Value)> = Vec::new();

    // Phase 1: wait for the round context.
    let ctx = loop {
        let Some(line) = lines.next_line().await? else {
            return Err(ReputonError::InvalidRoundContext(
                "host closed the channel before sending a round".to_string(),
            ));
        };
        match parse_line(&line) {
            Some(HostMessage::Round { context }) => break context,
            Some(HostMessage::PeerMessage { peer, payload }) => {
                handle.deliver(peer, payload_bytes(&payload)?);
            }
            Some(HostMessage::UserInput { user, payload }) => pending_inputs.push((user, payload)),
            Some(HostMessage::End) => {
                return Err(ReputonError::InvalidRoundContext(
                    "host ended the invocation before sending a round".to_string(),
                ));
            }
            None => {}
        }
    };

    for (user, payload) in pending_inputs {
        answer(&host, queries, user, &payload).await?;
    }

    // Phase 2a: read-only invocations only serve queries.
    if ctx.is_read_only {
        while let Some(line) = lines.next_line().await? {
            match parse_line(&line) {
                Some(HostMessage::UserInput { user, payload }) => {
                    answer(&host, queries, user, &payload).await?;
                }
                Some(HostMessage::End) => break,
                Some(_) => tracing::debug!("Ignoring non-query message in read-only round"),
                None => {}
            }
        }
        return Ok(None);
    }

    // Phase 2b: run the round while the inbox keeps filling.
    let round = runner.run_round(&ctx, inbox, &host);
    tokio::pin!(round);
    let mut reading = true;

    let result = loop {
        tokio::select! {
            result = &mut round => break result,
            line = lines.next_line(), if reading => {
                match line {
                    Ok(Some(line)) => match parse_line(&line) {
                        Some(HostMessage::PeerMessage { peer, payload }) => {
                            match payload_bytes(&payload) {
                                Ok(bytes) => {
                                    if !handle.deliver(peer.clone(), bytes) {
                                        tracing::debug!("Window closed, dropping message from {}", peer);
                                    }
                                }
                                Err(e) => tracing::warn!("Unusable payload from {}: {}", peer, e),
                            }
                        }
                        Some(HostMessage::UserInput { user, payload }) => {
                            answer(&host, queries, user, &payload).await?;
                        }
                        Some(HostMessage::End) => reading = false,
                        Some(HostMessage::Round { .. }) => {
                            tracing::warn!("Ignoring second round context in one invocation");
                        }
                        None => {}
                    },
                    Ok(None) => reading = false,
                    Err(e) => {
                        tracing::warn!("Host input failed: {}", e);
                        reading = false;
                    }
                }
            }
        }
    };

    match result {
        Ok(outcome) => {
            host.emit(&NodeMessage::RoundComplete {
                outcome: outcome.clone(),
            })
            .await?;
            Ok(Some(outcome))
        }
        Err(e) => {
            host.emit(&NodeMessage::RoundFailed {
                error: e.to_string(),
            })
            .await?;
            Err(e)
        }
    }
}

async fn answer<W: AsyncWrite + Unpin + Send>(
    host: &HostChannel<W>,
    queries: &QueryService,
    user: String,
    payload: &Value,
) -> Result<(), ReputonError> {
    let request = payload_bytes(payload)?;
    let reply = queries.handle(&request).await;
    host.emit(&NodeMessage::UserReply {
        user,
        payload: reply,
    })
    .await
}
