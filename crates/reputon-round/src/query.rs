// crates/reputon-round/src/query.rs
//
// Read-only query dispatch.
//
// Clients send JSON with a `command` field. `read_scores` returns the score
// board computed from the stored ledger, or an explicit null with a message
// when nothing was recorded yet. `read_logs` returns the tail of the
// operational log file verbatim. Anything else gets an error for that
// request only.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use reputon_core::params::ScoreParams;
use reputon_core::traits::StateStore;
use reputon_reputation::compute_scores;

/// Lines returned by `read_logs` when the request does not say.
pub const DEFAULT_LOG_LINES: usize = 100;

/// A client request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum QueryRequest {
    ReadScores,
    ReadLogs {
        #[serde(default)]
        lines: Option<usize>,
    },
}

/// Answers client queries from the persisted ledger.
pub struct QueryService {
    store: Arc<dyn StateStore>,
    score: ScoreParams,
    log_file: Option<PathBuf>,
}

impl QueryService {
    pub fn new(store: Arc<dyn StateStore>, score: ScoreParams) -> Self {
        Self {
            store,
            score,
            log_file: None,
        }
    }

    /// Serve `read_logs` from `path`.
    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    /// Answer one raw request payload.
    pub async fn handle(&self, payload: &[u8]) -> Value {
        let request: QueryRequest = match serde_json::from_slice(payload) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!("Rejecting query: {}", e);
                return json!({ "error": format!("invalid request: {}", e) });
            }
        };

        match request {
            QueryRequest::ReadScores => self.read_scores().await,
            QueryRequest::ReadLogs { lines } => {
                self.read_logs(lines.unwrap_or(DEFAULT_LOG_LINES)).await
            }
        }
    }

    pub async fn read_scores(&self) -> Value {
        let snapshot = self.store.load_snapshot().await;
        match compute_scores(
            &snapshot.resource,
            &snapshot.port,
            snapshot.executions,
            &self.score,
        ) {
            Some(board) if !board.is_empty() => json!({
                "command": "read_scores",
                "scores": board.scores(),
            }),
            _ => json!({
                "command": "read_scores",
                "scores": Value::Null,
                "message": "no scores recorded yet",
            }),
        }
    }

    pub async fn read_logs(&self, lines: usize) -> Value {
        let Some(path) = &self.log_file else {
            return json!({ "error": "no log file configured" });
        };

        match tokio::fs::read_to_string(path).await {
            Ok(content) => json!({
                "command": "read_logs",
                "logs": tail_lines(&content, lines),
            }),
            Err(e) => {
                tracing::warn!("Failed to read log file {}: {}", path.display(), e);
                json!({ "error": format!("log file unavailable: {}", e) })
            }
        }
    }
}

/// Last `n` lines of `content`, unmodified.
fn tail_lines(content: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    let trimmed = content.strip_suffix('\n').unwrap_or(content);
    match trimmed.rmatch_indices('\n').nth(n - 1) {
        Some((index, _)) => &content[index + 1..],
        None => content,
    }
}
