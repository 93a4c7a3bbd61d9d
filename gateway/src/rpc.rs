//! JSON-RPC client for an election ledger endpoint.

use serde::Deserialize;
use std::time::Duration;

use tally_types::{Candidate, CandidateId, ElectionAction, ElectionPhase, Identity};
use tokio::sync::broadcast;

use crate::{LedgerError, LedgerGateway, LedgerNotification, TransactionOutcome};

/// Default per-request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default connection timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default capacity of the notification broadcast channel.
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 256;

/// HTTP client for an election ledger speaking JSON-RPC.
///
/// Every request is a `POST` of `{"action": <name>, ...params}`. The reply carries
/// either a `result` value or an `error` string, the latter being the ledger's
/// authoritative refusal.
///
/// Notifications are not delivered over HTTP. The client owns the broadcast
/// channel; an [`EventFeed`](crate::EventFeed) publishes into it via
/// [`RpcLedgerClient::notifier`].
#[derive(Clone)]
pub struct RpcLedgerClient {
    http: reqwest::Client,
    ledger_url: String,
    notifications: broadcast::Sender<LedgerNotification>,
}

#[derive(Debug, Deserialize)]
struct PhaseResult {
    phase: u8,
}

#[derive(Debug, Deserialize)]
struct AdminResult {
    admin: String,
}

#[derive(Debug, Deserialize)]
struct CountResult {
    count: u64,
}

#[derive(Debug, Deserialize)]
struct CandidateResult {
    id: u64,
    name: String,
    vote_count: u64,
}

#[derive(Debug, Deserialize)]
struct VotedResult {
    voted: bool,
}

/// Receipt returned by the `submit` action once the transaction is mined.
#[derive(Debug, Deserialize)]
struct SubmitResult {
    status: String,
    #[serde(default)]
    tx_hash: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

impl RpcLedgerClient {
    /// Create a client targeting `ledger_url` with default timeouts.
    pub fn new(ledger_url: impl Into<String>) -> Result<Self, LedgerError> {
        Self::with_timeout(ledger_url, DEFAULT_TIMEOUT, DEFAULT_NOTIFICATION_CAPACITY)
    }

    /// Create a client with a custom per-request timeout and notification capacity.
    pub fn with_timeout(
        ledger_url: impl Into<String>,
        timeout: Duration,
        notification_capacity: usize,
    ) -> Result<Self, LedgerError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT.min(timeout))
            .build()
            .map_err(|e| LedgerError::Transport(format!("failed to create HTTP client: {e}")))?;
        let (notifications, _) = broadcast::channel(notification_capacity.max(1));
        Ok(Self {
            http,
            ledger_url: ledger_url.into(),
            notifications,
        })
    }

    /// The configured ledger URL.
    pub fn ledger_url(&self) -> &str {
        &self.ledger_url
    }

    /// Sender half of the notification channel, for a transport to publish into.
    pub fn notifier(&self) -> broadcast::Sender<LedgerNotification> {
        self.notifications.clone()
    }

    /// Send a JSON-RPC request and return the `result` field.
    async fn rpc_call(
        &self,
        action: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, LedgerError> {
        let mut body = params;
        body.as_object_mut()
            .ok_or_else(|| LedgerError::InvalidResponse("params must be a JSON object".into()))?
            .insert("action".to_string(), serde_json::json!(action));

        let response = self
            .http
            .post(&self.ledger_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LedgerError::Transport(format!("{action}: request timed out: {e}"))
                } else if e.is_connect() {
                    LedgerError::Transport(format!("{action}: connection failed: {e}"))
                } else {
                    LedgerError::Transport(format!("{action}: request failed: {e}"))
                }
            })?;

        if let Some(err) = status_error(action, response.status()) {
            return Err(err);
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LedgerError::InvalidResponse(format!("{action}: invalid JSON: {e}")))?;

        if let Some(err) = json.get("error").and_then(|e| e.as_str()) {
            return Err(LedgerError::Rejected(err.to_string()));
        }

        Ok(json.get("result").cloned().unwrap_or(json))
    }

    async fn typed_call<T: serde::de::DeserializeOwned>(
        &self,
        action: &str,
        params: serde_json::Value,
    ) -> Result<T, LedgerError> {
        let result = self.rpc_call(action, params).await?;
        serde_json::from_value(result)
            .map_err(|e| LedgerError::InvalidResponse(format!("{action}: {e}")))
    }
}

/// Map a non-success HTTP status to an error.
///
/// The ledger refuses calls in the body's `error` field, never through the
/// status line, so no status is ever a [`LedgerError::Rejected`].
fn status_error(action: &str, status: reqwest::StatusCode) -> Option<LedgerError> {
    if status.is_success() {
        return None;
    }
    let message = format!("{action}: HTTP {status}");
    if status.is_server_error()
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status == reqwest::StatusCode::TOO_MANY_REQUESTS
    {
        Some(LedgerError::Transport(message))
    } else {
        Some(LedgerError::InvalidResponse(message))
    }
}

fn decode_candidate(raw: CandidateResult) -> Result<Candidate, LedgerError> {
    let id = CandidateId::new(raw.id).map_err(|e| LedgerError::InvalidResponse(e.to_string()))?;
    Ok(Candidate::new(id, raw.name, raw.vote_count))
}

/// Ledger call arguments for an action.
fn call_args(action: &ElectionAction) -> serde_json::Value {
    match action {
        ElectionAction::CastVote(id) => serde_json::json!([id.get()]),
        ElectionAction::AddCandidate(name) => serde_json::json!([name]),
        ElectionAction::StartElection | ElectionAction::EndElection => serde_json::json!([]),
    }
}

fn decode_receipt(receipt: SubmitResult) -> Result<TransactionOutcome, LedgerError> {
    match receipt.status.as_str() {
        "confirmed" => Ok(TransactionOutcome::Confirmed {
            tx_hash: receipt.tx_hash,
        }),
        "reverted" | "rejected" => Ok(TransactionOutcome::Rejected {
            reason: receipt
                .reason
                .unwrap_or_else(|| "transaction reverted".to_string()),
        }),
        other => Err(LedgerError::InvalidResponse(format!(
            "submit: unknown receipt status {other:?}"
        ))),
    }
}

impl LedgerGateway for RpcLedgerClient {
    async fn read_phase(&self) -> Result<ElectionPhase, LedgerError> {
        let res: PhaseResult = self
            .typed_call("election_phase", serde_json::json!({}))
            .await?;
        ElectionPhase::from_index(res.phase).map_err(|e| LedgerError::InvalidResponse(e.to_string()))
    }

    async fn read_administrator(&self) -> Result<Identity, LedgerError> {
        let res: AdminResult = self
            .typed_call("election_admin", serde_json::json!({}))
            .await?;
        Identity::parse(&res.admin).map_err(|e| LedgerError::InvalidResponse(e.to_string()))
    }

    async fn read_candidate_count(&self) -> Result<u64, LedgerError> {
        let res: CountResult = self
            .typed_call("candidates_count", serde_json::json!({}))
            .await?;
        Ok(res.count)
    }

    async fn read_candidate(&self, id: CandidateId) -> Result<Candidate, LedgerError> {
        let raw: CandidateResult = self
            .typed_call("candidate", serde_json::json!({ "id": id.get() }))
            .await?;
        let candidate = decode_candidate(raw)?;
        if candidate.id != id {
            return Err(LedgerError::InvalidResponse(format!(
                "asked for candidate {id}, got {}",
                candidate.id
            )));
        }
        Ok(candidate)
    }

    async fn read_has_voted(&self, identity: &Identity) -> Result<bool, LedgerError> {
        let res: VotedResult = self
            .typed_call(
                "has_voted",
                serde_json::json!({ "account": identity.as_str() }),
            )
            .await?;
        Ok(res.voted)
    }

    async fn read_winner(&self) -> Result<Candidate, LedgerError> {
        let raw: CandidateResult = self.typed_call("winner", serde_json::json!({})).await?;
        decode_candidate(raw)
    }

    async fn submit(
        &self,
        signer: &Identity,
        action: &ElectionAction,
    ) -> Result<TransactionOutcome, LedgerError> {
        let params = serde_json::json!({
            "signer": signer.as_str(),
            "call": action.call_name(),
            "args": call_args(action),
        });
        tracing::debug!(call = action.call_name(), signer = %signer.short(), "submitting transaction");
        match self.rpc_call("submit", params).await {
            Ok(result) => {
                let receipt: SubmitResult = serde_json::from_value(result)
                    .map_err(|e| LedgerError::InvalidResponse(format!("submit: {e}")))?;
                decode_receipt(receipt)
            }
            // The ledger refused outright, e.g. a failed `require`.
            Err(LedgerError::Rejected(reason)) => Ok(TransactionOutcome::Rejected { reason }),
            Err(e) => Err(e),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<LedgerNotification> {
        self.notifications.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_creation() {
        let client = RpcLedgerClient::new("http://127.0.0.1:8545").unwrap();
        assert_eq!(client.ledger_url(), "http://127.0.0.1:8545");
    }

    #[test]
    fn candidate_result_deserialization() {
        let json = r#"{"id": 2, "name": "Bob", "vote_count": 3}"#;
        let raw: CandidateResult = serde_json::from_str(json).unwrap();
        let candidate = decode_candidate(raw).unwrap();
        assert_eq!(candidate.id.get(), 2);
        assert_eq!(candidate.name, "Bob");
        assert_eq!(candidate.vote_count, 3);
    }

    #[test]
    fn zero_candidate_id_is_invalid_response() {
        let raw = CandidateResult {
            id: 0,
            name: "ghost".into(),
            vote_count: 0,
        };
        assert!(matches!(
            decode_candidate(raw),
            Err(LedgerError::InvalidResponse(_))
        ));
    }

    #[test]
    fn receipt_decoding() {
        let confirmed: SubmitResult =
            serde_json::from_str(r#"{"status": "confirmed", "tx_hash": "0xabc"}"#).unwrap();
        assert_eq!(
            decode_receipt(confirmed).unwrap(),
            TransactionOutcome::Confirmed {
                tx_hash: Some("0xabc".into())
            }
        );

        let reverted: SubmitResult =
            serde_json::from_str(r#"{"status": "reverted", "reason": "Already voted"}"#).unwrap();
        assert_eq!(
            decode_receipt(reverted).unwrap(),
            TransactionOutcome::Rejected {
                reason: "Already voted".into()
            }
        );

        let odd: SubmitResult = serde_json::from_str(r#"{"status": "pending"}"#).unwrap();
        assert!(decode_receipt(odd).is_err());
    }

    #[test]
    fn http_status_is_never_a_ledger_verdict() {
        use reqwest::StatusCode;
        assert!(status_error("phase", StatusCode::OK).is_none());
        assert!(matches!(
            status_error("submit", StatusCode::NOT_FOUND),
            Some(LedgerError::InvalidResponse(_))
        ));
        assert!(matches!(
            status_error("submit", StatusCode::METHOD_NOT_ALLOWED),
            Some(LedgerError::InvalidResponse(_))
        ));
        assert!(matches!(
            status_error("phase", StatusCode::BAD_GATEWAY),
            Some(LedgerError::Transport(_))
        ));
        assert!(matches!(
            status_error("phase", StatusCode::TOO_MANY_REQUESTS),
            Some(LedgerError::Transport(_))
        ));
    }

    #[test]
    fn call_args_per_action() {
        let vote = ElectionAction::CastVote(CandidateId::new(4).unwrap());
        assert_eq!(call_args(&vote), serde_json::json!([4]));
        assert_eq!(call_args(&ElectionAction::StartElection), serde_json::json!([]));
        assert_eq!(
            call_args(&ElectionAction::AddCandidate("Carol".into())),
            serde_json::json!(["Carol"])
        );
    }

    #[tokio::test]
    async fn unreachable_ledger_is_a_transport_error() {
        // Port 9 (discard) on localhost is essentially never listening.
        let client = RpcLedgerClient::with_timeout(
            "http://127.0.0.1:9",
            Duration::from_millis(500),
            DEFAULT_NOTIFICATION_CAPACITY,
        )
        .unwrap();
        let err = client.read_phase().await.unwrap_err();
        assert!(err.is_retryable(), "expected transport error, got {err:?}");
    }

    #[test]
    fn subscribers_see_published_notifications() {
        let client = RpcLedgerClient::new("http://127.0.0.1:8545").unwrap();
        let mut rx = client.subscribe();
        client
            .notifier()
            .send(LedgerNotification::VoteRecorded)
            .unwrap();
        assert_eq!(rx.try_recv().unwrap(), LedgerNotification::VoteRecorded);
    }
}
