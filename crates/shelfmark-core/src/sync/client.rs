//! HTTP client for the remote reading service.
//!
//! The orchestrator only sees [`RemoteSyncClient`]; tests substitute a
//! stub. [`HttpSyncClient`] is a synchronous wrapper over async reqwest,
//! driving its own current-thread runtime the way the rest of the sync
//! layer expects: one outstanding call at a time.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde_json::json;
use tracing::debug;

use super::types::{PushOutcome, RejectReason, SyncError};

/// Header carrying the per-record idempotency key. The remote treats a
/// repeated key as a no-op rather than a duplicate create.
const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECTIVITY_TIMEOUT: Duration = Duration::from_secs(5);

/// Logical operations the sync engine performs against the remote.
pub trait RemoteSyncClient: Send + Sync {
    /// Checked once per pass, before any candidate is attempted.
    fn check_connectivity(&self) -> bool;

    fn create_session_ping(
        &self,
        idempotency_key: &str,
        reading_remote_id: &str,
        progress_fraction: f64,
        duration_seconds: u64,
        occurred_at: DateTime<Utc>,
    ) -> PushOutcome;

    fn create_highlight(
        &self,
        idempotency_key: &str,
        reading_remote_id: &str,
        content: &str,
        position: &str,
        occurred_at: DateTime<Utc>,
    ) -> PushOutcome;

    fn delete_highlight(&self, remote_id: &str) -> PushOutcome;
}

/// reqwest-backed client for the hosted service.
pub struct HttpSyncClient {
    base_url: String,
    token: String,
    http: reqwest::Client,
    runtime: tokio::runtime::Runtime,
}

impl HttpSyncClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self, SyncError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            http,
            runtime,
        })
    }

    fn post_create(&self, path: &str, idempotency_key: &str, body: serde_json::Value) -> PushOutcome {
        let url = format!("{}{}", self.base_url, path);
        self.runtime.block_on(async {
            let response = self
                .http
                .post(&url)
                .bearer_auth(&self.token)
                .header(IDEMPOTENCY_HEADER, idempotency_key)
                .json(&body)
                .send()
                .await;
            let response = match response {
                Ok(r) => r,
                Err(e) => return PushOutcome::Transient(e.to_string()),
            };
            let status = response.status();
            let remote_id = if status.is_success() {
                response
                    .json::<serde_json::Value>()
                    .await
                    .ok()
                    .and_then(|v| v["id"].as_str().map(str::to_string))
            } else {
                None
            };
            classify(status, remote_id)
        })
    }
}

impl RemoteSyncClient for HttpSyncClient {
    fn check_connectivity(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        let reachable = self.runtime.block_on(async {
            self.http
                .get(&url)
                .timeout(CONNECTIVITY_TIMEOUT)
                .send()
                .await
                .is_ok()
        });
        debug!(reachable, "connectivity check");
        reachable
    }

    fn create_session_ping(
        &self,
        idempotency_key: &str,
        reading_remote_id: &str,
        progress_fraction: f64,
        duration_seconds: u64,
        occurred_at: DateTime<Utc>,
    ) -> PushOutcome {
        self.post_create(
            &format!("/v1/readings/{reading_remote_id}/sessions"),
            idempotency_key,
            json!({
                "duration_seconds": duration_seconds,
                "progress_fraction": progress_fraction,
                "occurred_at": occurred_at.to_rfc3339(),
            }),
        )
    }

    fn create_highlight(
        &self,
        idempotency_key: &str,
        reading_remote_id: &str,
        content: &str,
        position: &str,
        occurred_at: DateTime<Utc>,
    ) -> PushOutcome {
        self.post_create(
            &format!("/v1/readings/{reading_remote_id}/highlights"),
            idempotency_key,
            json!({
                "content": content,
                "position": position,
                "occurred_at": occurred_at.to_rfc3339(),
            }),
        )
    }

    fn delete_highlight(&self, remote_id: &str) -> PushOutcome {
        let url = format!("{}/v1/highlights/{remote_id}", self.base_url);
        let status = self.runtime.block_on(async {
            self.http
                .delete(&url)
                .bearer_auth(&self.token)
                .send()
                .await
                .map(|r| r.status())
        });
        match status {
            // A delete finding nothing has already reached its goal state.
            Ok(s) if s == StatusCode::NOT_FOUND || s == StatusCode::GONE => {
                PushOutcome::Accepted { remote_id: None }
            }
            Ok(s) => classify(s, None),
            Err(e) => PushOutcome::Transient(e.to_string()),
        }
    }
}

/// The single place an HTTP status becomes a push outcome.
///
/// 409 means the remote saw this idempotency key before: the earlier
/// create won, so the local record is as synced as it will ever be.
/// Anything that is neither success nor a recognized permanent refusal is
/// transient -- a misbehaving proxy must not strand records in
/// NeedsReconnect.
fn classify(status: StatusCode, remote_id: Option<String>) -> PushOutcome {
    if status.is_success() || status == StatusCode::CONFLICT {
        PushOutcome::Accepted { remote_id }
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        PushOutcome::Rejected(RejectReason::Unauthorized)
    } else if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
        PushOutcome::Rejected(RejectReason::Gone)
    } else {
        PushOutcome::Transient(format!("unexpected status {status}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(server: &mockito::Server) -> HttpSyncClient {
        HttpSyncClient::new(&server.url(), "test-token").unwrap()
    }

    #[test]
    fn classify_table() {
        use PushOutcome::*;
        assert_eq!(
            classify(StatusCode::CREATED, Some("r-1".into())),
            Accepted {
                remote_id: Some("r-1".into())
            }
        );
        assert_eq!(
            classify(StatusCode::CONFLICT, None),
            Accepted { remote_id: None }
        );
        assert_eq!(
            classify(StatusCode::UNAUTHORIZED, None),
            Rejected(RejectReason::Unauthorized)
        );
        assert_eq!(
            classify(StatusCode::FORBIDDEN, None),
            Rejected(RejectReason::Unauthorized)
        );
        assert_eq!(
            classify(StatusCode::NOT_FOUND, None),
            Rejected(RejectReason::Gone)
        );
        assert_eq!(classify(StatusCode::GONE, None), Rejected(RejectReason::Gone));
        assert!(matches!(
            classify(StatusCode::INTERNAL_SERVER_ERROR, None),
            Transient(_)
        ));
        // Unrecognized 4xx stays retryable.
        assert!(matches!(
            classify(StatusCode::TOO_MANY_REQUESTS, None),
            Transient(_)
        ));
    }

    #[test]
    fn create_highlight_returns_remote_id() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/v1/readings/rem-1/highlights")
            .match_header("idempotency-key", "key-1")
            .match_header("authorization", "Bearer test-token")
            .with_status(201)
            .with_body(r#"{"id":"hl-9"}"#)
            .create();

        let outcome = client(&server).create_highlight("key-1", "rem-1", "text", "p. 1", Utc::now());
        assert_eq!(
            outcome,
            PushOutcome::Accepted {
                remote_id: Some("hl-9".into())
            }
        );
        mock.assert();
    }

    #[test]
    fn session_ping_classifies_gone() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/v1/readings/rem-404/sessions")
            .with_status(404)
            .create();

        let outcome =
            client(&server).create_session_ping("key-1", "rem-404", 0.5, 600, Utc::now());
        assert_eq!(outcome, PushOutcome::Rejected(RejectReason::Gone));
    }

    #[test]
    fn duplicate_key_conflict_is_accepted() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/v1/readings/rem-1/sessions")
            .with_status(409)
            .create();

        let outcome = client(&server).create_session_ping("key-1", "rem-1", 0.5, 600, Utc::now());
        assert_eq!(outcome, PushOutcome::Accepted { remote_id: None });
    }

    #[test]
    fn server_error_is_transient() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/v1/readings/rem-1/sessions")
            .with_status(503)
            .create();

        let outcome = client(&server).create_session_ping("key-1", "rem-1", 0.5, 600, Utc::now());
        assert!(matches!(outcome, PushOutcome::Transient(_)));
    }

    #[test]
    fn transport_error_is_transient() {
        // Nothing listens here.
        let client = HttpSyncClient::new("http://127.0.0.1:1", "tok").unwrap();
        let outcome = client.create_session_ping("key-1", "rem-1", 0.5, 600, Utc::now());
        assert!(matches!(outcome, PushOutcome::Transient(_)));
        assert!(!client.check_connectivity());
    }

    #[test]
    fn delete_of_missing_highlight_is_accepted() {
        let mut server = mockito::Server::new();
        server
            .mock("DELETE", "/v1/highlights/hl-1")
            .with_status(404)
            .create();

        let outcome = client(&server).delete_highlight("hl-1");
        assert_eq!(outcome, PushOutcome::Accepted { remote_id: None });
    }

    #[test]
    fn connectivity_check_hits_health() {
        let mut server = mockito::Server::new();
        let mock = server.mock("GET", "/health").with_status(200).create();

        assert!(client(&server).check_connectivity());
        mock.assert();
    }
}
