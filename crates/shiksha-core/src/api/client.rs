//! Typed client for the Shiksha Leap JSON API.
//!
//! Requests go through a `Fetcher`, normally the cache layer, so API calls
//! made while offline come back as `ApiError::Offline` instead of hanging.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::ApiError;
use crate::models::SyncableRecord;
use crate::worker::{FetchError, Fetcher, Request, Response};

// ============================================================================
// Constants
// ============================================================================

const SEND_CODE_PATH: &str = "/api/send-code";
const VERIFY_CODE_PATH: &str = "/api/verify-code";
const SYNC_OFFLINE_DATA_PATH: &str = "/api/sync-offline-data";
const ACHIEVEMENTS_PATH: &str = "/api/achievements";

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Successful verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct VerifyResponse {
    pub redirect: String,
    #[serde(default)]
    pub new_user: bool,
}

/// Acknowledgement carrying an optional human-readable message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct MessageResponse {
    #[serde(default)]
    pub message: Option<String>,
}

/// API client for the Shiksha Leap server.
/// Clone is cheap - the fetcher is shared.
#[derive(Clone)]
pub struct ApiClient {
    fetcher: Arc<dyn Fetcher>,
    base: Url,
}

impl ApiClient {
    pub fn new(fetcher: Arc<dyn Fetcher>, base: Url) -> Self {
        Self { fetcher, base }
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base
            .join(path)
            .map_err(|e| FetchError::InvalidRequest(format!("{}: {}", path, e)).into())
    }

    // ===== Auth =====

    /// Ask the server to send a one-time code to `contact`.
    pub async fn send_code(&self, contact: &str) -> Result<MessageResponse, ApiError> {
        self.post(SEND_CODE_PATH, &json!({ "contact": contact })).await
    }

    pub async fn verify_code(&self, contact: &str, code: &str) -> Result<VerifyResponse, ApiError> {
        self.post(VERIFY_CODE_PATH, &json!({ "contact": contact, "code": code }))
            .await
    }

    // ===== Sync =====

    /// Submit game logs in one batch.
    pub async fn sync_offline_data(
        &self,
        records: &[SyncableRecord],
    ) -> Result<MessageResponse, ApiError> {
        let logs: Vec<_> = records.iter().map(SyncableRecord::to_wire).collect();
        debug!(count = logs.len(), "Submitting offline game logs");
        self.post(SYNC_OFFLINE_DATA_PATH, &json!({ "logs": logs })).await
    }

    pub async fn post_achievement(
        &self,
        record: &SyncableRecord,
    ) -> Result<MessageResponse, ApiError> {
        self.post(ACHIEVEMENTS_PATH, &record.to_wire()).await
    }

    // ===== Transport =====

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let request = Request::post_json(self.endpoint(path)?, body)?
            .with_header("accept", "application/json");
        self.execute(request).await
    }

    async fn execute<T: DeserializeOwned>(&self, request: Request) -> Result<T, ApiError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self.fetcher.fetch(request.clone()).await?;

            match Self::check_response_for_retry(response)? {
                Some(response) => return Self::parse(&request, &response),
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(
                        url = %request.url,
                        retry = retries,
                        backoff_ms,
                        "Rate limited, backing off"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                }
            }
        }
    }

    /// Ok(Some) on success, Ok(None) when rate limited (retry), Err otherwise.
    fn check_response_for_retry(response: Response) -> Result<Option<Response>, ApiError> {
        if response.ok() {
            Ok(Some(response))
        } else if response.status == 429 {
            Ok(None)
        } else if response.is_offline_payload() {
            Err(ApiError::Offline)
        } else {
            Err(ApiError::from_status(response.status, &response.text()))
        }
    }

    fn parse<T: DeserializeOwned>(request: &Request, response: &Response) -> Result<T, ApiError> {
        let body: &[u8] = if response.body.is_empty() { b"{}" } else { &response.body };
        serde_json::from_slice(body).map_err(|e| {
            ApiError::InvalidResponse(format!(
                "Failed to parse JSON response from {}: {}",
                request.url, e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays queued responses and records every request.
    #[derive(Default)]
    struct Scripted {
        responses: Mutex<VecDeque<Result<Response, FetchError>>>,
        requests: Mutex<Vec<Request>>,
    }

    impl Scripted {
        fn new(responses: Vec<Result<Response, FetchError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::default(),
            })
        }

        fn requests(&self) -> Vec<Request> {
            self.requests.lock().expect("requests lock").clone()
        }
    }

    #[async_trait]
    impl Fetcher for Scripted {
        async fn fetch(&self, request: Request) -> Result<Response, FetchError> {
            self.requests.lock().expect("requests lock").push(request);
            self.responses
                .lock()
                .expect("responses lock")
                .pop_front()
                .unwrap_or_else(|| Err(FetchError::Network("no scripted response".to_string())))
        }
    }

    fn client(fetcher: Arc<Scripted>) -> ApiClient {
        ApiClient::new(fetcher, Url::parse("https://shiksha.test").expect("base"))
    }

    #[tokio::test]
    async fn test_verify_code_parses_redirect() {
        let fetcher = Scripted::new(vec![Ok(Response::new(
            200,
            r#"{"redirect": "/registration", "new_user": true}"#,
        ))]);
        let api = client(Arc::clone(&fetcher));

        let verified = api.verify_code("9876543210", "123456").await.expect("verify");
        assert_eq!(verified.redirect, "/registration");
        assert!(verified.new_user);

        let sent = &fetcher.requests()[0];
        assert_eq!(sent.url.path(), "/api/verify-code");
        let body: serde_json::Value = serde_json::from_slice(&sent.body).expect("json");
        assert_eq!(body, json!({"contact": "9876543210", "code": "123456"}));
    }

    #[tokio::test]
    async fn test_rejection_carries_server_message() {
        let rejection = Response::new(400, r#"{"error": "Invalid or expired OTP"}"#);
        let fetcher = Scripted::new(vec![Ok(rejection)]);
        let err = client(fetcher).verify_code("a@b.com", "000000").await.expect_err("rejected");
        assert!(matches!(err, ApiError::Rejected(ref m) if m == "Invalid or expired OTP"));
    }

    #[tokio::test]
    async fn test_offline_payload_maps_to_offline() {
        let fetcher = Scripted::new(vec![Ok(Response::offline_api())]);
        let err = client(fetcher).send_code("a@b.com").await.expect_err("offline");
        assert!(matches!(err, ApiError::Offline));
    }

    #[tokio::test]
    async fn test_empty_success_body_is_accepted() {
        let fetcher = Scripted::new(vec![Ok(Response::new(200, ""))]);
        let ack = client(fetcher).send_code("a@b.com").await.expect("ack");
        assert_eq!(ack, MessageResponse::default());
    }

    #[tokio::test]
    async fn test_sync_offline_data_sends_flattened_logs() {
        let ack = Response::new(200, r#"{"message": "Synced 1 logs successfully"}"#);
        let fetcher = Scripted::new(vec![Ok(ack)]);
        let api = client(Arc::clone(&fetcher));

        let mut record = SyncableRecord::new("s1", json!({"game_id": "odia_game1", "score": 4}), 0);
        record.id = Some(7);
        api.sync_offline_data(&[record]).await.expect("sync");

        let body: serde_json::Value =
            serde_json::from_slice(&fetcher.requests()[0].body).expect("json");
        assert_eq!(body["logs"][0]["game_id"], "odia_game1");
        assert_eq!(body["logs"][0]["id"], 7);
        assert_eq!(body["logs"][0]["studentId"], "s1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_retries_then_succeeds() {
        let fetcher = Scripted::new(vec![
            Ok(Response::new(429, "")),
            Ok(Response::new(429, "")),
            Ok(Response::new(200, "{}")),
        ]);
        let api = client(Arc::clone(&fetcher));
        api.send_code("a@b.com").await.expect("eventually succeeds");
        assert_eq!(fetcher.requests().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_gives_up() {
        let fetcher = Scripted::new((0..5).map(|_| Ok(Response::new(429, ""))).collect());
        let api = client(Arc::clone(&fetcher));
        assert!(matches!(api.send_code("a@b.com").await, Err(ApiError::RateLimited)));
        assert_eq!(fetcher.requests().len(), MAX_RATE_LIMIT_RETRIES as usize + 1);
    }

    #[tokio::test]
    async fn test_network_failure_is_reported() {
        let fetcher = Scripted::new(vec![Err(FetchError::Timeout(Duration::from_secs(30)))]);
        let err = client(fetcher).send_code("a@b.com").await.expect_err("timeout");
        assert!(err.is_offline());
    }
}
