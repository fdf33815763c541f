// This file is part of the terraform-provider-cloud project
//
// Copyright (C) ANEO, 2024-2024. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License")
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::{thread_rng, Rng};
use serde_json::Value as Json;

use super::signer::{sign, SIGNATURE_KEY};
use super::{CloudApi, CloudError, Params};

const USER_AGENT: &str = concat!("terraform-provider-cloud/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Default)]
pub struct TransportConfig {
    pub base_url: String,
    pub public_key: String,
    pub private_key: String,
    pub max_retries: u32,
    pub insecure: bool,
}

/// Signed JSON-over-HTTP transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
    public_key: String,
    private_key: String,
    max_retries: u32,
}

impl HttpTransport {
    pub fn new(config: TransportConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(config.insecure)
            .build()
            .context("Could not build HTTP client")?;

        Ok(Self {
            http,
            base_url: config.base_url,
            public_key: config.public_key,
            private_key: config.private_key,
            max_retries: config.max_retries,
        })
    }

    async fn send(&self, action: &str, params: &Params) -> Result<Json, CloudError> {
        let response = self
            .http
            .post(&self.base_url)
            .json(params)
            .send()
            .await
            .map_err(|source| CloudError::Transport {
                action: action.to_owned(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CloudError::Status {
                action: action.to_owned(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|source| CloudError::Transport {
            action: action.to_owned(),
            source,
        })?;
        serde_json::from_slice(&body).map_err(|source| CloudError::Decode {
            action: action.to_owned(),
            source,
        })
    }
}

/// Jittered exponential backoff for the given retry attempt (0-based)
pub(super) fn backoff(attempt: u32) -> Duration {
    let exp = BACKOFF_BASE.saturating_mul(1 << attempt.min(8));
    let capped = exp.min(BACKOFF_CAP);
    let jitter = thread_rng().gen_range(0.5..=1.0);
    capped.mul_f64(jitter)
}

#[async_trait]
impl CloudApi for HttpTransport {
    async fn call(&self, action: &str, mut params: Params) -> Result<Json, CloudError> {
        params.insert("Action".to_owned(), action.to_owned());
        params.insert("PublicKey".to_owned(), self.public_key.clone());
        params.remove(SIGNATURE_KEY);
        let signature = sign(&params, &self.private_key);
        params.insert(SIGNATURE_KEY.to_owned(), signature);

        let mut attempt = 0;
        loop {
            match self.send(action, &params).await {
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    let delay = backoff(attempt);
                    attempt += 1;
                    log::warn!(
                        "`{action}` failed ({err}), retrying in {}ms ({attempt}/{})",
                        delay.as_millis(),
                        self.max_retries
                    );
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::{http::StatusCode, routing::post, Router};
    use serde_json::json;

    use super::*;

    /// Local API answering each request with the next status of `statuses`
    ///
    /// The last status repeats. Successful answers carry `body`.
    async fn api(statuses: &[u16], body: &'static str) -> (HttpTransport, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let statuses = statuses.to_vec();
        let app = Router::new().route(
            "/",
            post(move || {
                let counter = counter.clone();
                let statuses = statuses.clone();
                async move {
                    let hit = counter.fetch_add(1, Ordering::SeqCst);
                    let status = statuses.get(hit).or(statuses.last()).copied().unwrap_or(200);
                    (StatusCode::from_u16(status).unwrap(), body)
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let transport = HttpTransport::new(TransportConfig {
            base_url: format!("http://{addr}/"),
            public_key: "pub".to_owned(),
            private_key: "secret".to_owned(),
            max_retries: 2,
            insecure: false,
        })
        .unwrap();
        (transport, hits)
    }

    #[tokio::test]
    async fn server_errors_are_retried() {
        let (transport, hits) = api(&[503, 200], r#"{"RetCode": 0}"#).await;
        let response = transport.call("DescribeVPC", Params::new()).await.unwrap();
        assert_eq!(response, json!({"RetCode": 0}));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let (transport, hits) = api(&[403], "").await;
        let err = transport.call("DescribeVPC", Params::new()).await.unwrap_err();
        assert!(matches!(err, CloudError::Status { status: 403, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_are_capped() {
        let (transport, hits) = api(&[429], "").await;
        let err = transport.call("DescribeVPC", Params::new()).await.unwrap_err();
        assert!(matches!(err, CloudError::Status { status: 429, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let (transport, hits) = api(&[200], "<html>maintenance</html>").await;
        let err = transport.call("DescribeVPC", Params::new()).await.unwrap_err();
        assert!(matches!(err, CloudError::Decode { .. }));
        assert!(!err.is_retryable());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_stays_within_bounds() {
        for attempt in 0..12 {
            let delay = backoff(attempt);
            let ceiling = BACKOFF_BASE.saturating_mul(1 << attempt.min(8)).min(BACKOFF_CAP);
            assert!(delay <= ceiling, "attempt {attempt}: {delay:?} > {ceiling:?}");
            assert!(delay >= ceiling / 2, "attempt {attempt}: {delay:?} too short");
        }
    }

    #[test]
    fn status_retryability() {
        let status = |status| CloudError::Status {
            action: "DescribeVPC".to_owned(),
            status,
        };
        assert!(status(503).is_retryable());
        assert!(status(429).is_retryable());
        assert!(!status(403).is_retryable());
        assert!(!CloudError::not_found("vpc", "vpc-1").is_retryable());
    }

    #[test]
    fn build_transport() {
        let transport = HttpTransport::new(TransportConfig {
            base_url: "https://api.example.invalid".to_owned(),
            public_key: "pub".to_owned(),
            private_key: "secret".to_owned(),
            max_retries: 2,
            insecure: false,
        })
        .unwrap();
        assert_eq!(transport.max_retries, 2);
        assert_eq!(transport.base_url, "https://api.example.invalid");
    }
}
