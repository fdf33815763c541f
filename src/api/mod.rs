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

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value as Json;
use thiserror::Error;

pub mod compute;
pub mod db;
pub mod http;
pub mod iam;
pub mod lb;
pub mod network;
pub mod signer;
pub mod storage;

#[cfg(test)]
pub(crate) mod fake;

pub use http::{HttpTransport, TransportConfig};

/// Flattened request parameters, as sent on the wire
pub type Params = BTreeMap<String, String>;

/// Number of pages fetched concurrently by [`paginate`]
const PAGE_CONCURRENCY: usize = 4;

#[derive(Debug, Error)]
pub enum CloudError {
    #[error("{kind} `{id}` not found")]
    NotFound { kind: &'static str, id: String },
    #[error("`{action}` failed with code {code}: {message}")]
    Api {
        action: String,
        code: i64,
        message: String,
    },
    #[error("`{action}` request failed: {source}")]
    Transport {
        action: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("`{action}` returned HTTP status {status}")]
    Status { action: String, status: u16 },
    #[error("`{action}` returned an unexpected response: {source}")]
    Decode {
        action: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("`{action}` request is invalid: {message}")]
    InvalidRequest { action: String, message: String },
}

impl CloudError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether sending the same request again may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { source, .. } => {
                source.is_timeout() || source.is_connect() || source.is_request()
            }
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Check if any error in the chain is a not-found sentinel
pub fn is_not_found(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|e| e.downcast_ref::<CloudError>().is_some_and(CloudError::is_not_found))
}

/// Turn a not-found error into `None`, keeping every other error
pub fn not_found_as_none<T>(result: anyhow::Result<T>) -> anyhow::Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if is_not_found(&err) => Ok(None),
        Err(err) => Err(err),
    }
}

/// Vendor API seam: one signed call per action
#[async_trait]
pub trait CloudApi: Send + Sync + Debug {
    /// Send `action` with its flattened parameters and return the raw JSON response
    async fn call(&self, action: &str, params: Params) -> Result<Json, CloudError>;
}

#[derive(Debug, Clone)]
pub struct Client {
    api: Arc<dyn CloudApi>,
    region: String,
    project_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Envelope {
    #[serde(default)]
    ret_code: i64,
    #[serde(default)]
    message: String,
}

impl Client {
    pub fn new(api: Arc<dyn CloudApi>, region: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            api,
            region: region.into(),
            project_id: project_id.into(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Serialize `request`, send it as `action`, and decode the response
    pub async fn invoke<Req, Resp>(&self, action: &str, request: &Req) -> Result<Resp, CloudError>
    where
        Req: Serialize + Sync + ?Sized,
        Resp: DeserializeOwned,
    {
        let value = serde_json::to_value(request).map_err(|source| CloudError::Decode {
            action: action.to_owned(),
            source,
        })?;
        if !value.is_object() {
            return Err(CloudError::InvalidRequest {
                action: action.to_owned(),
                message: "request must serialize to an object".to_owned(),
            });
        }

        let mut params = flatten(&value);
        if !self.region.is_empty() {
            params
                .entry("Region".to_owned())
                .or_insert_with(|| self.region.clone());
        }
        if !self.project_id.is_empty() {
            params
                .entry("ProjectId".to_owned())
                .or_insert_with(|| self.project_id.clone());
        }

        log::debug!("calling `{action}` with {} parameters", params.len());
        let response = self.api.call(action, params).await?;

        let envelope: Envelope =
            Envelope::deserialize(&response).map_err(|source| CloudError::Decode {
                action: action.to_owned(),
                source,
            })?;
        if envelope.ret_code != 0 {
            log::debug!("`{action}` returned code {}", envelope.ret_code);
            return Err(CloudError::Api {
                action: action.to_owned(),
                code: envelope.ret_code,
                message: envelope.message,
            });
        }

        Resp::deserialize(response).map_err(|source| CloudError::Decode {
            action: action.to_owned(),
            source,
        })
    }
}

/// Flatten a JSON object into wire parameters
///
/// Nested arrays are expanded as `Key.N`, objects within arrays as `Key.N.Field`.
pub fn flatten(value: &Json) -> Params {
    let mut params = Params::new();
    if let Json::Object(fields) = value {
        for (key, value) in fields {
            flatten_into(&mut params, key.clone(), value);
        }
    }
    params
}

fn flatten_into(params: &mut Params, prefix: String, value: &Json) {
    match value {
        Json::Null => (),
        Json::Bool(b) => {
            params.insert(prefix, b.to_string());
        }
        Json::Number(n) => {
            params.insert(prefix, n.to_string());
        }
        Json::String(s) => {
            params.insert(prefix, s.clone());
        }
        Json::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                flatten_into(params, format!("{prefix}.{i}"), item);
            }
        }
        Json::Object(fields) => {
            for (key, item) in fields {
                flatten_into(params, format!("{prefix}.{key}"), item);
            }
        }
    }
}

/// Response carrying nothing but the return code
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Empty {}

/// One page of a describe call
#[derive(Debug, Clone, Default)]
pub struct Page<T> {
    pub total_count: usize,
    pub items: Vec<T>,
}

/// Fetch every page of a paginated describe
///
/// The first page gives the total count; remaining pages are fetched concurrently
/// and reassembled in offset order.
pub async fn paginate<T, F, Fut>(limit: usize, fetch: F) -> Result<Vec<T>, CloudError>
where
    F: Fn(usize, usize) -> Fut,
    Fut: Future<Output = Result<Page<T>, CloudError>>,
{
    let limit = limit.max(1);
    let first = fetch(0, limit).await?;
    let total = first.total_count;
    let mut items = first.items;
    if items.len() >= total {
        return Ok(items);
    }

    let offsets = (limit..total).step_by(limit);
    let mut pages = stream::iter(offsets.map(|offset| {
        let page = fetch(offset, limit);
        async move { page.await.map(|page| (offset, page.items)) }
    }))
    .buffer_unordered(PAGE_CONCURRENCY)
    .try_collect::<Vec<_>>()
    .await?;

    pages.sort_by_key(|(offset, _)| *offset);
    for (_, page) in pages {
        items.extend(page);
    }
    Ok(items)
}

/// Take the first element of a describe result set, or report it missing
pub(crate) fn first_or_not_found<T>(
    items: Vec<T>,
    kind: &'static str,
    id: &str,
) -> Result<T, CloudError> {
    items
        .into_iter()
        .next()
        .ok_or_else(|| CloudError::not_found(kind, id))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::fake::FakeCloud;
    use super::*;

    #[test]
    fn flatten_nested_values() {
        let params = flatten(&json!({
            "Name": "web",
            "Count": 2,
            "Enabled": true,
            "Skip": null,
            "Disks": [
                {"Type": "boot", "Size": 20},
                {"Type": "data", "Size": 100},
            ],
            "Ids": ["a", "b"],
        }));

        let expected: Params = [
            ("Count", "2"),
            ("Disks.0.Size", "20"),
            ("Disks.0.Type", "boot"),
            ("Disks.1.Size", "100"),
            ("Disks.1.Type", "data"),
            ("Enabled", "true"),
            ("Ids.0", "a"),
            ("Ids.1", "b"),
            ("Name", "web"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect();
        assert_eq!(params, expected);
    }

    #[tokio::test]
    async fn invoke_injects_region_and_project() {
        let fake = FakeCloud::new();
        fake.respond("DescribeVPC", json!({"RetCode": 0, "DataSet": []}));
        let client = fake.client();

        let _: Json = client
            .invoke("DescribeVPC", &json!({"Limit": 10}))
            .await
            .unwrap();

        let calls = fake.calls("DescribeVPC");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0]["Region"], "region-1");
        assert_eq!(calls[0]["ProjectId"], "project-1");
        assert_eq!(calls[0]["Limit"], "10");
    }

    #[tokio::test]
    async fn invoke_reports_api_errors() {
        let fake = FakeCloud::new();
        fake.respond(
            "DeleteVPC",
            json!({"RetCode": 8001, "Message": "vpc still has subnets"}),
        );
        let client = fake.client();

        let err = client
            .invoke::<_, Json>("DeleteVPC", &json!({"VPCId": "vpc-1"}))
            .await
            .unwrap_err();
        match err {
            CloudError::Api { code, message, .. } => {
                assert_eq!(code, 8001);
                assert_eq!(message, "vpc still has subnets");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn invoke_rejects_non_object_requests() {
        let client = FakeCloud::new().client();
        let err = client
            .invoke::<_, Json>("DescribeVPC", &["a", "b"])
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn paginate_keeps_offset_order() {
        let items = paginate(2, |offset, limit| async move {
            let items = (offset..(offset + limit).min(5)).collect::<Vec<_>>();
            Ok(Page {
                total_count: 5,
                items,
            })
        })
        .await
        .unwrap();
        assert_eq!(items, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn paginate_single_page() {
        let items = paginate(10, |_, _| async move {
            Ok(Page {
                total_count: 1,
                items: vec!["only"],
            })
        })
        .await
        .unwrap();
        assert_eq!(items, vec!["only"]);
    }

    #[test]
    fn not_found_detection_through_context() {
        let err = anyhow::Error::from(CloudError::not_found("disk", "disk-1"))
            .context("Failed to read disk");
        assert!(is_not_found(&err));
        assert!(not_found_as_none::<()>(Err(err)).unwrap().is_none());

        let err = anyhow::Error::from(CloudError::Status {
            action: "DescribeDisk".to_owned(),
            status: 502,
        });
        assert!(!is_not_found(&err));
        assert!(not_found_as_none::<()>(Err(err)).is_err());
    }
}
