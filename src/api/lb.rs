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

use serde::{Deserialize, Serialize};

use super::{first_or_not_found, Client, CloudError};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LoadBalancer {
    pub load_balancer_id: String,
    pub name: String,
    pub tag: String,
    pub remark: String,
    pub network_mode: String,
    #[serde(rename = "VPCId")]
    pub vpc_id: String,
    pub subnet_id: String,
    pub private_ip: String,
    pub charge_type: String,
    pub listener_set: Vec<Listener>,
    pub create_time: i64,
    pub expire_time: i64,
}

impl LoadBalancer {
    pub fn is_internal(&self) -> bool {
        self.network_mode == "Inner"
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Listener {
    pub listener_id: String,
    pub name: String,
    pub protocol: String,
    pub listen_type: String,
    pub frontend_port: i64,
    pub method: String,
    pub client_timeout: i64,
    pub persistence_type: String,
    pub status: i64,
}

impl Listener {
    pub fn status_name(&self) -> &'static str {
        match self.status {
            0 => "available",
            1 => "unavailable",
            2 => "partial",
            _ => "unknown",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateLoadBalancerRequest {
    pub name: String,
    pub tag: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub remark: String,
    pub outer_mode: String,
    pub inner_mode: String,
    #[serde(rename = "VPCId", skip_serializing_if = "String::is_empty")]
    pub vpc_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub subnet_id: String,
    pub charge_type: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CreateLoadBalancerResponse {
    pub load_balancer_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DescribeLoadBalancerResponse {
    pub total_count: usize,
    pub data_set: Vec<LoadBalancer>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateListenerRequest {
    pub load_balancer_id: String,
    pub listener_name: String,
    pub protocol: String,
    pub listen_type: String,
    pub frontend_port: i64,
    pub method: String,
    pub client_timeout: i64,
    pub persistence_type: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CreateListenerResponse {
    pub listener_id: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateListenerRequest {
    pub load_balancer_id: String,
    pub listener_id: String,
    pub listener_name: String,
    pub frontend_port: i64,
    pub method: String,
    pub client_timeout: i64,
    pub persistence_type: String,
}

impl Client {
    pub async fn describe_lb_by_id(&self, id: &str) -> Result<LoadBalancer, CloudError> {
        if id.is_empty() {
            return Err(CloudError::not_found("load balancer", id));
        }
        let response: DescribeLoadBalancerResponse = self
            .invoke(
                "DescribeLoadBalancer",
                &serde_json::json!({ "LoadBalancerId": id, "Offset": 0, "Limit": 1 }),
            )
            .await?;
        first_or_not_found(response.data_set, "load balancer", id)
    }

    pub async fn describe_listener_by_id(
        &self,
        lb_id: &str,
        listener_id: &str,
    ) -> Result<Listener, CloudError> {
        let lb = self.describe_lb_by_id(lb_id).await.map_err(|err| {
            if err.is_not_found() {
                CloudError::not_found("listener", listener_id)
            } else {
                err
            }
        })?;
        let listeners = lb
            .listener_set
            .into_iter()
            .filter(|listener| listener.listener_id == listener_id)
            .collect();
        first_or_not_found(listeners, "listener", listener_id)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::api::fake::FakeCloud;

    #[tokio::test]
    async fn describe_listener_among_siblings() {
        let fake = FakeCloud::new();
        fake.respond(
            "DescribeLoadBalancer",
            json!({
                "RetCode": 0,
                "DataSet": [{
                    "LoadBalancerId": "ulb-1",
                    "ListenerSet": [
                        {"ListenerId": "vserver-1", "FrontendPort": 80},
                        {"ListenerId": "vserver-2", "FrontendPort": 443, "Status": 2},
                    ],
                }],
            }),
        );

        let listener = fake
            .client()
            .describe_listener_by_id("ulb-1", "vserver-2")
            .await
            .unwrap();
        assert_eq!(listener.frontend_port, 443);
        assert_eq!(listener.status_name(), "partial");

        let err = fake
            .client()
            .describe_listener_by_id("ulb-1", "vserver-3")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn listener_of_missing_lb() {
        let fake = FakeCloud::new();
        fake.respond("DescribeLoadBalancer", json!({"RetCode": 0, "DataSet": []}));

        let err = fake
            .client()
            .describe_listener_by_id("ulb-1", "vserver-1")
            .await
            .unwrap_err();
        match err {
            CloudError::NotFound { kind, id } => {
                assert_eq!(kind, "listener");
                assert_eq!(id, "vserver-1");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
