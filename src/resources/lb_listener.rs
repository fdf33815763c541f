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

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tf_provider::value::{Value, ValueNumber, ValueString};
use tf_provider::{schema::{AttributeType, Schema}, map, AttributePath, Diagnostics};

use crate::api::lb::{CreateListenerRequest, CreateListenerResponse, UpdateListenerRequest};
use crate::api::{Client, Empty};
use crate::schema::{block_schema, computed, optional_computed, required};
use crate::utils::{number_or, str_or, unique_name, value_string};

use super::{computed_attributes, force_new, CloudResource};

const PROTOCOLS: &[&str] = &["http", "https", "tcp", "udp"];
const METHODS: &[&str] = &["roundrobin", "source", "consistent_hash", "weight_roundrobin", "leastconn"];

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct LbListenerState<'a> {
    #[serde(borrow = "'a")]
    pub id: ValueString<'a>,
    pub load_balancer_id: ValueString<'a>,
    pub name: ValueString<'a>,
    pub protocol: ValueString<'a>,
    pub listen_type: ValueString<'a>,
    pub port: ValueNumber,
    pub method: ValueString<'a>,
    pub idle_timeout: ValueNumber,
    pub persistence_type: ValueString<'a>,
    pub status: ValueString<'a>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LbListenerResource;

/// Default forwarding mode of a protocol
fn default_listen_type(protocol: &str) -> &'static str {
    match protocol {
        "http" | "https" => "RequestProxy",
        _ => "PacketsTransmit",
    }
}

/// Protocol names are lowercase in configuration and capitalized in the API
fn api_protocol(protocol: &str) -> String {
    match protocol {
        "http" | "https" | "tcp" | "udp" => protocol.to_uppercase(),
        other => other.to_owned(),
    }
}

fn api_method(method: &str) -> String {
    let mut chars = method.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[async_trait]
impl CloudResource for LbListenerResource {
    type State<'a> = LbListenerState<'a>;
    const KIND: &'static str = "load balancer listener";

    fn schema(&self) -> Schema {
        block_schema(
            "Listener of a load balancer",
            map! {
                "load_balancer_id" => required(AttributeType::String, "Load balancer owning the listener"),
                "name" => optional_computed(AttributeType::String, "Name of the listener"),
                "protocol" => required(AttributeType::String, "One of `http`, `https`, `tcp` or `udp`"),
                "listen_type" => optional_computed(AttributeType::String, "`RequestProxy` or `PacketsTransmit`, deduced from the protocol when unset"),
                "port" => optional_computed(AttributeType::Number, "Listening port (default 80)"),
                "method" => optional_computed(AttributeType::String, "Balancing method (default `roundrobin`)"),
                "idle_timeout" => optional_computed(AttributeType::Number, "Idle connection timeout in seconds (default 60)"),
                "persistence_type" => optional_computed(AttributeType::String, "Session persistence: `none`, `server_insert` or `user_defined`"),
                "status" => computed(AttributeType::String, "`available`, `unavailable` or `partial`"),
            },
        )
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, state: &Self::State<'a>) {
        if let Value::Value(protocol) = &state.protocol {
            if !PROTOCOLS.contains(&&**protocol) {
                diags.error(
                    "Invalid protocol",
                    format!("`{protocol}` is not one of {}", PROTOCOLS.join(", ")),
                    AttributePath::new("protocol"),
                );
            }
        }
        if let Value::Value(method) = &state.method {
            if !METHODS.contains(&&**method) {
                diags.error(
                    "Invalid balancing method",
                    format!("`{method}` is not one of {}", METHODS.join(", ")),
                    AttributePath::new("method"),
                );
            }
        }
        if let Value::Value(port) = &state.port {
            if !(1..=65535).contains(port) {
                diags.error_short("`port` must be between 1 and 65535", AttributePath::new("port"));
            }
        }
        if let Value::Value(timeout) = &state.idle_timeout {
            if !(0..=86400).contains(timeout) {
                diags.error_short(
                    "`idle_timeout` must be between 0 and 86400",
                    AttributePath::new("idle_timeout"),
                );
            }
        }
    }

    fn id<'s>(&self, state: &'s Self::State<'_>) -> &'s str {
        state.id.as_str()
    }

    fn set_id(&self, state: &mut Self::State<'_>, id: String) {
        state.id = value_string(id);
    }

    computed_attributes!(id, name, listen_type, port, method, idle_timeout, persistence_type, status);

    fn requires_replace<'a>(
        &self,
        prior: &Self::State<'a>,
        proposed: &Self::State<'a>,
    ) -> Vec<AttributePath> {
        force_new!(prior, proposed; load_balancer_id, protocol, listen_type)
    }

    async fn create<'a>(&self, client: &Client, planned: &Self::State<'a>) -> Result<String> {
        let protocol = planned.protocol.as_str();
        let response: CreateListenerResponse = client
            .invoke(
                "CreateListener",
                &CreateListenerRequest {
                    load_balancer_id: planned.load_balancer_id.as_str().to_owned(),
                    listener_name: planned
                        .name
                        .as_deref_option()
                        .map_or_else(|| unique_name("listener"), str::to_owned),
                    protocol: api_protocol(protocol),
                    listen_type: str_or(&planned.listen_type, default_listen_type(protocol)).to_owned(),
                    frontend_port: number_or(&planned.port, 80),
                    method: api_method(str_or(&planned.method, "roundrobin")),
                    client_timeout: number_or(&planned.idle_timeout, 60),
                    persistence_type: str_or(&planned.persistence_type, "none").to_owned(),
                },
            )
            .await?;
        Ok(response.listener_id)
    }

    async fn read<'a>(&self, client: &Client, mut state: Self::State<'a>) -> Result<Self::State<'a>> {
        let listener = client
            .describe_listener_by_id(state.load_balancer_id.as_str(), state.id.as_str())
            .await?;

        state.name = value_string(listener.name.as_str());
        state.protocol = value_string(listener.protocol.to_lowercase());
        state.listen_type = value_string(listener.listen_type.as_str());
        state.port = Value::Value(listener.frontend_port);
        state.method = value_string(listener.method.to_lowercase());
        state.idle_timeout = Value::Value(listener.client_timeout);
        state.persistence_type = value_string(listener.persistence_type.to_lowercase());
        state.status = value_string(listener.status_name());
        Ok(state)
    }

    async fn update<'a>(
        &self,
        client: &Client,
        _prior: &Self::State<'a>,
        planned: &Self::State<'a>,
    ) -> Result<()> {
        let _: Empty = client
            .invoke(
                "UpdateListenerAttribute",
                &UpdateListenerRequest {
                    load_balancer_id: planned.load_balancer_id.as_str().to_owned(),
                    listener_id: planned.id.as_str().to_owned(),
                    listener_name: planned.name.as_str().to_owned(),
                    frontend_port: number_or(&planned.port, 80),
                    method: api_method(str_or(&planned.method, "roundrobin")),
                    client_timeout: number_or(&planned.idle_timeout, 60),
                    persistence_type: str_or(&planned.persistence_type, "none").to_owned(),
                },
            )
            .await?;
        Ok(())
    }

    async fn delete<'a>(&self, client: &Client, state: &Self::State<'a>) -> Result<()> {
        let _: Empty = client
            .invoke(
                "DeleteListener",
                &serde_json::json!({
                    "LoadBalancerId": state.load_balancer_id.as_str(),
                    "ListenerId": state.id.as_str(),
                }),
            )
            .await?;
        Ok(())
    }

    /// Import ids are `<load_balancer_id>/<listener_id>`
    fn import<'a>(&self, id: &str) -> Result<Self::State<'a>> {
        let Some((lb_id, listener_id)) = id.split_once('/') else {
            bail!("invalid listener id `{id}`, expected `<load_balancer_id>/<listener_id>`");
        };
        if lb_id.is_empty() || listener_id.is_empty() {
            bail!("invalid listener id `{id}`, expected `<load_balancer_id>/<listener_id>`");
        }
        Ok(LbListenerState {
            id: value_string(listener_id),
            load_balancer_id: value_string(lb_id),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::api::fake::FakeCloud;

    #[tokio::test]
    async fn create_with_defaults() {
        let fake = FakeCloud::new();
        fake.respond("CreateListener", json!({"RetCode": 0, "ListenerId": "vserver-1"}));

        let planned = LbListenerState {
            load_balancer_id: value_string("ulb-1"),
            protocol: value_string("tcp"),
            port: Value::Value(443),
            ..Default::default()
        };
        let id = LbListenerResource.create(&fake.client(), &planned).await.unwrap();
        assert_eq!(id, "vserver-1");

        let call = &fake.calls("CreateListener")[0];
        assert_eq!(call["Protocol"], "TCP");
        assert_eq!(call["ListenType"], "PacketsTransmit");
        assert_eq!(call["FrontendPort"], "443");
        assert_eq!(call["Method"], "Roundrobin");
        assert_eq!(call["ClientTimeout"], "60");
    }

    #[tokio::test]
    async fn import_then_read() {
        let fake = FakeCloud::new();
        fake.respond(
            "DescribeLoadBalancer",
            json!({
                "RetCode": 0,
                "DataSet": [{
                    "LoadBalancerId": "ulb-1",
                    "ListenerSet": [{
                        "ListenerId": "vserver-1",
                        "Name": "web",
                        "Protocol": "HTTP",
                        "ListenType": "RequestProxy",
                        "FrontendPort": 80,
                        "Method": "Roundrobin",
                        "ClientTimeout": 60,
                        "PersistenceType": "None",
                        "Status": 0,
                    }],
                }],
            }),
        );

        let state = LbListenerResource.import("ulb-1/vserver-1").unwrap();
        let state = LbListenerResource.read(&fake.client(), state).await.unwrap();
        assert_eq!(state.protocol.as_str(), "http");
        assert_eq!(state.method.as_str(), "roundrobin");
        assert_eq!(state.persistence_type.as_str(), "none");
        assert_eq!(state.status.as_str(), "available");
        assert_eq!(state.port, Value::Value(80));
    }

    #[test]
    fn invalid_import_ids() {
        assert!(LbListenerResource.import("vserver-1").is_err());
        assert!(LbListenerResource.import("ulb-1/").is_err());
    }

    #[tokio::test]
    async fn validation() {
        let mut diags = Diagnostics::default();
        let state = LbListenerState {
            protocol: value_string("ftp"),
            method: value_string("random"),
            port: Value::Value(0),
            ..Default::default()
        };
        LbListenerResource.validate(&mut diags, &state).await;
        assert_eq!(diags.errors.len(), 3);
    }

    #[test]
    fn api_names() {
        assert_eq!(api_method("weight_roundrobin"), "Weight_roundrobin");
        assert_eq!(api_protocol("https"), "HTTPS");
        assert_eq!(default_listen_type("udp"), "PacketsTransmit");
    }
}
