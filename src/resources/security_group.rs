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
use tf_provider::value::{Value, ValueString};
use tf_provider::{schema::{AttributeType, Schema}, map, AttributePath, Diagnostics};

use crate::api::network::{CreateFirewallRequest, CreateFirewallResponse, FirewallRule};
use crate::api::{Client, Empty};
use crate::schema::{block_schema, computed, optional_computed, required, string_list};
use crate::utils::{format_timestamp, known_strings, str_or, unique_name, value_list, value_string};

use super::{computed_attributes, CloudResource};

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityGroupState<'a> {
    #[serde(borrow = "'a")]
    pub id: ValueString<'a>,
    pub name: ValueString<'a>,
    pub rules: Value<Vec<ValueString<'a>>>,
    pub tag: ValueString<'a>,
    pub remark: ValueString<'a>,
    pub create_time: ValueString<'a>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SecurityGroupResource;

/// Normalized rules, or the first rule that does not parse
fn parse_rules(rules: &[String]) -> Result<Vec<String>> {
    rules
        .iter()
        .map(|rule| match FirewallRule::parse(rule) {
            Some(rule) => Ok(rule.to_string()),
            None => bail!("invalid rule `{rule}`"),
        })
        .collect()
}

/// Rules reported by the API, keeping the configured spelling of equivalent rules
fn current_rules(configured: &[String], current: &[FirewallRule]) -> Vec<String> {
    current
        .iter()
        .enumerate()
        .map(|(i, rule)| {
            let rule = FirewallRule::parse(&rule.to_string()).unwrap_or_else(|| rule.clone());
            match configured.get(i) {
                Some(text) if FirewallRule::parse(text).as_ref() == Some(&rule) => text.clone(),
                _ => rule.to_string(),
            }
        })
        .collect()
}

#[async_trait]
impl CloudResource for SecurityGroupResource {
    type State<'a> = SecurityGroupState<'a>;
    const KIND: &'static str = "security group";

    fn schema(&self) -> Schema {
        block_schema(
            "Firewall applied to instances",
            map! {
                "name" => optional_computed(AttributeType::String, "Name of the security group"),
                "rules" => required(
                    string_list(),
                    "Rules formatted as `PROTOCOL|PORT|SOURCE_CIDR|ACCEPT or DROP|HIGH, MEDIUM or LOW`",
                ),
                "tag" => optional_computed(AttributeType::String, "Business group (default `Default`)"),
                "remark" => optional_computed(AttributeType::String, "Free-form remark"),
                "create_time" => computed(AttributeType::String, "Creation time (RFC 3339)"),
            },
        )
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, state: &Self::State<'a>) {
        let Value::Value(rules) = &state.rules else {
            return;
        };
        if rules.is_empty() {
            diags.error_short("At least one rule is required", AttributePath::new("rules"));
        }
        for (i, rule) in rules.iter().enumerate() {
            if let Value::Value(rule) = rule {
                if FirewallRule::parse(rule).is_none() {
                    diags.error(
                        "Invalid security group rule",
                        format!("`{rule}` does not match `PROTOCOL|PORT|SOURCE_CIDR|ACTION|PRIORITY`"),
                        AttributePath::new("rules").index(i as i64),
                    );
                }
            }
        }
    }

    fn id<'s>(&self, state: &'s Self::State<'_>) -> &'s str {
        state.id.as_str()
    }

    fn set_id(&self, state: &mut Self::State<'_>, id: String) {
        state.id = value_string(id);
    }

    computed_attributes!(id, name, tag, remark, create_time);

    fn requires_replace<'a>(
        &self,
        _prior: &Self::State<'a>,
        _proposed: &Self::State<'a>,
    ) -> Vec<AttributePath> {
        Vec::new()
    }

    async fn create<'a>(&self, client: &Client, planned: &Self::State<'a>) -> Result<String> {
        let response: CreateFirewallResponse = client
            .invoke(
                "CreateFirewall",
                &CreateFirewallRequest {
                    name: planned
                        .name
                        .as_deref_option()
                        .map_or_else(|| unique_name("firewall"), str::to_owned),
                    rule: parse_rules(&known_strings(&planned.rules))?,
                    tag: str_or(&planned.tag, "Default").to_owned(),
                    remark: planned.remark.as_str().to_owned(),
                },
            )
            .await?;
        Ok(response.fw_id)
    }

    async fn read<'a>(&self, client: &Client, mut state: Self::State<'a>) -> Result<Self::State<'a>> {
        let firewall = client.describe_firewall_by_id(state.id.as_str()).await?;

        state.name = value_string(firewall.name);
        state.rules = value_list(current_rules(&known_strings(&state.rules), &firewall.rule));
        state.tag = value_string(firewall.tag);
        state.remark = value_string(firewall.remark);
        state.create_time = value_string(format_timestamp(firewall.create_time));
        Ok(state)
    }

    async fn update<'a>(
        &self,
        client: &Client,
        prior: &Self::State<'a>,
        planned: &Self::State<'a>,
    ) -> Result<()> {
        let id = planned.id.as_str();

        if prior.rules != planned.rules {
            let _: Empty = client
                .invoke(
                    "UpdateFirewall",
                    &serde_json::json!({
                        "FWId": id,
                        "Rule": parse_rules(&known_strings(&planned.rules))?,
                    }),
                )
                .await?;
        }

        if prior.name != planned.name || prior.tag != planned.tag || prior.remark != planned.remark {
            let _: Empty = client
                .invoke(
                    "UpdateFirewallAttribute",
                    &serde_json::json!({
                        "FWId": id,
                        "Name": planned.name.as_str(),
                        "Tag": str_or(&planned.tag, "Default"),
                        "Remark": planned.remark.as_str(),
                    }),
                )
                .await?;
        }
        Ok(())
    }

    async fn delete<'a>(&self, client: &Client, state: &Self::State<'a>) -> Result<()> {
        let _: Empty = client
            .invoke("DeleteFirewall", &serde_json::json!({ "FWId": state.id.as_str() }))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    use crate::api::fake::FakeCloud;

    fn planned<'a>() -> SecurityGroupState<'a> {
        SecurityGroupState {
            name: value_string("web"),
            rules: value_list(["tcp|22|0.0.0.0/0|accept|high".to_owned()]),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_normalizes_rules() {
        let fake = FakeCloud::new();
        fake.respond("CreateFirewall", json!({"RetCode": 0, "FWId": "firewall-1"}));

        let id = SecurityGroupResource
            .create(&fake.client(), &planned())
            .await
            .unwrap();
        assert_eq!(id, "firewall-1");
        let call = &fake.calls("CreateFirewall")[0];
        assert_eq!(call["Rule.0"], "TCP|22|0.0.0.0/0|ACCEPT|HIGH");
        assert_eq!(call["Name"], "web");
    }

    #[tokio::test]
    async fn read_formats_rules() {
        let fake = FakeCloud::new();
        fake.respond(
            "DescribeFirewall",
            json!({
                "RetCode": 0,
                "DataSet": [{
                    "FWId": "firewall-1",
                    "Name": "web",
                    "Tag": "Default",
                    "Rule": [
                        {"ProtoType": "TCP", "DstPort": "80", "SrcIP": "0.0.0.0/0", "RuleAction": "ACCEPT", "Priority": "HIGH"},
                        {"ProtoType": "ICMP", "DstPort": "", "SrcIP": "10.0.0.0/8", "RuleAction": "DROP", "Priority": "LOW"},
                    ],
                }],
            }),
        );

        let mut state = planned();
        state.id = value_string("firewall-1");
        let state = SecurityGroupResource.read(&fake.client(), state).await.unwrap();
        assert_eq!(
            known_strings(&state.rules),
            vec!["TCP|80|0.0.0.0/0|ACCEPT|HIGH", "ICMP||10.0.0.0/8|DROP|LOW"]
        );
    }

    #[tokio::test]
    async fn configured_spelling_survives_read() {
        let fake = FakeCloud::new();
        fake.respond("CreateFirewall", json!({"RetCode": 0, "FWId": "firewall-1"}))
            .respond(
                "DescribeFirewall",
                json!({
                    "RetCode": 0,
                    "DataSet": [{
                        "FWId": "firewall-1",
                        "Name": "web",
                        "Rule": [
                            {"ProtoType": "TCP", "DstPort": "22", "SrcIP": "0.0.0.0/0", "RuleAction": "ACCEPT", "Priority": "HIGH"},
                            {"ProtoType": "UDP", "DstPort": "53", "SrcIP": "10.0.0.0/8", "RuleAction": "ACCEPT", "Priority": "LOW"},
                        ],
                    }],
                }),
            );

        let mut state = planned();
        let id = SecurityGroupResource
            .create(&fake.client(), &state)
            .await
            .unwrap();
        state.id = value_string(id);
        let state = SecurityGroupResource.read(&fake.client(), state).await.unwrap();
        assert_eq!(
            known_strings(&state.rules),
            vec!["tcp|22|0.0.0.0/0|accept|high", "UDP|53|10.0.0.0/8|ACCEPT|LOW"]
        );
    }

    #[test]
    fn changed_rules_are_reported_canonically() {
        let current = [FirewallRule::parse("tcp|443|0.0.0.0/0|accept|high").unwrap()];
        assert_eq!(
            current_rules(&["tcp|22|0.0.0.0/0|accept|high".to_owned()], &current),
            vec!["TCP|443|0.0.0.0/0|ACCEPT|HIGH"]
        );
    }

    #[tokio::test]
    async fn update_only_touches_changed_parts() {
        let fake = FakeCloud::new();
        let mut prior = planned();
        prior.id = value_string("firewall-1");
        let mut planned = prior.clone();
        planned.remark = value_string("public web");

        SecurityGroupResource
            .update(&fake.client(), &prior, &planned)
            .await
            .unwrap();
        assert_eq!(fake.actions(), vec!["UpdateFirewallAttribute"]);
    }

    #[tokio::test]
    async fn invalid_rules_are_reported() {
        let mut diags = Diagnostics::default();
        let mut state = planned();
        state.rules = value_list(["tcp|22|0.0.0.0/0|accept".to_owned(), "udp|53|0.0.0.0/0|drop|low".to_owned()]);
        SecurityGroupResource.validate(&mut diags, &state).await;
        assert_eq!(diags.errors.len(), 1);
    }
}
