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

use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tf_provider::value::{Value, ValueString};
use tf_provider::{schema::{AttributeType, Schema}, map, AttributePath, Diagnostics};

use crate::api::network::{CreateVpcRequest, CreateVpcResponse};
use crate::api::{Client, Empty};
use crate::schema::{block_schema, computed, optional_computed, required, string_set};
use crate::utils::{format_timestamp, known_strings, str_or, value_set, value_string, value_string_opt};
use crate::wait::StateChange;

use super::{computed_attributes, force_new, refreshed, CloudResource};

const DELETE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct VpcState<'a> {
    #[serde(borrow = "'a")]
    pub id: ValueString<'a>,
    pub name: ValueString<'a>,
    pub cidr_blocks: Value<BTreeSet<ValueString<'a>>>,
    pub tag: ValueString<'a>,
    pub remark: ValueString<'a>,
    pub create_time: ValueString<'a>,
    pub update_time: ValueString<'a>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct VpcResource;

#[async_trait]
impl CloudResource for VpcResource {
    type State<'a> = VpcState<'a>;
    const KIND: &'static str = "vpc";

    fn schema(&self) -> Schema {
        block_schema(
            "Virtual private network",
            map! {
                "name" => required(AttributeType::String, "Name of the VPC"),
                "cidr_blocks" => required(string_set(), "CIDR blocks of the VPC"),
                "tag" => optional_computed(AttributeType::String, "Business group (default `Default`)"),
                "remark" => optional_computed(AttributeType::String, "Free-form remark"),
                "create_time" => computed(AttributeType::String, "Creation time (RFC 3339)"),
                "update_time" => computed(AttributeType::String, "Last update time (RFC 3339)"),
            },
        )
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, state: &Self::State<'a>) {
        if let Value::Value(blocks) = &state.cidr_blocks {
            if blocks.is_empty() {
                diags.error_short(
                    "`cidr_blocks` must contain at least one block",
                    AttributePath::new("cidr_blocks"),
                );
            }
            for block in blocks.iter().flat_map(Value::as_ref_option) {
                if !is_cidr(block) {
                    diags.error(
                        "Invalid CIDR block",
                        format!("`{block}` is not an IPv4 CIDR block"),
                        AttributePath::new("cidr_blocks"),
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

    computed_attributes!(id, tag, remark, create_time, update_time);

    fn requires_replace<'a>(
        &self,
        prior: &Self::State<'a>,
        proposed: &Self::State<'a>,
    ) -> Vec<AttributePath> {
        force_new!(prior, proposed; name, tag, remark)
    }

    fn plan_update<'a>(&self, prior: &Self::State<'a>, state: &mut Self::State<'a>) {
        if prior.cidr_blocks != state.cidr_blocks {
            state.update_time = Value::Unknown;
        }
    }

    async fn create<'a>(&self, client: &Client, planned: &Self::State<'a>) -> Result<String> {
        let response: CreateVpcResponse = client
            .invoke(
                "CreateVPC",
                &CreateVpcRequest {
                    name: planned.name.as_str().to_owned(),
                    network: known_strings(&planned.cidr_blocks),
                    tag: str_or(&planned.tag, "Default").to_owned(),
                    remark: planned.remark.as_str().to_owned(),
                },
            )
            .await?;
        Ok(response.vpc_id)
    }

    async fn read<'a>(&self, client: &Client, mut state: Self::State<'a>) -> Result<Self::State<'a>> {
        let vpc = client.describe_vpc_by_id(state.id.as_str()).await?;

        state.name = value_string(vpc.name);
        state.cidr_blocks = value_set(vpc.network);
        state.tag = value_string(vpc.tag);
        state.remark = value_string(vpc.remark);
        state.create_time = value_string(format_timestamp(vpc.create_time));
        state.update_time = value_string_opt(format_timestamp(vpc.update_time));
        Ok(state)
    }

    async fn update<'a>(
        &self,
        client: &Client,
        prior: &Self::State<'a>,
        planned: &Self::State<'a>,
    ) -> Result<()> {
        if prior.cidr_blocks != planned.cidr_blocks {
            let _: Empty = client
                .invoke(
                    "UpdateVPCNetwork",
                    &serde_json::json!({
                        "VPCId": planned.id.as_str(),
                        "Network": known_strings(&planned.cidr_blocks),
                    }),
                )
                .await?;
        }
        Ok(())
    }

    async fn delete<'a>(&self, client: &Client, state: &Self::State<'a>) -> Result<()> {
        let id = state.id.as_str();
        let _: Empty = client
            .invoke("DeleteVPC", &serde_json::json!({ "VPCId": id }))
            .await?;

        StateChange::new(&["Deleting"], &[], DELETE_TIMEOUT)
            .wait_for_state(move || async move {
                refreshed(client.describe_vpc_by_id(id).await, |_| "Deleting".to_owned())
            })
            .await
            .with_context(|| format!("waiting for vpc `{id}` to be deleted"))?;
        Ok(())
    }
}

/// Loose check for `a.b.c.d/n`
pub(crate) fn is_cidr(s: &str) -> bool {
    let Some((ip, prefix)) = s.split_once('/') else {
        return false;
    };
    ip.parse::<std::net::Ipv4Addr>().is_ok() && prefix.parse::<u8>().is_ok_and(|p| p <= 32)
}
