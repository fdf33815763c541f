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
use serde::{Deserialize, Serialize};
use tf_provider::value::{Value, ValueString};
use tf_provider::{schema::{AttributeType, Schema}, map, AttributePath, Diagnostics};

use crate::api::network::{CreateSubnetRequest, CreateSubnetResponse};
use crate::api::{Client, Empty};
use crate::schema::{block_schema, computed, optional_computed, required};
use crate::utils::{format_timestamp, str_or, unique_name, value_string};
use crate::wait::StateChange;

use super::vpc::is_cidr;
use super::{computed_attributes, force_new, refreshed, CloudResource};

const DELETE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubnetState<'a> {
    #[serde(borrow = "'a")]
    pub id: ValueString<'a>,
    pub vpc_id: ValueString<'a>,
    pub cidr_block: ValueString<'a>,
    pub name: ValueString<'a>,
    pub tag: ValueString<'a>,
    pub remark: ValueString<'a>,
    pub create_time: ValueString<'a>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SubnetResource;

#[async_trait]
impl CloudResource for SubnetResource {
    type State<'a> = SubnetState<'a>;
    const KIND: &'static str = "subnet";

    fn schema(&self) -> Schema {
        block_schema(
            "Subnet of a VPC",
            map! {
                "vpc_id" => required(AttributeType::String, "VPC containing the subnet"),
                "cidr_block" => required(AttributeType::String, "CIDR block of the subnet"),
                "name" => optional_computed(AttributeType::String, "Name of the subnet"),
                "tag" => optional_computed(AttributeType::String, "Business group (default `Default`)"),
                "remark" => optional_computed(AttributeType::String, "Free-form remark"),
                "create_time" => computed(AttributeType::String, "Creation time (RFC 3339)"),
            },
        )
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, state: &Self::State<'a>) {
        if let Value::Value(block) = &state.cidr_block {
            if !is_cidr(block) {
                diags.error(
                    "Invalid CIDR block",
                    format!("`{block}` is not an IPv4 CIDR block"),
                    AttributePath::new("cidr_block"),
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

    computed_attributes!(id, name, tag, remark, create_time);

    fn requires_replace<'a>(
        &self,
        prior: &Self::State<'a>,
        proposed: &Self::State<'a>,
    ) -> Vec<AttributePath> {
        force_new!(prior, proposed; vpc_id, cidr_block, remark)
    }

    async fn create<'a>(&self, client: &Client, planned: &Self::State<'a>) -> Result<String> {
        let (subnet, netmask) = planned
            .cidr_block
            .as_str()
            .split_once('/')
            .with_context(|| format!("invalid cidr block `{}`", planned.cidr_block.as_str()))?;
        let netmask = netmask.parse::<u8>().context("invalid netmask")?;

        let response: CreateSubnetResponse = client
            .invoke(
                "CreateSubnet",
                &CreateSubnetRequest {
                    vpc_id: planned.vpc_id.as_str().to_owned(),
                    subnet: subnet.to_owned(),
                    netmask,
                    subnet_name: planned
                        .name
                        .as_deref_option()
                        .map_or_else(|| unique_name("subnet"), str::to_owned),
                    tag: str_or(&planned.tag, "Default").to_owned(),
                    remark: planned.remark.as_str().to_owned(),
                },
            )
            .await?;
        Ok(response.subnet_id)
    }

    async fn read<'a>(&self, client: &Client, mut state: Self::State<'a>) -> Result<Self::State<'a>> {
        let subnet = client.describe_subnet_by_id(state.id.as_str()).await?;

        state.vpc_id = value_string(subnet.vpc_id.as_str());
        state.cidr_block = value_string(subnet.cidr_block());
        state.name = value_string(subnet.subnet_name);
        state.tag = value_string(subnet.tag);
        state.remark = value_string(subnet.remark);
        state.create_time = value_string(format_timestamp(subnet.create_time));
        Ok(state)
    }

    async fn update<'a>(
        &self,
        client: &Client,
        prior: &Self::State<'a>,
        planned: &Self::State<'a>,
    ) -> Result<()> {
        if prior.name != planned.name || prior.tag != planned.tag {
            let _: Empty = client
                .invoke(
                    "UpdateSubnetAttribute",
                    &serde_json::json!({
                        "SubnetId": planned.id.as_str(),
                        "Name": planned.name.as_str(),
                        "Tag": str_or(&planned.tag, "Default"),
                    }),
                )
                .await?;
        }
        Ok(())
    }

    async fn delete<'a>(&self, client: &Client, state: &Self::State<'a>) -> Result<()> {
        let id = state.id.as_str();
        let _: Empty = client
            .invoke("DeleteSubnet", &serde_json::json!({ "SubnetId": id }))
            .await?;

        StateChange::new(&["Deleting"], &[], DELETE_TIMEOUT)
            .wait_for_state(move || async move {
                refreshed(client.describe_subnet_by_id(id).await, |_| "Deleting".to_owned())
            })
            .await
            .with_context(|| format!("waiting for subnet `{id}` to be deleted"))?;
        Ok(())
    }
}
