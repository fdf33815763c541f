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

use crate::api::lb::{CreateLoadBalancerRequest, CreateLoadBalancerResponse};
use crate::api::{Client, Empty};
use crate::schema::{block_schema, computed, optional, optional_computed};
use crate::utils::{format_timestamp, str_or, unique_name, value_string, value_string_opt};
use crate::wait::StateChange;

use super::{computed_attributes, force_new, refreshed, CloudResource};

const DELETE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct LbState<'a> {
    #[serde(borrow = "'a")]
    pub id: ValueString<'a>,
    pub name: ValueString<'a>,
    pub tag: ValueString<'a>,
    pub remark: ValueString<'a>,
    pub internal: Value<bool>,
    pub vpc_id: ValueString<'a>,
    pub subnet_id: ValueString<'a>,
    pub charge_type: ValueString<'a>,
    pub private_ip: ValueString<'a>,
    pub create_time: ValueString<'a>,
    pub expire_time: ValueString<'a>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LbResource;

#[async_trait]
impl CloudResource for LbResource {
    type State<'a> = LbState<'a>;
    const KIND: &'static str = "load balancer";

    fn schema(&self) -> Schema {
        block_schema(
            "Load balancer",
            map! {
                "name" => optional_computed(AttributeType::String, "Name of the load balancer"),
                "tag" => optional_computed(AttributeType::String, "Business group (default `Default`)"),
                "remark" => optional_computed(AttributeType::String, "Free-form remark"),
                "internal" => optional(AttributeType::Bool, "Serve the private network only (default false)"),
                "vpc_id" => optional_computed(AttributeType::String, "VPC of the load balancer"),
                "subnet_id" => optional_computed(AttributeType::String, "Subnet of the load balancer"),
                "charge_type" => optional_computed(AttributeType::String, "Billing mode (default `Month`)"),
                "private_ip" => computed(AttributeType::String, "Private IP of an internal load balancer"),
                "create_time" => computed(AttributeType::String, "Creation time (RFC 3339)"),
                "expire_time" => computed(AttributeType::String, "Expiration time (RFC 3339)"),
            },
        )
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, state: &Self::State<'a>) {
        if state.subnet_id.as_deref_option().is_some() && state.vpc_id.is_null() {
            diags.error_short(
                "`vpc_id` is required when `subnet_id` is set",
                AttributePath::new("vpc_id"),
            );
        }
    }

    fn id<'s>(&self, state: &'s Self::State<'_>) -> &'s str {
        state.id.as_str()
    }

    fn set_id(&self, state: &mut Self::State<'_>, id: String) {
        state.id = value_string(id);
    }

    computed_attributes!(
        id,
        name,
        tag,
        remark,
        vpc_id,
        subnet_id,
        charge_type,
        private_ip,
        create_time,
        expire_time,
    );

    fn requires_replace<'a>(
        &self,
        prior: &Self::State<'a>,
        proposed: &Self::State<'a>,
    ) -> Vec<AttributePath> {
        force_new!(prior, proposed; internal, vpc_id, subnet_id, charge_type)
    }

    async fn create<'a>(&self, client: &Client, planned: &Self::State<'a>) -> Result<String> {
        let internal = planned.internal.as_ref_option().copied().unwrap_or(false);
        let (outer_mode, inner_mode) = if internal { ("No", "Yes") } else { ("Yes", "No") };

        let response: CreateLoadBalancerResponse = client
            .invoke(
                "CreateLoadBalancer",
                &CreateLoadBalancerRequest {
                    name: planned
                        .name
                        .as_deref_option()
                        .map_or_else(|| unique_name("lb"), str::to_owned),
                    tag: str_or(&planned.tag, "Default").to_owned(),
                    remark: planned.remark.as_str().to_owned(),
                    outer_mode: outer_mode.to_owned(),
                    inner_mode: inner_mode.to_owned(),
                    vpc_id: planned.vpc_id.as_str().to_owned(),
                    subnet_id: planned.subnet_id.as_str().to_owned(),
                    charge_type: str_or(&planned.charge_type, "Month").to_owned(),
                },
            )
            .await?;
        Ok(response.load_balancer_id)
    }

    async fn read<'a>(&self, client: &Client, mut state: Self::State<'a>) -> Result<Self::State<'a>> {
        let lb = client.describe_lb_by_id(state.id.as_str()).await?;

        // Unset `internal` stays null while the load balancer is public
        if lb.is_internal() || !state.internal.is_null() {
            state.internal = Value::Value(lb.is_internal());
        }
        state.name = value_string(lb.name);
        state.tag = value_string(lb.tag);
        state.remark = value_string(lb.remark);
        state.vpc_id = value_string_opt(lb.vpc_id);
        state.subnet_id = value_string_opt(lb.subnet_id);
        state.charge_type = value_string(lb.charge_type);
        state.private_ip = value_string_opt(lb.private_ip);
        state.create_time = value_string(format_timestamp(lb.create_time));
        state.expire_time = value_string_opt(format_timestamp(lb.expire_time));
        Ok(state)
    }

    async fn update<'a>(
        &self,
        client: &Client,
        prior: &Self::State<'a>,
        planned: &Self::State<'a>,
    ) -> Result<()> {
        if prior.name != planned.name || prior.tag != planned.tag || prior.remark != planned.remark {
            let _: Empty = client
                .invoke(
                    "UpdateLoadBalancerAttribute",
                    &serde_json::json!({
                        "ULBId": planned.id.as_str(),
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
        let id = state.id.as_str();
        let _: Empty = client
            .invoke("DeleteLoadBalancer", &serde_json::json!({ "ULBId": id }))
            .await?;

        StateChange::new(&["Deleting"], &[], DELETE_TIMEOUT)
            .wait_for_state(move || async move {
                refreshed(client.describe_lb_by_id(id).await, |_| "Deleting".to_owned())
            })
            .await
            .with_context(|| format!("waiting for load balancer `{id}` to be deleted"))?;
        Ok(())
    }
}
