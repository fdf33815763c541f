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
use tf_provider::value::{Value, ValueNumber, ValueString};
use tf_provider::{schema::{AttributeType, Schema}, map, AttributePath, Diagnostics};

use crate::api::network::{AllocateEipRequest, AllocateEipResponse, EipBindingRequest};
use crate::api::{Client, Empty};
use crate::schema::{block_schema, computed, optional_computed, required};
use crate::utils::{format_timestamp, number_or, str_or, unique_name, value_string, value_string_opt};
use crate::wait::StateChange;

use super::{computed_attributes, force_new, refreshed, CloudResource};

const BINDING_TIMEOUT: Duration = Duration::from_secs(5 * 60);

pub(super) const EIP_FREE: &str = "free";
pub(super) const EIP_USED: &str = "used";

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct EipState<'a> {
    #[serde(borrow = "'a")]
    pub id: ValueString<'a>,
    pub bandwidth: ValueNumber,
    pub internet_type: ValueString<'a>,
    pub charge_mode: ValueString<'a>,
    pub name: ValueString<'a>,
    pub tag: ValueString<'a>,
    pub remark: ValueString<'a>,
    pub public_ip: ValueString<'a>,
    pub status: ValueString<'a>,
    pub resource_id: ValueString<'a>,
    pub resource_type: ValueString<'a>,
    pub create_time: ValueString<'a>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EipResource;

/// Wait for the binding status of an EIP
pub(super) async fn wait_eip(client: &Client, id: &str, pending: &str, target: &str) -> Result<()> {
    StateChange::new(&[pending], &[target], BINDING_TIMEOUT)
        .wait_for_state(move || async move {
            refreshed(client.describe_eip_by_id(id).await, |eip| eip.status.clone())
        })
        .await
        .with_context(|| format!("waiting for eip `{id}` to be {target}"))?;
    Ok(())
}

pub(super) async fn unbind(
    client: &Client,
    eip_id: &str,
    resource_type: &str,
    resource_id: &str,
) -> Result<()> {
    log::info!("unbinding eip `{eip_id}` from {resource_type} `{resource_id}`");
    let _: Empty = client
        .invoke(
            "UnBindEIP",
            &EipBindingRequest {
                eip_id: eip_id.to_owned(),
                resource_type: resource_type.to_owned(),
                resource_id: resource_id.to_owned(),
            },
        )
        .await?;
    wait_eip(client, eip_id, EIP_USED, EIP_FREE).await
}

#[async_trait]
impl CloudResource for EipResource {
    type State<'a> = EipState<'a>;
    const KIND: &'static str = "eip";

    fn schema(&self) -> Schema {
        block_schema(
            "Elastic public IP address",
            map! {
                "bandwidth" => required(AttributeType::Number, "Bandwidth in Mbps"),
                "internet_type" => optional_computed(AttributeType::String, "Line of the address: `BGP` (default) or `International`"),
                "charge_mode" => optional_computed(AttributeType::String, "`Bandwidth` (default) or `Traffic`"),
                "name" => optional_computed(AttributeType::String, "Name of the address"),
                "tag" => optional_computed(AttributeType::String, "Business group (default `Default`)"),
                "remark" => optional_computed(AttributeType::String, "Free-form remark"),
                "public_ip" => computed(AttributeType::String, "Allocated public IP"),
                "status" => computed(AttributeType::String, "`free` or `used`"),
                "resource_id" => computed(AttributeType::String, "Resource the address is bound to"),
                "resource_type" => computed(AttributeType::String, "Type of the bound resource"),
                "create_time" => computed(AttributeType::String, "Creation time (RFC 3339)"),
            },
        )
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, state: &Self::State<'a>) {
        if let Value::Value(bandwidth) = &state.bandwidth {
            if !(1..=800).contains(bandwidth) {
                diags.error_short(
                    "`bandwidth` must be between 1 and 800",
                    AttributePath::new("bandwidth"),
                );
            }
        }
        if let Value::Value(mode) = &state.charge_mode {
            if !matches!(&**mode, "Bandwidth" | "Traffic") {
                diags.error_short(
                    "`charge_mode` must be `Bandwidth` or `Traffic`",
                    AttributePath::new("charge_mode"),
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

    computed_attributes!(
        id,
        internet_type,
        charge_mode,
        name,
        tag,
        remark,
        public_ip,
        status,
        resource_id,
        resource_type,
        create_time,
    );

    fn requires_replace<'a>(
        &self,
        prior: &Self::State<'a>,
        proposed: &Self::State<'a>,
    ) -> Vec<AttributePath> {
        force_new!(prior, proposed; internet_type, charge_mode)
    }

    async fn create<'a>(&self, client: &Client, planned: &Self::State<'a>) -> Result<String> {
        let response: AllocateEipResponse = client
            .invoke(
                "AllocateEIP",
                &AllocateEipRequest {
                    operator_name: str_or(&planned.internet_type, "BGP").to_owned(),
                    bandwidth: number_or(&planned.bandwidth, 1),
                    pay_mode: str_or(&planned.charge_mode, "Bandwidth").to_owned(),
                    charge_type: "Month".to_owned(),
                    name: planned
                        .name
                        .as_deref_option()
                        .map_or_else(|| unique_name("eip"), str::to_owned),
                    tag: str_or(&planned.tag, "Default").to_owned(),
                    remark: planned.remark.as_str().to_owned(),
                },
            )
            .await?;
        response
            .eip_set
            .into_iter()
            .next()
            .map(|eip| eip.eip_id)
            .context("no eip returned")
    }

    async fn read<'a>(&self, client: &Client, mut state: Self::State<'a>) -> Result<Self::State<'a>> {
        let eip = client.describe_eip_by_id(state.id.as_str()).await?;

        state.bandwidth = Value::Value(eip.bandwidth);
        state.charge_mode = value_string(eip.pay_mode);
        state.name = value_string(eip.name);
        state.tag = value_string(eip.tag);
        state.remark = value_string(eip.remark);
        state.status = value_string(eip.status);
        if let Some(addr) = eip.eip_addr.into_iter().next() {
            state.internet_type = value_string(addr.operator_name);
            state.public_ip = value_string(addr.ip);
        }
        state.resource_id = value_string_opt(eip.resource.resource_id);
        state.resource_type = value_string_opt(eip.resource.resource_type);
        state.create_time = value_string(format_timestamp(eip.create_time));
        Ok(state)
    }

    async fn update<'a>(
        &self,
        client: &Client,
        prior: &Self::State<'a>,
        planned: &Self::State<'a>,
    ) -> Result<()> {
        let id = planned.id.as_str();

        if prior.bandwidth != planned.bandwidth {
            let _: Empty = client
                .invoke(
                    "ModifyEIPBandwidth",
                    &serde_json::json!({
                        "EIPId": id,
                        "Bandwidth": number_or(&planned.bandwidth, 1),
                    }),
                )
                .await?;
        }

        if prior.name != planned.name || prior.tag != planned.tag || prior.remark != planned.remark {
            let _: Empty = client
                .invoke(
                    "UpdateEIPAttribute",
                    &serde_json::json!({
                        "EIPId": id,
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

        // The binding may have changed outside of Terraform
        let eip = client.describe_eip_by_id(id).await?;
        if !eip.resource.resource_id.is_empty() {
            unbind(client, id, &eip.resource.resource_type, &eip.resource.resource_id).await?;
        }

        let _: Empty = client
            .invoke("ReleaseEIP", &serde_json::json!({ "EIPId": id }))
            .await?;
        Ok(())
    }
}
