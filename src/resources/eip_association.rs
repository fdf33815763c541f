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

use crate::api::network::EipBindingRequest;
use crate::api::{Client, CloudError, Empty};
use crate::schema::{block_schema, computed, required};
use crate::utils::value_string;

use super::eip::{unbind, wait_eip, EIP_FREE, EIP_USED};
use super::{computed_attributes, force_new, CloudResource};

/// Resource types an EIP can be bound to, by id prefix
const RESOURCE_TYPES: &[(&str, &str)] = &[
    ("uhost-", "uhost"),
    ("ulb-", "ulb"),
    ("natgw-", "natgw"),
    ("vpngw-", "vpngw"),
];

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct EipAssociationState<'a> {
    #[serde(borrow = "'a")]
    pub id: ValueString<'a>,
    pub eip_id: ValueString<'a>,
    pub resource_id: ValueString<'a>,
    pub resource_type: ValueString<'a>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EipAssociationResource;

/// Resource type of a resource id, such as `uhost` for `uhost-3x0d1`
fn resource_type(resource_id: &str) -> Option<&'static str> {
    RESOURCE_TYPES
        .iter()
        .find(|(prefix, _)| resource_id.starts_with(prefix))
        .map(|(_, resource_type)| *resource_type)
}

/// Split `<eip_id>:<resource_id>`
fn parse_association_id(id: &str) -> Result<(&str, &str)> {
    match id.split_once(':') {
        Some((eip_id, resource_id)) if !eip_id.is_empty() && !resource_id.is_empty() => {
            Ok((eip_id, resource_id))
        }
        _ => bail!("invalid eip association id `{id}`, expected `<eip_id>:<resource_id>`"),
    }
}

#[async_trait]
impl CloudResource for EipAssociationResource {
    type State<'a> = EipAssociationState<'a>;
    const KIND: &'static str = "eip association";

    fn schema(&self) -> Schema {
        block_schema(
            "Binding of an elastic IP to a resource",
            map! {
                "eip_id" => required(AttributeType::String, "Elastic IP to bind"),
                "resource_id" => required(AttributeType::String, "Instance, load balancer or gateway receiving the address"),
                "resource_type" => computed(AttributeType::String, "Type of the resource, deduced from its id"),
            },
        )
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, state: &Self::State<'a>) {
        if let Value::Value(resource_id) = &state.resource_id {
            if resource_type(resource_id).is_none() {
                diags.error(
                    "Unsupported resource",
                    format!("`{resource_id}` is not an instance, load balancer or gateway id"),
                    AttributePath::new("resource_id"),
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

    computed_attributes!(id, resource_type);

    fn requires_replace<'a>(
        &self,
        prior: &Self::State<'a>,
        proposed: &Self::State<'a>,
    ) -> Vec<AttributePath> {
        force_new!(prior, proposed; eip_id, resource_id)
    }

    async fn create<'a>(&self, client: &Client, planned: &Self::State<'a>) -> Result<String> {
        let eip_id = planned.eip_id.as_str();
        let resource_id = planned.resource_id.as_str();
        let Some(kind) = resource_type(resource_id) else {
            bail!("cannot deduce the resource type of `{resource_id}`");
        };

        let _: Empty = client
            .invoke(
                "BindEIP",
                &EipBindingRequest {
                    eip_id: eip_id.to_owned(),
                    resource_type: kind.to_owned(),
                    resource_id: resource_id.to_owned(),
                },
            )
            .await?;
        Ok(format!("{eip_id}:{resource_id}"))
    }

    async fn wait_created<'a>(&self, client: &Client, state: &Self::State<'a>) -> Result<()> {
        wait_eip(client, state.eip_id.as_str(), EIP_FREE, EIP_USED).await
    }

    async fn read<'a>(&self, client: &Client, mut state: Self::State<'a>) -> Result<Self::State<'a>> {
        let (eip_id, resource_id) = parse_association_id(state.id.as_str())?;
        let eip = client.describe_eip_by_id(eip_id).await?;
        if eip.resource.resource_id != resource_id {
            return Err(CloudError::not_found("eip association", state.id.as_str()).into());
        }

        state.eip_id = value_string(eip_id);
        state.resource_id = value_string(resource_id);
        state.resource_type = value_string(eip.resource.resource_type);
        Ok(state)
    }

    async fn update<'a>(
        &self,
        _client: &Client,
        _prior: &Self::State<'a>,
        _planned: &Self::State<'a>,
    ) -> Result<()> {
        Ok(())
    }

    async fn delete<'a>(&self, client: &Client, state: &Self::State<'a>) -> Result<()> {
        let resource_id = state.resource_id.as_str();
        let kind = match state.resource_type.as_deref_option() {
            Some(kind) => kind,
            None => resource_type(resource_id).unwrap_or_default(),
        };
        unbind(client, state.eip_id.as_str(), kind, resource_id).await
    }

    fn import<'a>(&self, id: &str) -> Result<Self::State<'a>> {
        let (eip_id, resource_id) = parse_association_id(id)?;
        Ok(EipAssociationState {
            id: value_string(id),
            eip_id: value_string(eip_id),
            resource_id: value_string(resource_id),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::api::fake::FakeCloud;
    use crate::api::is_not_found;

    fn eip(status: &str, resource_id: &str) -> serde_json::Value {
        json!({
            "RetCode": 0,
            "EIPSet": [{
                "EIPId": "eip-1",
                "Status": status,
                "Resource": {"ResourceId": resource_id, "ResourceType": "uhost"},
            }],
        })
    }

    #[test]
    fn resource_types() {
        assert_eq!(resource_type("uhost-abc"), Some("uhost"));
        assert_eq!(resource_type("ulb-abc"), Some("ulb"));
        assert_eq!(resource_type("bs-abc"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn bind_and_wait() {
        let fake = FakeCloud::new();
        fake.respond("DescribeEIP", eip(EIP_FREE, ""))
            .respond("DescribeEIP", eip(EIP_USED, "uhost-1"));

        let client = fake.client();
        let mut state = EipAssociationState {
            eip_id: value_string("eip-1"),
            resource_id: value_string("uhost-1"),
            ..Default::default()
        };
        let id = EipAssociationResource.create(&client, &state).await.unwrap();
        assert_eq!(id, "eip-1:uhost-1");
        assert_eq!(fake.calls("BindEIP")[0]["ResourceType"], "uhost");

        EipAssociationResource.set_id(&mut state, id);
        EipAssociationResource.wait_created(&client, &state).await.unwrap();
        let state = EipAssociationResource.read(&client, state).await.unwrap();
        assert_eq!(state.resource_type.as_str(), "uhost");
    }

    #[tokio::test]
    async fn rebound_eip_is_not_found() {
        let fake = FakeCloud::new();
        fake.respond("DescribeEIP", eip(EIP_USED, "uhost-2"));

        let state = EipAssociationResource.import("eip-1:uhost-1").unwrap();
        let err = EipAssociationResource
            .read(&fake.client(), state)
            .await
            .unwrap_err();
        assert!(is_not_found(&err));
    }

    #[tokio::test(start_paused = true)]
    async fn unbind_waits_for_free() {
        let fake = FakeCloud::new();
        fake.respond("DescribeEIP", eip(EIP_FREE, ""));

        let state = EipAssociationResource.import("eip-1:ulb-1").unwrap();
        EipAssociationResource.delete(&fake.client(), &state).await.unwrap();
        assert_eq!(fake.actions(), vec!["UnBindEIP", "DescribeEIP"]);
        assert_eq!(fake.calls("UnBindEIP")[0]["ResourceType"], "ulb");
    }
}
