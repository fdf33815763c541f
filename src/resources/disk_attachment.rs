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
use tf_provider::value::ValueString;
use tf_provider::{schema::{AttributeType, Schema}, map, AttributePath};

use crate::api::storage::{DiskAttachmentRequest, DISK_AVAILABLE, DISK_IN_USE};
use crate::api::{Client, CloudError, Empty};
use crate::schema::{block_schema, optional_computed, required};
use crate::utils::value_string;
use crate::wait::StateChange;

use super::{computed_attributes, force_new, refreshed, CloudResource};

const ATTACH_TIMEOUT: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskAttachmentState<'a> {
    #[serde(borrow = "'a")]
    pub id: ValueString<'a>,
    pub availability_zone: ValueString<'a>,
    pub disk_id: ValueString<'a>,
    pub instance_id: ValueString<'a>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DiskAttachmentResource;

fn attachment_id(disk_id: &str, instance_id: &str) -> String {
    format!("{disk_id}:{instance_id}")
}

/// Split `<disk_id>:<instance_id>`
fn parse_attachment_id(id: &str) -> Result<(&str, &str)> {
    match id.split_once(':') {
        Some((disk_id, instance_id)) if !disk_id.is_empty() && !instance_id.is_empty() => {
            Ok((disk_id, instance_id))
        }
        _ => anyhow::bail!("invalid disk attachment id `{id}`, expected `<disk_id>:<instance_id>`"),
    }
}

async fn wait_disk(
    client: &Client,
    disk_id: &str,
    pending: &[&str],
    target: &str,
) -> Result<()> {
    StateChange::new(pending, &[target], ATTACH_TIMEOUT)
        .wait_for_state(move || async move {
            refreshed(client.describe_disk_by_id(disk_id).await, |disk| disk.status.clone())
        })
        .await
        .with_context(|| format!("waiting for disk `{disk_id}` to be {target}"))?;
    Ok(())
}

#[async_trait]
impl CloudResource for DiskAttachmentResource {
    type State<'a> = DiskAttachmentState<'a>;
    const KIND: &'static str = "disk attachment";

    fn schema(&self) -> Schema {
        block_schema(
            "Attachment of a disk to an instance",
            map! {
                "availability_zone" => optional_computed(AttributeType::String, "Availability zone of the disk and the instance"),
                "disk_id" => required(AttributeType::String, "Disk to attach"),
                "instance_id" => required(AttributeType::String, "Instance to attach the disk to"),
            },
        )
    }

    fn id<'s>(&self, state: &'s Self::State<'_>) -> &'s str {
        state.id.as_str()
    }

    fn set_id(&self, state: &mut Self::State<'_>, id: String) {
        state.id = value_string(id);
    }

    computed_attributes!(id, availability_zone);

    fn requires_replace<'a>(
        &self,
        prior: &Self::State<'a>,
        proposed: &Self::State<'a>,
    ) -> Vec<AttributePath> {
        force_new!(prior, proposed; availability_zone, disk_id, instance_id)
    }

    async fn create<'a>(&self, client: &Client, planned: &Self::State<'a>) -> Result<String> {
        let disk_id = planned.disk_id.as_str();
        let instance_id = planned.instance_id.as_str();
        let zone = match planned.availability_zone.as_deref_option() {
            Some(zone) => zone.to_owned(),
            None => client.describe_disk_by_id(disk_id).await?.zone,
        };

        let _: Empty = client
            .invoke(
                "AttachDisk",
                &DiskAttachmentRequest {
                    zone,
                    disk_id: disk_id.to_owned(),
                    instance_id: instance_id.to_owned(),
                },
            )
            .await?;
        Ok(attachment_id(disk_id, instance_id))
    }

    async fn wait_created<'a>(&self, client: &Client, state: &Self::State<'a>) -> Result<()> {
        wait_disk(client, state.disk_id.as_str(), &[DISK_AVAILABLE, "Attaching"], DISK_IN_USE).await
    }

    async fn read<'a>(&self, client: &Client, mut state: Self::State<'a>) -> Result<Self::State<'a>> {
        let (disk_id, instance_id) = parse_attachment_id(state.id.as_str())?;
        let disk = client.describe_disk_by_id(disk_id).await?;
        if disk.instance_id != instance_id {
            return Err(CloudError::not_found("disk attachment", state.id.as_str()).into());
        }

        state.disk_id = value_string(disk_id);
        state.instance_id = value_string(instance_id);
        state.availability_zone = value_string(disk.zone);
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
        let disk_id = state.disk_id.as_str();
        let _: Empty = client
            .invoke(
                "DetachDisk",
                &DiskAttachmentRequest {
                    zone: state.availability_zone.as_str().to_owned(),
                    disk_id: disk_id.to_owned(),
                    instance_id: state.instance_id.as_str().to_owned(),
                },
            )
            .await?;
        wait_disk(client, disk_id, &[DISK_IN_USE, "Detaching"], DISK_AVAILABLE).await
    }

    fn import<'a>(&self, id: &str) -> Result<Self::State<'a>> {
        let (disk_id, instance_id) = parse_attachment_id(id)?;
        Ok(DiskAttachmentState {
            id: value_string(id),
            disk_id: value_string(disk_id),
            instance_id: value_string(instance_id),
            ..Default::default()
        })
    }
}
