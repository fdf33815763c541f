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

use crate::api::storage::{CreateDiskRequest, CreateDiskResponse, DISK_AVAILABLE};
use crate::api::{Client, Empty};
use crate::schema::{block_schema, computed, optional_computed, required};
use crate::utils::{format_timestamp, number_or, str_or, unique_name, value_string, value_string_opt};
use crate::wait::StateChange;

use super::{computed_attributes, force_new, refreshed, CloudResource};

const CREATE_TIMEOUT: Duration = Duration::from_secs(10 * 60);
const UPDATE_TIMEOUT: Duration = Duration::from_secs(10 * 60);
const DELETE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

const DISK_TYPES: &[&str] = &["DataDisk", "SSDDataDisk", "RSSDDataDisk"];

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskState<'a> {
    #[serde(borrow = "'a")]
    pub id: ValueString<'a>,
    pub availability_zone: ValueString<'a>,
    pub name: ValueString<'a>,
    pub disk_size: ValueNumber,
    pub disk_type: ValueString<'a>,
    pub charge_type: ValueString<'a>,
    pub tag: ValueString<'a>,
    pub status: ValueString<'a>,
    pub create_time: ValueString<'a>,
    pub expire_time: ValueString<'a>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DiskResource;

async fn wait_disk(
    client: &Client,
    id: &str,
    pending: &[&str],
    timeout: Duration,
) -> Result<()> {
    StateChange::new(pending, &[DISK_AVAILABLE], timeout)
        .wait_for_state(move || async move {
            refreshed(client.describe_disk_by_id(id).await, |disk| disk.status.clone())
        })
        .await
        .with_context(|| format!("waiting for disk `{id}` to be available"))?;
    Ok(())
}

#[async_trait]
impl CloudResource for DiskResource {
    type State<'a> = DiskState<'a>;
    const KIND: &'static str = "disk";

    fn schema(&self) -> Schema {
        block_schema(
            "Block storage volume",
            map! {
                "availability_zone" => required(AttributeType::String, "Availability zone of the disk"),
                "name" => optional_computed(AttributeType::String, "Name of the disk"),
                "disk_size" => required(AttributeType::Number, "Size of the disk in GB; it can only grow"),
                "disk_type" => optional_computed(AttributeType::String, "One of `DataDisk`, `SSDDataDisk` or `RSSDDataDisk`"),
                "charge_type" => optional_computed(AttributeType::String, "Billing mode (default `Month`)"),
                "tag" => optional_computed(AttributeType::String, "Business group (default `Default`)"),
                "status" => computed(AttributeType::String, "Current state of the disk"),
                "create_time" => computed(AttributeType::String, "Creation time (RFC 3339)"),
                "expire_time" => computed(AttributeType::String, "Expiration time (RFC 3339)"),
            },
        )
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, state: &Self::State<'a>) {
        if let Value::Value(size) = &state.disk_size {
            if !(1..=8000).contains(size) {
                diags.error_short(
                    "`disk_size` must be between 1 and 8000",
                    AttributePath::new("disk_size"),
                );
            }
        }
        if let Value::Value(disk_type) = &state.disk_type {
            if !DISK_TYPES.contains(&&**disk_type) {
                diags.error(
                    "Invalid disk type",
                    format!("`{disk_type}` is not one of {}", DISK_TYPES.join(", ")),
                    AttributePath::new("disk_type"),
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

    computed_attributes!(id, name, disk_type, charge_type, tag, status, create_time, expire_time);

    fn requires_replace<'a>(
        &self,
        prior: &Self::State<'a>,
        proposed: &Self::State<'a>,
    ) -> Vec<AttributePath> {
        let mut paths = force_new!(prior, proposed; availability_zone, disk_type, charge_type, tag);
        // Disks cannot shrink
        if let (Value::Value(prior), Value::Value(proposed)) = (&prior.disk_size, &proposed.disk_size) {
            if proposed < prior {
                paths.push(AttributePath::new("disk_size"));
            }
        }
        paths
    }

    async fn create<'a>(&self, client: &Client, planned: &Self::State<'a>) -> Result<String> {
        let response: CreateDiskResponse = client
            .invoke(
                "CreateDisk",
                &CreateDiskRequest {
                    zone: planned.availability_zone.as_str().to_owned(),
                    name: planned
                        .name
                        .as_deref_option()
                        .map_or_else(|| unique_name("disk"), str::to_owned),
                    size: number_or(&planned.disk_size, 0),
                    disk_type: str_or(&planned.disk_type, "DataDisk").to_owned(),
                    charge_type: str_or(&planned.charge_type, "Month").to_owned(),
                    tag: str_or(&planned.tag, "Default").to_owned(),
                },
            )
            .await?;
        response
            .disk_ids
            .into_iter()
            .next()
            .context("no disk id returned")
    }

    async fn wait_created<'a>(&self, client: &Client, state: &Self::State<'a>) -> Result<()> {
        wait_disk(client, state.id.as_str(), &["Initializing"], CREATE_TIMEOUT).await
    }

    async fn read<'a>(&self, client: &Client, mut state: Self::State<'a>) -> Result<Self::State<'a>> {
        let disk = client.describe_disk_by_id(state.id.as_str()).await?;

        state.availability_zone = value_string(disk.zone);
        state.name = value_string(disk.name);
        state.disk_size = Value::Value(disk.size);
        state.disk_type = value_string(disk.disk_type);
        state.charge_type = value_string(disk.charge_type);
        state.tag = value_string(disk.tag);
        state.status = value_string(disk.status);
        state.create_time = value_string(format_timestamp(disk.create_time));
        state.expire_time = value_string_opt(format_timestamp(disk.expire_time));
        Ok(state)
    }

    async fn update<'a>(
        &self,
        client: &Client,
        prior: &Self::State<'a>,
        planned: &Self::State<'a>,
    ) -> Result<()> {
        let id = planned.id.as_str();

        if prior.name != planned.name {
            let _: Empty = client
                .invoke(
                    "RenameDisk",
                    &serde_json::json!({
                        "Zone": planned.availability_zone.as_str(),
                        "DiskId": id,
                        "DiskName": planned.name.as_str(),
                    }),
                )
                .await?;
        }

        if prior.disk_size != planned.disk_size {
            let _: Empty = client
                .invoke(
                    "ResizeDisk",
                    &serde_json::json!({
                        "Zone": planned.availability_zone.as_str(),
                        "DiskId": id,
                        "Size": number_or(&planned.disk_size, 0),
                    }),
                )
                .await?;
            wait_disk(client, id, &["Resizing"], UPDATE_TIMEOUT).await?;
        }
        Ok(())
    }

    async fn delete<'a>(&self, client: &Client, state: &Self::State<'a>) -> Result<()> {
        let id = state.id.as_str();
        let _: Empty = client
            .invoke(
                "DeleteDisk",
                &serde_json::json!({ "Zone": state.availability_zone.as_str(), "DiskId": id }),
            )
            .await?;

        StateChange::new(&["Deleting"], &[], DELETE_TIMEOUT)
            .wait_for_state(move || async move {
                refreshed(client.describe_disk_by_id(id).await, |_| "Deleting".to_owned())
            })
            .await
            .with_context(|| format!("waiting for disk `{id}` to be deleted"))?;
        Ok(())
    }
}
