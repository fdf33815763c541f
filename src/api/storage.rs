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

pub const DISK_AVAILABLE: &str = "Available";
pub const DISK_IN_USE: &str = "InUse";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Disk {
    pub disk_id: String,
    pub name: String,
    pub zone: String,
    pub size: i64,
    pub disk_type: String,
    pub status: String,
    pub tag: String,
    pub charge_type: String,
    pub instance_id: String,
    pub create_time: i64,
    pub expire_time: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateDiskRequest {
    pub zone: String,
    pub name: String,
    pub size: i64,
    pub disk_type: String,
    pub charge_type: String,
    pub tag: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CreateDiskResponse {
    pub disk_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DescribeDiskResponse {
    pub total_count: usize,
    pub data_set: Vec<Disk>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DiskAttachmentRequest {
    pub zone: String,
    pub disk_id: String,
    pub instance_id: String,
}

impl Client {
    pub async fn describe_disk_by_id(&self, id: &str) -> Result<Disk, CloudError> {
        if id.is_empty() {
            return Err(CloudError::not_found("disk", id));
        }
        let response: DescribeDiskResponse = self
            .invoke(
                "DescribeDisk",
                &serde_json::json!({ "DiskId": id, "Offset": 0, "Limit": 1 }),
            )
            .await?;
        first_or_not_found(response.data_set, "disk", id)
    }
}
