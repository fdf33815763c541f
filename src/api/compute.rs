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

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{first_or_not_found, Client, CloudError, Page};

pub const INSTANCE_RUNNING: &str = "Running";
pub const INSTANCE_STOPPED: &str = "Stopped";

lazy_static! {
    static ref INSTANCE_TYPE: Regex =
        Regex::new(r"^([a-z][a-z0-9]*)-(basic|standard|highcpu|highmem|customized)-(\d+)(?:-(\d+))?$")
            .expect("instance type pattern is valid");
}

/// Shape of an instance, as written in `instance_type`
///
/// `n-standard-4` is 4 vCPUs at the `standard` memory ratio;
/// `n-customized-4-12` is 4 vCPUs with 12 GB of memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceType {
    pub host_type: String,
    pub cpu: i64,
    /// In MB
    pub memory: i64,
}

impl InstanceType {
    pub fn parse(s: &str) -> Option<Self> {
        let captures = INSTANCE_TYPE.captures(s)?;
        let host_type = captures[1].to_uppercase();
        let cpu: i64 = captures[3].parse().ok()?;
        if !(1..=64).contains(&cpu) {
            return None;
        }

        let memory_gb = match (&captures[2], captures.get(4)) {
            ("customized", Some(memory)) => memory.as_str().parse().ok()?,
            ("customized", None) | (_, Some(_)) => return None,
            ("highcpu", None) => cpu,
            ("basic", None) => cpu * 2,
            ("standard", None) => cpu * 4,
            ("highmem", None) => cpu * 8,
            _ => return None,
        };
        if memory_gb < 1 || memory_gb > cpu * 12 {
            return None;
        }

        Some(Self {
            host_type,
            cpu,
            memory: memory_gb * 1024,
        })
    }

    /// Canonical name for a host shape reported by the API
    pub fn format(host_type: &str, cpu: i64, memory: i64) -> String {
        let family = host_type.to_lowercase();
        let memory_gb = memory / 1024;
        let class = match memory_gb.checked_div(cpu) {
            Some(1) if memory_gb == cpu => "highcpu",
            Some(2) if memory_gb == cpu * 2 => "basic",
            Some(4) if memory_gb == cpu * 4 => "standard",
            Some(8) if memory_gb == cpu * 8 => "highmem",
            _ => return format!("{family}-customized-{cpu}-{memory_gb}"),
        };
        format!("{family}-{class}-{cpu}")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Instance {
    pub instance_id: String,
    pub zone: String,
    pub name: String,
    pub tag: String,
    pub remark: String,
    pub state: String,
    pub host_type: String,
    #[serde(rename = "CPU")]
    pub cpu: i64,
    pub memory: i64,
    pub image_id: String,
    pub charge_type: String,
    #[serde(rename = "IPSet")]
    pub ip_set: Vec<InstanceIp>,
    pub disk_set: Vec<InstanceDisk>,
    pub create_time: i64,
    pub expire_time: i64,
}

impl Instance {
    pub fn private_ip(&self) -> Option<&InstanceIp> {
        self.ip_set.iter().find(|ip| ip.ip_type == "Private")
    }

    pub fn boot_disk(&self) -> Option<&InstanceDisk> {
        self.disk_set.iter().find(|disk| disk.is_boot)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct InstanceIp {
    #[serde(rename = "IP")]
    pub ip: String,
    #[serde(rename = "Type")]
    pub ip_type: String,
    #[serde(rename = "VPCId")]
    pub vpc_id: String,
    pub subnet_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct InstanceDisk {
    pub disk_id: String,
    pub size: i64,
    pub is_boot: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateInstanceRequest {
    pub zone: String,
    pub image_id: String,
    pub host_type: String,
    #[serde(rename = "CPU")]
    pub cpu: i64,
    pub memory: i64,
    pub name: String,
    pub tag: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub remark: String,
    pub charge_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub password: String,
    #[serde(rename = "VPCId", skip_serializing_if = "String::is_empty")]
    pub vpc_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub subnet_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub security_group_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boot_disk_size: Option<i64>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub user_data: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CreateInstanceResponse {
    pub instance_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DescribeInstanceResponse {
    pub total_count: usize,
    pub instance_set: Vec<Instance>,
}

/// Filters of a paginated instance listing
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeInstanceRequest {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub zone: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub instance_ids: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub tag: String,
    pub offset: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Image {
    pub image_id: String,
    pub image_name: String,
    pub zone: String,
    pub image_type: String,
    pub os_type: String,
    pub os_name: String,
    pub image_size: i64,
    pub state: String,
    pub create_time: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeImageRequest {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub zone: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub image_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub os_type: String,
    pub offset: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DescribeImageResponse {
    pub total_count: usize,
    pub image_set: Vec<Image>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Zone {
    pub zone: String,
    pub region: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DescribeZonesResponse {
    pub zones: Vec<Zone>,
}

impl Client {
    pub async fn describe_instance_by_id(&self, id: &str) -> Result<Instance, CloudError> {
        if id.is_empty() {
            return Err(CloudError::not_found("instance", id));
        }
        let page = self
            .describe_instances(&DescribeInstanceRequest {
                instance_ids: vec![id.to_owned()],
                limit: 1,
                ..Default::default()
            })
            .await?;
        first_or_not_found(page.items, "instance", id)
    }

    pub async fn describe_instances(
        &self,
        request: &DescribeInstanceRequest,
    ) -> Result<Page<Instance>, CloudError> {
        let response: DescribeInstanceResponse = self.invoke("DescribeInstance", request).await?;
        Ok(Page {
            total_count: response.total_count,
            items: response.instance_set,
        })
    }

    pub async fn describe_images(
        &self,
        request: &DescribeImageRequest,
    ) -> Result<Page<Image>, CloudError> {
        let response: DescribeImageResponse = self.invoke("DescribeImage", request).await?;
        Ok(Page {
            total_count: response.total_count,
            items: response.image_set,
        })
    }

    pub async fn describe_zones(&self) -> Result<Vec<Zone>, CloudError> {
        let response: DescribeZonesResponse = self
            .invoke("DescribeZones", &serde_json::json!({}))
            .await?;
        Ok(response.zones)
    }
}
