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

use super::{first_or_not_found, Client, CloudError};

pub const DB_RUNNING: &str = "Running";
pub const DB_SHUTOFF: &str = "Shutoff";

lazy_static! {
    static ref DB_INSTANCE_TYPE: Regex =
        Regex::new(r"^(mysql|percona|postgresql)-(basic|ha)-(\d+)$").expect("db type pattern is valid");
}

/// `<engine>-<mode>-<memory GB>`, e.g. `mysql-ha-4`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbInstanceType {
    pub engine: String,
    pub mode: String,
    /// In MB
    pub memory: i64,
}

impl DbInstanceType {
    pub fn parse(s: &str) -> Option<Self> {
        let captures = DB_INSTANCE_TYPE.captures(s)?;
        let memory_gb: i64 = captures[3].parse().ok()?;
        if !(1..=128).contains(&memory_gb) {
            return None;
        }
        Some(Self {
            engine: captures[1].to_owned(),
            mode: captures[2].to_owned(),
            memory: memory_gb * 1000,
        })
    }

    pub fn format(engine: &str, mode: &str, memory: i64) -> String {
        format!("{engine}-{mode}-{}", memory / 1000)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DbInstance {
    #[serde(rename = "DBId")]
    pub db_id: String,
    pub name: String,
    pub zone: String,
    pub db_type_id: String,
    pub instance_mode: String,
    pub memory_limit: i64,
    pub disk_space: i64,
    pub port: i64,
    pub state: String,
    #[serde(rename = "VPCId")]
    pub vpc_id: String,
    pub subnet_id: String,
    pub charge_type: String,
    pub create_time: i64,
    pub expired_time: i64,
}

impl DbInstance {
    /// Split `mysql-5.7` into engine and version
    pub fn engine_and_version(&self) -> (&str, &str) {
        self.db_type_id
            .split_once('-')
            .unwrap_or((self.db_type_id.as_str(), ""))
    }

    pub fn mode(&self) -> &str {
        if self.instance_mode == "HA" {
            "ha"
        } else {
            "basic"
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateDbInstanceRequest {
    pub zone: String,
    pub name: String,
    pub admin_password: String,
    #[serde(rename = "DBTypeId")]
    pub db_type_id: String,
    pub instance_mode: String,
    pub memory_limit: i64,
    pub disk_space: i64,
    pub port: i64,
    #[serde(rename = "VPCId", skip_serializing_if = "String::is_empty")]
    pub vpc_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub subnet_id: String,
    pub charge_type: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CreateDbInstanceResponse {
    #[serde(rename = "DBId")]
    pub db_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DescribeDbInstanceResponse {
    pub total_count: usize,
    pub data_set: Vec<DbInstance>,
}

impl Client {
    pub async fn describe_db_instance_by_id(&self, id: &str) -> Result<DbInstance, CloudError> {
        if id.is_empty() {
            return Err(CloudError::not_found("db instance", id));
        }
        let response: DescribeDbInstanceResponse = self
            .invoke(
                "DescribeDBInstance",
                &serde_json::json!({ "DBId": id, "Offset": 0, "Limit": 1 }),
            )
            .await?;
        first_or_not_found(response.data_set, "db instance", id)
    }
}
