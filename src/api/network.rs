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

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Vpc {
    #[serde(rename = "VPCId")]
    pub vpc_id: String,
    pub name: String,
    pub tag: String,
    pub remark: String,
    pub network: Vec<String>,
    pub create_time: i64,
    pub update_time: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateVpcRequest {
    pub name: String,
    pub network: Vec<String>,
    pub tag: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub remark: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CreateVpcResponse {
    #[serde(rename = "VPCId")]
    pub vpc_id: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeVpcRequest {
    #[serde(rename = "VPCIds")]
    pub vpc_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DescribeVpcResponse {
    pub data_set: Vec<Vpc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Subnet {
    pub subnet_id: String,
    pub subnet_name: String,
    #[serde(rename = "VPCId")]
    pub vpc_id: String,
    pub subnet: String,
    pub netmask: String,
    pub tag: String,
    pub remark: String,
    pub create_time: i64,
}

impl Subnet {
    pub fn cidr_block(&self) -> String {
        format!("{}/{}", self.subnet, self.netmask)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateSubnetRequest {
    #[serde(rename = "VPCId")]
    pub vpc_id: String,
    pub subnet: String,
    pub netmask: u8,
    pub subnet_name: String,
    pub tag: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub remark: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CreateSubnetResponse {
    pub subnet_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DescribeSubnetResponse {
    pub total_count: usize,
    pub data_set: Vec<Subnet>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Firewall {
    #[serde(rename = "FWId")]
    pub fw_id: String,
    pub name: String,
    pub tag: String,
    pub remark: String,
    pub rule: Vec<FirewallRule>,
    pub create_time: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct FirewallRule {
    pub proto_type: String,
    pub dst_port: String,
    #[serde(rename = "SrcIP")]
    pub src_ip: String,
    pub rule_action: String,
    pub priority: String,
}

impl FirewallRule {
    /// Parse a `PROTO|PORT|CIDR|ACTION|PRIORITY` rule
    pub fn parse(rule: &str) -> Option<Self> {
        let mut parts = rule.split('|').map(str::trim);
        let rule = Self {
            proto_type: parts.next()?.to_uppercase(),
            dst_port: parts.next()?.to_owned(),
            src_ip: parts.next()?.to_owned(),
            rule_action: parts.next()?.to_uppercase(),
            priority: parts.next()?.to_uppercase(),
        };
        if parts.next().is_some()
            || rule.proto_type.is_empty()
            || rule.src_ip.is_empty()
            || !matches!(rule.rule_action.as_str(), "ACCEPT" | "DROP")
            || !matches!(rule.priority.as_str(), "HIGH" | "MEDIUM" | "LOW")
        {
            return None;
        }
        Some(rule)
    }
}

impl std::fmt::Display for FirewallRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}|{}",
            self.proto_type, self.dst_port, self.src_ip, self.rule_action, self.priority
        )
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateFirewallRequest {
    pub name: String,
    pub rule: Vec<String>,
    pub tag: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub remark: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CreateFirewallResponse {
    #[serde(rename = "FWId")]
    pub fw_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DescribeFirewallResponse {
    pub data_set: Vec<Firewall>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Eip {
    #[serde(rename = "EIPId")]
    pub eip_id: String,
    pub name: String,
    pub tag: String,
    pub remark: String,
    pub bandwidth: i64,
    pub pay_mode: String,
    pub status: String,
    #[serde(rename = "EIPAddr")]
    pub eip_addr: Vec<EipAddr>,
    pub resource: EipBoundResource,
    pub create_time: i64,
    pub expire_time: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct EipAddr {
    pub operator_name: String,
    #[serde(rename = "IP")]
    pub ip: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct EipBoundResource {
    pub resource_id: String,
    pub resource_type: String,
    pub resource_name: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AllocateEipRequest {
    pub operator_name: String,
    pub bandwidth: i64,
    pub pay_mode: String,
    pub charge_type: String,
    pub name: String,
    pub tag: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub remark: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AllocateEipResponse {
    #[serde(rename = "EIPSet")]
    pub eip_set: Vec<Eip>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DescribeEipResponse {
    #[serde(rename = "EIPSet")]
    pub eip_set: Vec<Eip>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct EipBindingRequest {
    #[serde(rename = "EIPId")]
    pub eip_id: String,
    pub resource_type: String,
    pub resource_id: String,
}

impl Client {
    pub async fn describe_vpc_by_id(&self, id: &str) -> Result<Vpc, CloudError> {
        if id.is_empty() {
            return Err(CloudError::not_found("vpc", id));
        }
        let response: DescribeVpcResponse = self
            .invoke(
                "DescribeVPC",
                &DescribeVpcRequest {
                    vpc_ids: vec![id.to_owned()],
                },
            )
            .await?;
        first_or_not_found(response.data_set, "vpc", id)
    }

    pub async fn describe_subnet_by_id(&self, id: &str) -> Result<Subnet, CloudError> {
        if id.is_empty() {
            return Err(CloudError::not_found("subnet", id));
        }
        let response: DescribeSubnetResponse = self
            .invoke(
                "DescribeSubnet",
                &serde_json::json!({ "SubnetIds": [id], "Offset": 0, "Limit": 1 }),
            )
            .await?;
        first_or_not_found(response.data_set, "subnet", id)
    }

    pub async fn describe_firewall_by_id(&self, id: &str) -> Result<Firewall, CloudError> {
        if id.is_empty() {
            return Err(CloudError::not_found("security group", id));
        }
        let response: DescribeFirewallResponse = self
            .invoke("DescribeFirewall", &serde_json::json!({ "FWId": id }))
            .await?;
        first_or_not_found(response.data_set, "security group", id)
    }

    pub async fn describe_eip_by_id(&self, id: &str) -> Result<Eip, CloudError> {
        if id.is_empty() {
            return Err(CloudError::not_found("eip", id));
        }
        let response: DescribeEipResponse = self
            .invoke("DescribeEIP", &serde_json::json!({ "EIPIds": [id] }))
            .await?;
        first_or_not_found(response.eip_set, "eip", id)
    }
}
