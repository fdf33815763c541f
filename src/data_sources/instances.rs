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

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tf_provider::value::{Value, ValueNumber, ValueString};
use tf_provider::{schema::{AttributeType, Schema}, map, Diagnostics};

use crate::api::compute::{DescribeInstanceRequest, InstanceType};
use crate::api::{paginate, Client};
use crate::schema::{block_schema, computed, optional, optional_computed, string_list, string_map_list};
use crate::utils::{format_timestamp, hash_ids, known_strings, value_list, value_string};

use super::{check_name_regex, name_regex, record, CloudDataSource, Record, PAGE_LIMIT};

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstancesState<'a> {
    #[serde(borrow = "'a")]
    pub id: ValueString<'a>,
    pub availability_zone: ValueString<'a>,
    pub ids: Value<Vec<ValueString<'a>>>,
    pub tag: ValueString<'a>,
    pub name_regex: ValueString<'a>,
    pub instances: Value<Vec<Record<'a>>>,
    pub total_count: ValueNumber,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct InstancesDataSource;

#[async_trait]
impl CloudDataSource for InstancesDataSource {
    type State<'a> = InstancesState<'a>;
    const KIND: &'static str = "instances";

    fn schema(&self) -> Schema {
        block_schema(
            "Existing compute instances",
            map! {
                "availability_zone" => optional(AttributeType::String, "Only instances of this zone"),
                "ids" => optional_computed(string_list(), "Only these instances; set to the identifiers of the matching instances"),
                "tag" => optional(AttributeType::String, "Only instances of this business group"),
                "name_regex" => optional(AttributeType::String, "Only instances whose name matches this regular expression"),
                "instances" => computed(
                    string_map_list(),
                    "Matching instances: id, name, availability_zone, instance_type, cpu, memory, status, image_id, private_ip, vpc_id, subnet_id, tag, charge_type, create_time, expire_time",
                ),
                "total_count" => computed(AttributeType::Number, "Number of matching instances"),
            },
        )
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, config: &Self::State<'a>) {
        check_name_regex(diags, &config.name_regex);
    }

    async fn read<'a>(&self, client: &Client, mut config: Self::State<'a>) -> Result<Self::State<'a>> {
        let filter = name_regex(&config.name_regex)?;
        let request = DescribeInstanceRequest {
            zone: config.availability_zone.as_str().to_owned(),
            instance_ids: known_strings(&config.ids),
            tag: config.tag.as_str().to_owned(),
            ..Default::default()
        };

        let instances = paginate(PAGE_LIMIT, |offset, limit| {
            let request = DescribeInstanceRequest {
                offset,
                limit,
                ..request.clone()
            };
            async move { client.describe_instances(&request).await }
        })
        .await?;

        let instances = instances
            .into_iter()
            .filter(|instance| filter.as_ref().map_or(true, |re| re.is_match(&instance.name)))
            .collect::<Vec<_>>();
        log::debug!("{} instances matched", instances.len());

        let ids = instances
            .iter()
            .map(|instance| instance.instance_id.clone())
            .collect::<Vec<_>>();
        config.id = value_string(hash_ids(&ids));
        config.total_count = Value::Value(ids.len() as i64);
        config.ids = value_list(ids);
        config.instances = Value::Value(
            instances
                .into_iter()
                .map(|instance| {
                    let (private_ip, vpc_id, subnet_id) = instance
                        .private_ip()
                        .map(|ip| (ip.ip.clone(), ip.vpc_id.clone(), ip.subnet_id.clone()))
                        .unwrap_or_default();
                    record([
                        ("id", instance.instance_id),
                        ("name", instance.name),
                        ("availability_zone", instance.zone),
                        (
                            "instance_type",
                            InstanceType::format(&instance.host_type, instance.cpu, instance.memory),
                        ),
                        ("cpu", instance.cpu.to_string()),
                        ("memory", instance.memory.to_string()),
                        ("status", instance.state),
                        ("image_id", instance.image_id),
                        ("private_ip", private_ip),
                        ("vpc_id", vpc_id),
                        ("subnet_id", subnet_id),
                        ("tag", instance.tag),
                        ("charge_type", instance.charge_type),
                        ("create_time", format_timestamp(instance.create_time)),
                        ("expire_time", format_timestamp(instance.expire_time)),
                    ])
                })
                .collect(),
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::api::fake::FakeCloud;

    #[tokio::test]
    async fn list_by_ids_and_name() {
        let fake = FakeCloud::new();
        fake.respond(
            "DescribeInstance",
            json!({
                "RetCode": 0,
                "TotalCount": 2,
                "InstanceSet": [
                    {
                        "InstanceId": "uhost-1",
                        "Name": "web-1",
                        "Zone": "region-1-a",
                        "HostType": "N2",
                        "CPU": 2,
                        "Memory": 4096,
                        "State": "Running",
                        "IPSet": [{"IP": "10.0.0.5", "Type": "Private", "VPCId": "uvnet-1", "SubnetId": "subnet-1"}],
                    },
                    {"InstanceId": "uhost-2", "Name": "db-1", "State": "Stopped"},
                ],
            }),
        );

        let config = InstancesState {
            ids: value_list(["uhost-1".to_owned(), "uhost-2".to_owned()]),
            tag: value_string("web"),
            name_regex: value_string("^web-"),
            ..Default::default()
        };
        let state = InstancesDataSource.read(&fake.client(), config).await.unwrap();
        assert_eq!(known_strings(&state.ids), ["uhost-1"]);
        assert_eq!(state.total_count, Value::Value(1));
        assert_eq!(state.id.as_str(), hash_ids(["uhost-1"]));

        let call = &fake.calls("DescribeInstance")[0];
        assert_eq!(call["InstanceIds.0"], "uhost-1");
        assert_eq!(call["InstanceIds.1"], "uhost-2");
        assert_eq!(call["Tag"], "web");
        assert_eq!(call["Offset"], "0");

        let Value::Value(instances) = &state.instances else {
            panic!("instances are not known");
        };
        let Value::Value(web) = &instances[0] else {
            panic!("instance record is not known");
        };
        assert_eq!(web["instance_type"].as_str(), "n2-basic-2");
        assert_eq!(web["private_ip"].as_str(), "10.0.0.5");
        assert_eq!(web["subnet_id"].as_str(), "subnet-1");
    }

    #[tokio::test]
    async fn empty_listing() {
        let fake = FakeCloud::new();
        fake.respond(
            "DescribeInstance",
            json!({"RetCode": 0, "TotalCount": 0, "InstanceSet": []}),
        );

        let state = InstancesDataSource
            .read(&fake.client(), InstancesState::default())
            .await
            .unwrap();
        assert!(known_strings(&state.ids).is_empty());
        assert_eq!(state.total_count, Value::Value(0));
        assert!(!fake.calls("DescribeInstance")[0].contains_key("Zone"));
    }
}
