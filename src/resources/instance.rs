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
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tf_provider::value::{Value, ValueNumber, ValueString};
use tf_provider::{schema::{AttributeType, Schema}, map, AttributePath, Diagnostics};

use crate::api::compute::{
    CreateInstanceRequest, CreateInstanceResponse, InstanceType, INSTANCE_RUNNING, INSTANCE_STOPPED,
};
use crate::api::{Client, Empty};
use crate::schema::{block_schema, computed, optional, optional_computed, required, sensitive};
use crate::utils::{format_timestamp, str_or, unique_name, value_string, value_string_opt};
use crate::wait::StateChange;

use super::{computed_attributes, force_new, refreshed, CloudResource};

const CREATE_TIMEOUT: Duration = Duration::from_secs(10 * 60);
const UPDATE_TIMEOUT: Duration = Duration::from_secs(10 * 60);
const DELETE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceState<'a> {
    #[serde(borrow = "'a")]
    pub id: ValueString<'a>,
    pub availability_zone: ValueString<'a>,
    pub image_id: ValueString<'a>,
    pub instance_type: ValueString<'a>,
    pub root_password: ValueString<'a>,
    pub name: ValueString<'a>,
    pub tag: ValueString<'a>,
    pub remark: ValueString<'a>,
    pub vpc_id: ValueString<'a>,
    pub subnet_id: ValueString<'a>,
    pub security_group: ValueString<'a>,
    pub boot_disk_size: ValueNumber,
    pub user_data: ValueString<'a>,
    pub charge_type: ValueString<'a>,
    pub status: ValueString<'a>,
    pub cpu: ValueNumber,
    pub memory: ValueNumber,
    pub private_ip: ValueString<'a>,
    pub create_time: ValueString<'a>,
    pub expire_time: ValueString<'a>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct InstanceResource;

/// Wait for `id` to move from one of `pending` to one of `target`
async fn wait_instance(
    client: &Client,
    id: &str,
    pending: &[&str],
    target: &[&str],
    timeout: Duration,
) -> Result<()> {
    StateChange::new(pending, target, timeout)
        .wait_for_state(move || async move {
            refreshed(client.describe_instance_by_id(id).await, |instance| {
                instance.state.clone()
            })
        })
        .await
        .with_context(|| format!("waiting for instance `{id}`"))?;
    Ok(())
}

/// Stop a running instance and wait until it is stopped
///
/// Instances in any other state are left alone. Returns whether the instance
/// was running.
async fn ensure_stopped(client: &Client, id: &str) -> Result<bool> {
    let instance = client.describe_instance_by_id(id).await?;
    match instance.state.as_str() {
        INSTANCE_RUNNING => (),
        "Stopping" => {
            wait_instance(client, id, &["Stopping"], &[INSTANCE_STOPPED], UPDATE_TIMEOUT).await?;
            return Ok(false);
        }
        state => {
            log::debug!("instance `{id}` is `{state}`, not stopping it");
            return Ok(false);
        }
    }

    log::info!("stopping instance `{id}`");
    let _: Empty = client
        .invoke("StopInstance", &serde_json::json!({ "InstanceId": id }))
        .await?;
    wait_instance(client, id, &[INSTANCE_RUNNING, "Stopping"], &[INSTANCE_STOPPED], UPDATE_TIMEOUT).await?;
    Ok(true)
}

async fn start(client: &Client, id: &str) -> Result<()> {
    log::info!("starting instance `{id}`");
    let _: Empty = client
        .invoke("StartInstance", &serde_json::json!({ "InstanceId": id }))
        .await?;
    wait_instance(client, id, &[INSTANCE_STOPPED, "Starting"], &[INSTANCE_RUNNING], UPDATE_TIMEOUT).await
}

#[async_trait]
impl CloudResource for InstanceResource {
    type State<'a> = InstanceState<'a>;
    const KIND: &'static str = "instance";

    fn schema(&self) -> Schema {
        block_schema(
            "Virtual machine",
            map! {
                "availability_zone" => required(AttributeType::String, "Availability zone of the instance"),
                "image_id" => required(AttributeType::String, "Image to boot from"),
                "instance_type" => required(
                    AttributeType::String,
                    "Shape such as `n-standard-4` or `n-customized-4-12`; changing it stops the instance",
                ),
                "root_password" => sensitive(optional(AttributeType::String, "Password of the root user")),
                "name" => optional_computed(AttributeType::String, "Name of the instance"),
                "tag" => optional_computed(AttributeType::String, "Business group (default `Default`)"),
                "remark" => optional_computed(AttributeType::String, "Free-form remark"),
                "vpc_id" => optional_computed(AttributeType::String, "VPC of the instance"),
                "subnet_id" => optional_computed(AttributeType::String, "Subnet of the instance"),
                "security_group" => optional_computed(AttributeType::String, "Security group applied at creation"),
                "boot_disk_size" => optional_computed(AttributeType::Number, "Size of the boot disk in GB"),
                "user_data" => optional(AttributeType::String, "Data passed to the instance at boot"),
                "charge_type" => optional_computed(AttributeType::String, "Billing mode (default `Month`)"),
                "status" => computed(AttributeType::String, "Current state of the instance"),
                "cpu" => computed(AttributeType::Number, "Number of vCPUs"),
                "memory" => computed(AttributeType::Number, "Memory in MB"),
                "private_ip" => computed(AttributeType::String, "Private IP address"),
                "create_time" => computed(AttributeType::String, "Creation time (RFC 3339)"),
                "expire_time" => computed(AttributeType::String, "Expiration time (RFC 3339)"),
            },
        )
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, state: &Self::State<'a>) {
        if let Value::Value(instance_type) = &state.instance_type {
            if InstanceType::parse(instance_type).is_none() {
                diags.error(
                    "Invalid instance type",
                    format!(
                        "`{instance_type}` is neither `<family>-<basic|standard|highcpu|highmem>-<cpu>` nor `<family>-customized-<cpu>-<memory GB>`"
                    ),
                    AttributePath::new("instance_type"),
                );
            }
        }
        if let Value::Value(password) = &state.root_password {
            if password.len() < 8 {
                diags.error_short(
                    "`root_password` must be at least 8 characters long",
                    AttributePath::new("root_password"),
                );
            }
        }
        if let Value::Value(size) = &state.boot_disk_size {
            if *size <= 0 {
                diags.error_short(
                    "`boot_disk_size` must be positive",
                    AttributePath::new("boot_disk_size"),
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
        name,
        tag,
        remark,
        vpc_id,
        subnet_id,
        security_group,
        boot_disk_size,
        charge_type,
        status,
        cpu,
        memory,
        private_ip,
        create_time,
        expire_time,
    );

    fn requires_replace<'a>(
        &self,
        prior: &Self::State<'a>,
        proposed: &Self::State<'a>,
    ) -> Vec<AttributePath> {
        force_new!(
            prior, proposed;
            availability_zone,
            image_id,
            vpc_id,
            subnet_id,
            security_group,
            boot_disk_size,
            user_data,
            charge_type,
        )
    }

    fn plan_update<'a>(&self, prior: &Self::State<'a>, state: &mut Self::State<'a>) {
        if prior.instance_type != state.instance_type {
            state.cpu = Value::Unknown;
            state.memory = Value::Unknown;
        }
    }

    async fn create<'a>(&self, client: &Client, planned: &Self::State<'a>) -> Result<String> {
        let shape = InstanceType::parse(planned.instance_type.as_str())
            .with_context(|| format!("invalid instance type `{}`", planned.instance_type.as_str()))?;

        let response: CreateInstanceResponse = client
            .invoke(
                "CreateInstance",
                &CreateInstanceRequest {
                    zone: planned.availability_zone.as_str().to_owned(),
                    image_id: planned.image_id.as_str().to_owned(),
                    host_type: shape.host_type,
                    cpu: shape.cpu,
                    memory: shape.memory,
                    name: planned
                        .name
                        .as_deref_option()
                        .map_or_else(|| unique_name("instance"), str::to_owned),
                    tag: str_or(&planned.tag, "Default").to_owned(),
                    remark: planned.remark.as_str().to_owned(),
                    charge_type: str_or(&planned.charge_type, "Month").to_owned(),
                    password: planned
                        .root_password
                        .as_deref_option()
                        .map(|password| STANDARD.encode(password))
                        .unwrap_or_default(),
                    vpc_id: planned.vpc_id.as_str().to_owned(),
                    subnet_id: planned.subnet_id.as_str().to_owned(),
                    security_group_id: planned.security_group.as_str().to_owned(),
                    boot_disk_size: planned.boot_disk_size.as_ref_option().copied(),
                    user_data: planned
                        .user_data
                        .as_deref_option()
                        .map(|data| STANDARD.encode(data))
                        .unwrap_or_default(),
                },
            )
            .await?;

        response
            .instance_ids
            .into_iter()
            .next()
            .context("no instance id returned")
    }

    async fn wait_created<'a>(&self, client: &Client, state: &Self::State<'a>) -> Result<()> {
        wait_instance(
            client,
            state.id.as_str(),
            &["Initializing", "Starting"],
            &[INSTANCE_RUNNING],
            CREATE_TIMEOUT,
        )
        .await
    }

    async fn read<'a>(&self, client: &Client, mut state: Self::State<'a>) -> Result<Self::State<'a>> {
        let instance = client.describe_instance_by_id(state.id.as_str()).await?;

        state.availability_zone = value_string(instance.zone.as_str());
        state.image_id = value_string(instance.image_id.as_str());
        // Several names describe the same shape: keep the configured one unless it drifted
        let shape = InstanceType {
            host_type: instance.host_type.to_uppercase(),
            cpu: instance.cpu,
            memory: instance.memory,
        };
        let configured = state.instance_type.as_deref_option().and_then(InstanceType::parse);
        if configured.as_ref() != Some(&shape) {
            state.instance_type = value_string(InstanceType::format(
                &instance.host_type,
                instance.cpu,
                instance.memory,
            ));
        }
        state.name = value_string(instance.name.as_str());
        state.tag = value_string(instance.tag.as_str());
        state.remark = value_string(instance.remark.as_str());
        if let Some(ip) = instance.private_ip() {
            state.vpc_id = value_string(ip.vpc_id.as_str());
            state.subnet_id = value_string(ip.subnet_id.as_str());
            state.private_ip = value_string(ip.ip.as_str());
        }
        if let Some(disk) = instance.boot_disk() {
            state.boot_disk_size = Value::Value(disk.size);
        }
        state.charge_type = value_string(instance.charge_type.as_str());
        state.status = value_string(instance.state.as_str());
        state.cpu = Value::Value(instance.cpu);
        state.memory = Value::Value(instance.memory);
        state.create_time = value_string(format_timestamp(instance.create_time));
        state.expire_time = value_string_opt(format_timestamp(instance.expire_time));
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
                    "ModifyInstanceName",
                    &serde_json::json!({ "InstanceId": id, "Name": planned.name.as_str() }),
                )
                .await?;
        }
        if prior.remark != planned.remark {
            let _: Empty = client
                .invoke(
                    "ModifyInstanceRemark",
                    &serde_json::json!({ "InstanceId": id, "Remark": planned.remark.as_str() }),
                )
                .await?;
        }
        if prior.tag != planned.tag {
            let _: Empty = client
                .invoke(
                    "ModifyInstanceTag",
                    &serde_json::json!({ "InstanceId": id, "Tag": str_or(&planned.tag, "Default") }),
                )
                .await?;
        }

        let resize = prior.instance_type != planned.instance_type;
        let reset_password = prior.root_password != planned.root_password
            && matches!(planned.root_password, Value::Value(_));
        if !resize && !reset_password {
            return Ok(());
        }

        // Both operations need a stopped instance
        let was_running = ensure_stopped(client, id).await?;
        if resize {
            let shape = InstanceType::parse(planned.instance_type.as_str()).with_context(|| {
                format!("invalid instance type `{}`", planned.instance_type.as_str())
            })?;
            let _: Empty = client
                .invoke(
                    "ResizeInstance",
                    &serde_json::json!({
                        "InstanceId": id,
                        "CPU": shape.cpu,
                        "Memory": shape.memory,
                    }),
                )
                .await?;
        }
        if reset_password {
            let _: Empty = client
                .invoke(
                    "ResetInstancePassword",
                    &serde_json::json!({
                        "InstanceId": id,
                        "Password": STANDARD.encode(planned.root_password.as_str()),
                    }),
                )
                .await?;
        }
        if was_running {
            start(client, id).await?;
        }
        Ok(())
    }

    async fn delete<'a>(&self, client: &Client, state: &Self::State<'a>) -> Result<()> {
        let id = state.id.as_str();
        ensure_stopped(client, id).await?;

        let _: Empty = client
            .invoke(
                "TerminateInstance",
                &serde_json::json!({ "InstanceId": id, "ReleaseUDisk": true }),
            )
            .await?;

        StateChange::new(&["Deleting"], &[], DELETE_TIMEOUT)
            .wait_for_state(move || async move {
                refreshed(client.describe_instance_by_id(id).await, |_| "Deleting".to_owned())
            })
            .await
            .with_context(|| format!("waiting for instance `{id}` to be deleted"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::api::fake::FakeCloud;

    fn planned<'a>() -> InstanceState<'a> {
        InstanceState {
            availability_zone: value_string("zone-1"),
            image_id: value_string("image-1"),
            instance_type: value_string("n-standard-2"),
            root_password: value_string("s3cr3t-pass"),
            user_data: value_string("#!/bin/sh\necho hi"),
            ..Default::default()
        }
    }

    fn instance(state: &str) -> serde_json::Value {
        json!({
            "RetCode": 0,
            "TotalCount": 1,
            "InstanceSet": [{
                "InstanceId": "uhost-1",
                "Zone": "zone-1",
                "ImageId": "image-1",
                "State": state,
                "HostType": "N",
                "CPU": 2,
                "Memory": 8192,
                "ChargeType": "Month",
                "IPSet": [{"IP": "10.0.0.5", "Type": "Private", "VPCId": "uvnet-1", "SubnetId": "subnet-1"}],
                "DiskSet": [{"DiskId": "bsi-1", "Size": 20, "IsBoot": true}],
                "CreateTime": 1700000000,
            }],
        })
    }

    #[tokio::test]
    async fn create_instance() {
        let fake = FakeCloud::new();
        fake.respond("CreateInstance", json!({"RetCode": 0, "InstanceIds": ["uhost-1"]}));

        let id = InstanceResource.create(&fake.client(), &planned()).await.unwrap();
        assert_eq!(id, "uhost-1");

        let call = &fake.calls("CreateInstance")[0];
        assert_eq!(call["HostType"], "N");
        assert_eq!(call["CPU"], "2");
        assert_eq!(call["Memory"], "8192");
        assert_eq!(call["ChargeType"], "Month");
        assert_eq!(call["UserData"], STANDARD.encode("#!/bin/sh\necho hi"));
        assert_eq!(call["Password"], STANDARD.encode("s3cr3t-pass"));
        assert!(call["Name"].starts_with("tf-instance-"));
        assert!(!call.contains_key("BootDiskSize"));
    }

    #[tokio::test]
    async fn create_without_id_fails() {
        let fake = FakeCloud::new();
        fake.respond("CreateInstance", json!({"RetCode": 0, "InstanceIds": []}));
        assert!(InstanceResource.create(&fake.client(), &planned()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_until_running() {
        let fake = FakeCloud::new();
        fake.respond("DescribeInstance", instance("Initializing"))
            .respond("DescribeInstance", instance("Starting"))
            .respond("DescribeInstance", instance("Running"));

        let mut state = planned();
        state.id = value_string("uhost-1");
        InstanceResource
            .wait_created(&fake.client(), &state)
            .await
            .unwrap();
        assert_eq!(fake.calls("DescribeInstance").len(), 3);
    }

    #[tokio::test]
    async fn read_instance() {
        let fake = FakeCloud::new();
        fake.respond("DescribeInstance", instance("Running"));

        let mut state = planned();
        state.id = value_string("uhost-1");
        let state = InstanceResource.read(&fake.client(), state).await.unwrap();
        assert_eq!(state.instance_type.as_str(), "n-standard-2");
        assert_eq!(state.private_ip.as_str(), "10.0.0.5");
        assert_eq!(state.subnet_id.as_str(), "subnet-1");
        assert_eq!(state.boot_disk_size, Value::Value(20));
        assert_eq!(state.status.as_str(), "Running");
        assert!(state.expire_time.is_null());
        assert_eq!(state.root_password.as_str(), "s3cr3t-pass");
    }

    #[tokio::test(start_paused = true)]
    async fn resize_stops_and_restarts() {
        let fake = FakeCloud::new();
        fake.respond("DescribeInstance", instance("Running"))
            .respond("DescribeInstance", instance("Stopped"))
            .respond("DescribeInstance", instance("Running"));

        let mut prior = planned();
        prior.id = value_string("uhost-1");
        let mut resized = prior.clone();
        resized.instance_type = value_string("n-highmem-2");

        assert!(InstanceResource.requires_replace(&prior, &resized).is_empty());
        InstanceResource
            .update(&fake.client(), &prior, &resized)
            .await
            .unwrap();
        assert_eq!(
            fake.actions(),
            vec![
                "DescribeInstance",
                "StopInstance",
                "DescribeInstance",
                "ResizeInstance",
                "StartInstance",
                "DescribeInstance",
            ]
        );
        assert_eq!(fake.calls("ResizeInstance")[0]["Memory"], "16384");
    }

    #[tokio::test]
    async fn rename_does_not_stop() {
        let fake = FakeCloud::new();
        let mut prior = planned();
        prior.id = value_string("uhost-1");
        let mut renamed = prior.clone();
        renamed.name = value_string("web-1");

        InstanceResource
            .update(&fake.client(), &prior, &renamed)
            .await
            .unwrap();
        assert_eq!(fake.actions(), vec!["ModifyInstanceName"]);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_stops_then_terminates() {
        let fake = FakeCloud::new();
        fake.respond("DescribeInstance", instance("Running"))
            .respond("DescribeInstance", instance("Stopped"))
            .respond("DescribeInstance", json!({"RetCode": 0, "TotalCount": 0, "InstanceSet": []}));

        let mut state = planned();
        state.id = value_string("uhost-1");
        InstanceResource.delete(&fake.client(), &state).await.unwrap();
        assert_eq!(
            fake.actions(),
            vec![
                "DescribeInstance",
                "StopInstance",
                "DescribeInstance",
                "TerminateInstance",
                "DescribeInstance",
            ]
        );
    }

    #[tokio::test]
    async fn customized_type_is_kept_after_read() {
        let fake = FakeCloud::new();
        fake.respond("CreateInstance", json!({"RetCode": 0, "InstanceIds": ["uhost-1"]}));
        let mut shape = instance("Running");
        shape["InstanceSet"][0]["CPU"] = json!(4);
        shape["InstanceSet"][0]["Memory"] = json!(16384);
        fake.respond("DescribeInstance", shape);

        let mut state = planned();
        state.instance_type = value_string("n-customized-4-16");
        let id = InstanceResource.create(&fake.client(), &state).await.unwrap();
        assert_eq!(fake.calls("CreateInstance")[0]["Memory"], "16384");

        state.id = value_string(id);
        let state = InstanceResource.read(&fake.client(), state).await.unwrap();
        assert_eq!(state.instance_type.as_str(), "n-customized-4-16");
        assert_eq!(state.cpu, Value::Value(4));
    }

    #[tokio::test]
    async fn instance_type_follows_drift() {
        let fake = FakeCloud::new();
        let mut shape = instance("Running");
        shape["InstanceSet"][0]["CPU"] = json!(2);
        shape["InstanceSet"][0]["Memory"] = json!(2048);
        fake.respond("DescribeInstance", shape);

        let mut state = planned();
        state.id = value_string("uhost-1");
        state.instance_type = value_string("n-customized-2-4");
        let state = InstanceResource.read(&fake.client(), state).await.unwrap();
        assert_eq!(state.instance_type.as_str(), "n-highcpu-2");
    }

    #[tokio::test(start_paused = true)]
    async fn delete_failed_instance_without_stopping() {
        let fake = FakeCloud::new();
        fake.respond("DescribeInstance", instance("Install Fail"))
            .respond("DescribeInstance", json!({"RetCode": 0, "TotalCount": 0, "InstanceSet": []}));

        let mut state = planned();
        state.id = value_string("uhost-1");
        InstanceResource.delete(&fake.client(), &state).await.unwrap();
        assert_eq!(
            fake.actions(),
            vec!["DescribeInstance", "TerminateInstance", "DescribeInstance"]
        );
    }

    #[tokio::test]
    async fn validation() {
        let mut diags = Diagnostics::default();
        let mut state = planned();
        state.instance_type = value_string("n-large-2");
        state.root_password = value_string("short");
        state.boot_disk_size = Value::Value(0);
        InstanceResource.validate(&mut diags, &state).await;
        assert_eq!(diags.errors.len(), 3);
    }

    #[test]
    fn resize_plans_new_shape() {
        let prior = planned();
        let mut resized = planned();
        resized.instance_type = value_string("n-basic-2");
        resized.cpu = Value::Value(2);
        InstanceResource.plan_update(&prior, &mut resized);
        assert!(resized.cpu.is_unknown());
        assert!(resized.memory.is_unknown());

        let mut moved = planned();
        moved.availability_zone = value_string("zone-2");
        assert_eq!(InstanceResource.requires_replace(&prior, &moved).len(), 1);
    }
}
