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

use crate::api::db::{CreateDbInstanceRequest, CreateDbInstanceResponse, DbInstanceType, DB_RUNNING, DB_SHUTOFF};
use crate::api::{Client, Empty};
use crate::schema::{block_schema, computed, optional_computed, required, sensitive};
use crate::utils::{format_timestamp, number_or, unique_name, value_string, value_string_opt};
use crate::wait::StateChange;

use super::{computed_attributes, force_new, refreshed, CloudResource};

const CREATE_TIMEOUT: Duration = Duration::from_secs(20 * 60);
const UPDATE_TIMEOUT: Duration = Duration::from_secs(20 * 60);
const DELETE_TIMEOUT: Duration = Duration::from_secs(20 * 60);

const ENGINES: &[&str] = &["mysql", "percona", "postgresql"];

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbInstanceState<'a> {
    #[serde(borrow = "'a")]
    pub id: ValueString<'a>,
    pub availability_zone: ValueString<'a>,
    pub engine: ValueString<'a>,
    pub engine_version: ValueString<'a>,
    pub name: ValueString<'a>,
    pub password: ValueString<'a>,
    pub instance_type: ValueString<'a>,
    pub instance_storage: ValueNumber,
    pub port: ValueNumber,
    pub vpc_id: ValueString<'a>,
    pub subnet_id: ValueString<'a>,
    pub status: ValueString<'a>,
    pub create_time: ValueString<'a>,
    pub expire_time: ValueString<'a>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DbInstanceResource;

fn default_port(engine: &str) -> i64 {
    if engine == "postgresql" {
        5432
    } else {
        3306
    }
}

async fn wait_db(
    client: &Client,
    id: &str,
    pending: &[&str],
    target: &[&str],
    timeout: Duration,
) -> Result<()> {
    StateChange::new(pending, target, timeout)
        .wait_for_state(move || async move {
            refreshed(client.describe_db_instance_by_id(id).await, |db| db.state.clone())
        })
        .await
        .with_context(|| format!("waiting for db instance `{id}`"))?;
    Ok(())
}

#[async_trait]
impl CloudResource for DbInstanceResource {
    type State<'a> = DbInstanceState<'a>;
    const KIND: &'static str = "db instance";

    fn schema(&self) -> Schema {
        block_schema(
            "Managed database instance",
            map! {
                "availability_zone" => required(AttributeType::String, "Availability zone of the instance"),
                "engine" => required(AttributeType::String, "One of `mysql`, `percona` or `postgresql`"),
                "engine_version" => required(AttributeType::String, "Version of the engine, such as `5.7`"),
                "name" => optional_computed(AttributeType::String, "Name of the instance"),
                "password" => sensitive(required(AttributeType::String, "Password of the admin user")),
                "instance_type" => required(AttributeType::String, "Shape such as `mysql-ha-4`: engine, `basic` or `ha`, memory in GB"),
                "instance_storage" => required(AttributeType::Number, "Storage in GB, a multiple of 10"),
                "port" => optional_computed(AttributeType::Number, "Listening port (default 3306, or 5432 for postgresql)"),
                "vpc_id" => optional_computed(AttributeType::String, "VPC of the instance"),
                "subnet_id" => optional_computed(AttributeType::String, "Subnet of the instance"),
                "status" => computed(AttributeType::String, "Current state of the instance"),
                "create_time" => computed(AttributeType::String, "Creation time (RFC 3339)"),
                "expire_time" => computed(AttributeType::String, "Expiration time (RFC 3339)"),
            },
        )
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, state: &Self::State<'a>) {
        if let Value::Value(engine) = &state.engine {
            if !ENGINES.contains(&&**engine) {
                diags.error(
                    "Invalid engine",
                    format!("`{engine}` is not one of {}", ENGINES.join(", ")),
                    AttributePath::new("engine"),
                );
            }
        }
        if let Value::Value(instance_type) = &state.instance_type {
            match DbInstanceType::parse(instance_type) {
                None => diags.error(
                    "Invalid instance type",
                    format!("`{instance_type}` does not match `<engine>-<basic|ha>-<memory GB>`"),
                    AttributePath::new("instance_type"),
                ),
                Some(parsed) => {
                    if let Value::Value(engine) = &state.engine {
                        if parsed.engine != *engine {
                            diags.error(
                                "Instance type does not match the engine",
                                format!("`{instance_type}` is not a `{engine}` instance type"),
                                AttributePath::new("instance_type"),
                            );
                        }
                    }
                }
            }
        }
        if let Value::Value(storage) = &state.instance_storage {
            if !(20..=3000).contains(storage) || storage % 10 != 0 {
                diags.error_short(
                    "`instance_storage` must be a multiple of 10 between 20 and 3000",
                    AttributePath::new("instance_storage"),
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

    computed_attributes!(id, name, port, vpc_id, subnet_id, status, create_time, expire_time);

    fn requires_replace<'a>(
        &self,
        prior: &Self::State<'a>,
        proposed: &Self::State<'a>,
    ) -> Vec<AttributePath> {
        let mut paths = force_new!(
            prior, proposed;
            availability_zone,
            engine,
            engine_version,
            port,
            vpc_id,
            subnet_id,
        );
        // Switching between basic and ha needs a new instance
        let mode = |state: &Self::State<'a>| {
            DbInstanceType::parse(state.instance_type.as_str()).map(|shape| shape.mode)
        };
        if mode(prior) != mode(proposed) {
            paths.push(AttributePath::new("instance_type"));
        }
        paths
    }

    fn plan_update<'a>(&self, prior: &Self::State<'a>, state: &mut Self::State<'a>) {
        if prior.instance_type != state.instance_type || prior.instance_storage != state.instance_storage {
            state.status = Value::Unknown;
        }
    }

    async fn create<'a>(&self, client: &Client, planned: &Self::State<'a>) -> Result<String> {
        let shape = DbInstanceType::parse(planned.instance_type.as_str())
            .with_context(|| format!("invalid instance type `{}`", planned.instance_type.as_str()))?;
        let engine = planned.engine.as_str();

        let response: CreateDbInstanceResponse = client
            .invoke(
                "CreateDBInstance",
                &CreateDbInstanceRequest {
                    zone: planned.availability_zone.as_str().to_owned(),
                    name: planned
                        .name
                        .as_deref_option()
                        .map_or_else(|| unique_name("db"), str::to_owned),
                    admin_password: planned.password.as_str().to_owned(),
                    db_type_id: format!("{engine}-{}", planned.engine_version.as_str()),
                    instance_mode: if shape.mode == "ha" { "HA" } else { "Normal" }.to_owned(),
                    memory_limit: shape.memory,
                    disk_space: number_or(&planned.instance_storage, 20),
                    port: number_or(&planned.port, default_port(engine)),
                    vpc_id: planned.vpc_id.as_str().to_owned(),
                    subnet_id: planned.subnet_id.as_str().to_owned(),
                    charge_type: "Month".to_owned(),
                },
            )
            .await?;
        Ok(response.db_id)
    }

    async fn wait_created<'a>(&self, client: &Client, state: &Self::State<'a>) -> Result<()> {
        wait_db(
            client,
            state.id.as_str(),
            &["Init", "Creating"],
            &[DB_RUNNING],
            CREATE_TIMEOUT,
        )
        .await
    }

    async fn read<'a>(&self, client: &Client, mut state: Self::State<'a>) -> Result<Self::State<'a>> {
        let db = client.describe_db_instance_by_id(state.id.as_str()).await?;
        let (engine, version) = db.engine_and_version();

        state.availability_zone = value_string(db.zone.as_str());
        state.engine = value_string(engine);
        state.engine_version = value_string(version);
        state.instance_type = value_string(DbInstanceType::format(engine, db.mode(), db.memory_limit));
        state.name = value_string(db.name.as_str());
        state.instance_storage = Value::Value(db.disk_space);
        state.port = Value::Value(db.port);
        state.vpc_id = value_string_opt(db.vpc_id.as_str());
        state.subnet_id = value_string_opt(db.subnet_id.as_str());
        state.status = value_string(db.state.as_str());
        state.create_time = value_string(format_timestamp(db.create_time));
        state.expire_time = value_string_opt(format_timestamp(db.expired_time));
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
                    "ModifyDBInstanceName",
                    &serde_json::json!({ "DBId": id, "Name": planned.name.as_str() }),
                )
                .await?;
        }

        if prior.password != planned.password {
            let _: Empty = client
                .invoke(
                    "ResetDBAdminPassword",
                    &serde_json::json!({ "DBId": id, "Password": planned.password.as_str() }),
                )
                .await?;
        }

        if prior.instance_type != planned.instance_type || prior.instance_storage != planned.instance_storage {
            let shape = DbInstanceType::parse(planned.instance_type.as_str()).with_context(|| {
                format!("invalid instance type `{}`", planned.instance_type.as_str())
            })?;
            let _: Empty = client
                .invoke(
                    "ResizeDBInstance",
                    &serde_json::json!({
                        "DBId": id,
                        "MemoryLimit": shape.memory,
                        "DiskSpace": number_or(&planned.instance_storage, 20),
                    }),
                )
                .await?;
            wait_db(client, id, &["Resizing", "Upgrading"], &[DB_RUNNING], UPDATE_TIMEOUT).await?;
        }
        Ok(())
    }

    async fn delete<'a>(&self, client: &Client, state: &Self::State<'a>) -> Result<()> {
        let id = state.id.as_str();

        let db = client.describe_db_instance_by_id(id).await?;
        if db.state != DB_SHUTOFF {
            log::info!("stopping db instance `{id}`");
            let _: Empty = client
                .invoke("StopDBInstance", &serde_json::json!({ "DBId": id }))
                .await?;
            wait_db(client, id, &[DB_RUNNING, "Shutdown"], &[DB_SHUTOFF], DELETE_TIMEOUT).await?;
        }

        let _: Empty = client
            .invoke("DeleteDBInstance", &serde_json::json!({ "DBId": id }))
            .await?;

        StateChange::new(&["Deleting"], &[], DELETE_TIMEOUT)
            .wait_for_state(move || async move {
                refreshed(client.describe_db_instance_by_id(id).await, |_| "Deleting".to_owned())
            })
            .await
            .with_context(|| format!("waiting for db instance `{id}` to be deleted"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::api::fake::FakeCloud;

    fn planned<'a>() -> DbInstanceState<'a> {
        DbInstanceState {
            availability_zone: value_string("zone-1"),
            engine: value_string("mysql"),
            engine_version: value_string("5.7"),
            password: value_string("s3cr3t-pass"),
            instance_type: value_string("mysql-ha-4"),
            instance_storage: Value::Value(50),
            ..Default::default()
        }
    }

    fn db(state: &str) -> serde_json::Value {
        json!({
            "RetCode": 0,
            "DataSet": [{
                "DBId": "udb-1",
                "Name": "orders",
                "Zone": "zone-1",
                "DBTypeId": "mysql-5.7",
                "InstanceMode": "HA",
                "MemoryLimit": 4000,
                "DiskSpace": 50,
                "Port": 3306,
                "State": state,
                "CreateTime": 1700000000,
            }],
        })
    }

    #[tokio::test]
    async fn create_db_instance() {
        let fake = FakeCloud::new();
        fake.respond("CreateDBInstance", json!({"RetCode": 0, "DBId": "udb-1"}));

        let id = DbInstanceResource.create(&fake.client(), &planned()).await.unwrap();
        assert_eq!(id, "udb-1");

        let call = &fake.calls("CreateDBInstance")[0];
        assert_eq!(call["DBTypeId"], "mysql-5.7");
        assert_eq!(call["InstanceMode"], "HA");
        assert_eq!(call["MemoryLimit"], "4000");
        assert_eq!(call["DiskSpace"], "50");
        assert_eq!(call["Port"], "3306");
    }

    #[tokio::test(start_paused = true)]
    async fn create_waits_then_reads() {
        let fake = FakeCloud::new();
        fake.respond("DescribeDBInstance", db("Init"))
            .respond("DescribeDBInstance", db("Creating"))
            .respond("DescribeDBInstance", db(DB_RUNNING));

        let mut state = planned();
        state.id = value_string("udb-1");
        DbInstanceResource.wait_created(&fake.client(), &state).await.unwrap();
        let state = DbInstanceResource.read(&fake.client(), state).await.unwrap();
        assert_eq!(state.instance_type.as_str(), "mysql-ha-4");
        assert_eq!(state.engine_version.as_str(), "5.7");
        assert_eq!(state.status.as_str(), DB_RUNNING);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_stops_first() {
        let fake = FakeCloud::new();
        fake.respond("DescribeDBInstance", db(DB_RUNNING))
            .respond("DescribeDBInstance", db(DB_SHUTOFF))
            .respond("DescribeDBInstance", json!({"RetCode": 0, "DataSet": []}));

        let mut state = planned();
        state.id = value_string("udb-1");
        DbInstanceResource.delete(&fake.client(), &state).await.unwrap();
        assert_eq!(
            fake.actions(),
            vec![
                "DescribeDBInstance",
                "StopDBInstance",
                "DescribeDBInstance",
                "DeleteDBInstance",
                "DescribeDBInstance",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn resize_waits_for_running() {
        let fake = FakeCloud::new();
        fake.respond("DescribeDBInstance", db("Resizing"))
            .respond("DescribeDBInstance", db(DB_RUNNING));

        let mut prior = planned();
        prior.id = value_string("udb-1");
        let mut grown = prior.clone();
        grown.instance_type = value_string("mysql-ha-8");

        assert!(DbInstanceResource.requires_replace(&prior, &grown).is_empty());
        DbInstanceResource.update(&fake.client(), &prior, &grown).await.unwrap();
        assert_eq!(fake.calls("ResizeDBInstance")[0]["MemoryLimit"], "8000");
        assert_eq!(fake.calls("DescribeDBInstance").len(), 2);
    }

    #[test]
    fn mode_change_forces_replacement() {
        let prior = planned();
        let mut basic = planned();
        basic.instance_type = value_string("mysql-basic-4");
        assert_eq!(DbInstanceResource.requires_replace(&prior, &basic).len(), 1);
    }

    #[tokio::test]
    async fn validation() {
        let mut diags = Diagnostics::default();
        let mut state = planned();
        state.instance_type = value_string("postgresql-ha-4");
        state.instance_storage = Value::Value(25);
        DbInstanceResource.validate(&mut diags, &state).await;
        assert_eq!(diags.errors.len(), 2);
    }
}
