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
use tf_provider::{schema::{AttributeType, Schema}, map};

use crate::api::Client;
use crate::schema::{block_schema, computed, string_list};
use crate::utils::{hash_ids, value_list, value_string};

use super::CloudDataSource;

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZonesState<'a> {
    #[serde(borrow = "'a")]
    pub id: ValueString<'a>,
    pub ids: Value<Vec<ValueString<'a>>>,
    pub total_count: ValueNumber,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ZonesDataSource;

#[async_trait]
impl CloudDataSource for ZonesDataSource {
    type State<'a> = ZonesState<'a>;
    const KIND: &'static str = "zones";

    fn schema(&self) -> Schema {
        block_schema(
            "Availability zones of the configured region",
            map! {
                "ids" => computed(string_list(), "Zone identifiers, sorted"),
                "total_count" => computed(AttributeType::Number, "Number of zones"),
            },
        )
    }

    async fn read<'a>(&self, client: &Client, mut config: Self::State<'a>) -> Result<Self::State<'a>> {
        let region = client.region();
        let mut ids = client
            .describe_zones()
            .await?
            .into_iter()
            .filter(|zone| zone.region.is_empty() || zone.region == region)
            .map(|zone| zone.zone)
            .collect::<Vec<_>>();
        ids.sort();
        log::debug!("found {} zones in region {region}", ids.len());

        config.id = value_string(hash_ids(&ids));
        config.total_count = Value::Value(ids.len() as i64);
        config.ids = value_list(ids);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::api::fake::FakeCloud;
    use crate::utils::known_strings;

    #[tokio::test]
    async fn zones_of_region() {
        let fake = FakeCloud::new();
        fake.respond(
            "DescribeZones",
            json!({
                "RetCode": 0,
                "Zones": [
                    {"Zone": "region-1-b", "Region": "region-1"},
                    {"Zone": "region-2-a", "Region": "region-2"},
                    {"Zone": "region-1-a", "Region": "region-1"},
                ],
            }),
        );

        let state = ZonesDataSource
            .read(&fake.client(), ZonesState::default())
            .await
            .unwrap();
        assert_eq!(known_strings(&state.ids), ["region-1-a", "region-1-b"]);
        assert_eq!(state.total_count, Value::Value(2));
        assert_eq!(state.id.as_str(), hash_ids(["region-1-a", "region-1-b"]));
    }
}
