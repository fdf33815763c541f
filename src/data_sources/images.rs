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
use tf_provider::{schema::{AttributeType, Schema}, map, AttributePath, Diagnostics};

use crate::api::compute::DescribeImageRequest;
use crate::api::{paginate, Client};
use crate::schema::{block_schema, computed, optional, string_list, string_map_list};
use crate::utils::{format_timestamp, hash_ids, value_list, value_string};

use super::{check_name_regex, name_regex, record, CloudDataSource, Record, PAGE_LIMIT};

const IMAGE_TYPES: &[&str] = &["Base", "Business", "Custom"];
const OS_TYPES: &[&str] = &["Linux", "Windows"];

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagesState<'a> {
    #[serde(borrow = "'a")]
    pub id: ValueString<'a>,
    pub availability_zone: ValueString<'a>,
    pub image_type: ValueString<'a>,
    pub os_type: ValueString<'a>,
    pub name_regex: ValueString<'a>,
    pub images: Value<Vec<Record<'a>>>,
    pub ids: Value<Vec<ValueString<'a>>>,
    pub total_count: ValueNumber,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ImagesDataSource;

#[async_trait]
impl CloudDataSource for ImagesDataSource {
    type State<'a> = ImagesState<'a>;
    const KIND: &'static str = "images";

    fn schema(&self) -> Schema {
        block_schema(
            "Machine images available to new instances",
            map! {
                "availability_zone" => optional(AttributeType::String, "Only images of this zone"),
                "image_type" => optional(AttributeType::String, "`Base`, `Business` or `Custom`"),
                "os_type" => optional(AttributeType::String, "`Linux` or `Windows`"),
                "name_regex" => optional(AttributeType::String, "Only images whose name matches this regular expression"),
                "images" => computed(string_map_list(), "Matching images: id, name, type, os_type, os_name, size, status, create_time"),
                "ids" => computed(string_list(), "Identifiers of the matching images"),
                "total_count" => computed(AttributeType::Number, "Number of matching images"),
            },
        )
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, config: &Self::State<'a>) {
        if let Value::Value(image_type) = &config.image_type {
            if !IMAGE_TYPES.contains(&&**image_type) {
                diags.error(
                    "Invalid image type",
                    format!("`{image_type}` is not one of {}", IMAGE_TYPES.join(", ")),
                    AttributePath::new("image_type"),
                );
            }
        }
        if let Value::Value(os_type) = &config.os_type {
            if !OS_TYPES.contains(&&**os_type) {
                diags.error(
                    "Invalid OS type",
                    format!("`{os_type}` is not one of {}", OS_TYPES.join(", ")),
                    AttributePath::new("os_type"),
                );
            }
        }
        check_name_regex(diags, &config.name_regex);
    }

    async fn read<'a>(&self, client: &Client, mut config: Self::State<'a>) -> Result<Self::State<'a>> {
        let filter = name_regex(&config.name_regex)?;
        let request = DescribeImageRequest {
            zone: config.availability_zone.as_str().to_owned(),
            image_type: config.image_type.as_str().to_owned(),
            os_type: config.os_type.as_str().to_owned(),
            ..Default::default()
        };

        let images = paginate(PAGE_LIMIT, |offset, limit| {
            let request = DescribeImageRequest {
                offset,
                limit,
                ..request.clone()
            };
            async move { client.describe_images(&request).await }
        })
        .await?;

        let images = images
            .into_iter()
            .filter(|image| filter.as_ref().map_or(true, |re| re.is_match(&image.image_name)))
            .collect::<Vec<_>>();
        log::debug!("{} images matched", images.len());

        let ids = images.iter().map(|image| image.image_id.clone()).collect::<Vec<_>>();
        config.id = value_string(hash_ids(&ids));
        config.total_count = Value::Value(ids.len() as i64);
        config.ids = value_list(ids);
        config.images = Value::Value(
            images
                .into_iter()
                .map(|image| {
                    record([
                        ("id", image.image_id),
                        ("name", image.image_name),
                        ("type", image.image_type),
                        ("os_type", image.os_type),
                        ("os_name", image.os_name),
                        ("size", image.image_size.to_string()),
                        ("status", image.state),
                        ("create_time", format_timestamp(image.create_time)),
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
    use crate::utils::known_strings;

    fn image_page() -> serde_json::Value {
        json!({
            "RetCode": 0,
            "TotalCount": 3,
            "ImageSet": [
                {"ImageId": "img-1", "ImageName": "centos-7", "ImageType": "Base", "OsType": "Linux", "ImageSize": 20, "State": "Available"},
                {"ImageId": "img-2", "ImageName": "ubuntu-22.04", "ImageType": "Base", "OsType": "Linux", "ImageSize": 20, "State": "Available"},
                {"ImageId": "img-3", "ImageName": "centos-8", "ImageType": "Base", "OsType": "Linux", "ImageSize": 40, "State": "Available", "CreateTime": 1700000000},
            ],
        })
    }

    #[tokio::test]
    async fn filter_by_name() {
        let fake = FakeCloud::new();
        fake.respond("DescribeImage", image_page());

        let config = ImagesState {
            availability_zone: value_string("region-1-a"),
            os_type: value_string("Linux"),
            name_regex: value_string("^centos"),
            ..Default::default()
        };
        let state = ImagesDataSource.read(&fake.client(), config).await.unwrap();
        assert_eq!(known_strings(&state.ids), ["img-1", "img-3"]);
        assert_eq!(state.total_count, Value::Value(2));

        let call = &fake.calls("DescribeImage")[0];
        assert_eq!(call["Zone"], "region-1-a");
        assert_eq!(call["OsType"], "Linux");
        assert!(!call.contains_key("ImageType"));

        let Value::Value(images) = &state.images else {
            panic!("images are not known");
        };
        let Value::Value(last) = &images[1] else {
            panic!("image record is not known");
        };
        assert_eq!(last["name"].as_str(), "centos-8");
        assert_eq!(last["size"].as_str(), "40");
        assert_eq!(last["create_time"].as_str(), "2023-11-14T22:13:20Z");
    }

    #[tokio::test]
    async fn validation() {
        let mut diags = Diagnostics::default();
        let config = ImagesState {
            image_type: value_string("Public"),
            os_type: value_string("Plan9"),
            name_regex: value_string("["),
            ..Default::default()
        };
        ImagesDataSource.validate(&mut diags, &config).await;
        assert_eq!(diags.errors.len(), 3);
    }
}
