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

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tf_provider::value::{Value, ValueNumber, ValueString};
use tf_provider::{value::ValueEmpty, schema::{AttributeType, Block, Description, Schema}, map, AttributePath, Diagnostics, Provider};

use crate::api::{Client, HttpTransport, TransportConfig};
use crate::data_sources::{ImagesDataSource, InstancesDataSource, ManagedDataSource, ZonesDataSource};
use crate::resources::{
    DbInstanceResource, DiskAttachmentResource, DiskResource, EipAssociationResource, EipResource,
    IamUserResource, InstanceResource, LbListenerResource, LbResource, ManagedResource,
    SecurityGroupResource, SubnetResource, VpcResource,
};
use crate::schema::{optional, required, sensitive};
use crate::utils::number_or;

const DEFAULT_MAX_RETRIES: i64 = 3;

/// State shared between the provider and the resources it registers
///
/// Resources are handed out before Terraform configures the provider, so the
/// client is published here once `configure` runs.
#[derive(Debug, Default)]
pub struct ProviderContext {
    client: OnceLock<Client>,
}

impl ProviderContext {
    pub fn with_client(client: Client) -> Self {
        let context = Self::default();
        _ = context.client.set(client);
        context
    }

    pub fn client(&self, diags: &mut Diagnostics) -> Option<&Client> {
        let client = self.client.get();
        if client.is_none() {
            diags.root_error(
                "Provider is not configured",
                "The cloud provider must be configured before managing resources.",
            );
        }
        client
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ProviderConfig<'a> {
    #[serde(borrow = "'a")]
    pub base_url: ValueString<'a>,
    pub region: ValueString<'a>,
    pub project_id: ValueString<'a>,
    pub public_key: ValueString<'a>,
    pub private_key: ValueString<'a>,
    pub max_retries: ValueNumber,
    pub insecure: Value<bool>,
}

impl<'a> ProviderConfig<'a> {
    fn check(&self, diags: &mut Diagnostics) {
        for (name, value) in [
            ("base_url", &self.base_url),
            ("region", &self.region),
            ("public_key", &self.public_key),
            ("private_key", &self.private_key),
        ] {
            if let Value::Value(value) = value {
                if value.trim().is_empty() {
                    diags.error_short(format!("`{name}` must not be empty"), AttributePath::new(name));
                }
            }
        }

        if let Value::Value(url) = &self.base_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                diags.error(
                    "Invalid `base_url`",
                    format!("`{url}` is not an http(s) URL"),
                    AttributePath::new("base_url"),
                );
            }
        }

        if let Value::Value(retries) = &self.max_retries {
            if *retries < 0 {
                diags.error_short(
                    "`max_retries` must be positive or zero",
                    AttributePath::new("max_retries"),
                );
            }
        }
    }

    fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            base_url: self.base_url.as_str().to_owned(),
            public_key: self.public_key.as_str().to_owned(),
            private_key: self.private_key.as_str().to_owned(),
            max_retries: number_or(&self.max_retries, DEFAULT_MAX_RETRIES).clamp(0, u32::MAX as i64)
                as u32,
            insecure: self.insecure.as_ref_option().copied().unwrap_or(false),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct CloudProvider {
    context: Arc<ProviderContext>,
}

impl CloudProvider {
    pub fn new(context: Arc<ProviderContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl Provider for CloudProvider {
    type Config<'a> = ProviderConfig<'a>;
    type MetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut tf_provider::Diagnostics) -> Option<tf_provider::schema::Schema> {
        Some(Schema {
            version: 1,
            block: Block {
                description: Description::plain("cloud"),
                attributes: map! {
                    "base_url" => required(AttributeType::String, "Endpoint of the cloud API"),
                    "region" => required(AttributeType::String, "Region where resources are managed"),
                    "project_id" => optional(AttributeType::String, "Project owning the resources"),
                    "public_key" => required(AttributeType::String, "API public key"),
                    "private_key" => sensitive(required(AttributeType::String, "API private key used to sign requests")),
                    "max_retries" => optional(AttributeType::Number, "Retries of failed API requests (default 3)"),
                    "insecure" => optional(AttributeType::Bool, "Skip TLS certificate verification"),
                },
                ..Default::default()
            },
        })
    }

    async fn validate<'a>(
        &self,
        diags: &mut tf_provider::Diagnostics,
        config: Self::Config<'a>,
    ) -> Option<()> {
        config.check(diags);

        if diags.errors.is_empty() {
            Some(())
        } else {
            None
        }
    }

    async fn configure<'a>(
        &self,
        diags: &mut tf_provider::Diagnostics,
        terraform_version: String,
        config: Self::Config<'a>,
    ) -> Option<()> {
        config.check(diags);
        if !diags.errors.is_empty() {
            return None;
        }

        let transport = match HttpTransport::new(config.transport_config()) {
            Ok(transport) => transport,
            Err(err) => {
                diags.root_error("Failed to configure provider", format!("{err:#}"));
                return None;
            }
        };
        let client = Client::new(
            Arc::new(transport),
            config.region.as_str(),
            config.project_id.as_str(),
        );

        log::info!(
            "configured for region `{}` (terraform {terraform_version})",
            client.region()
        );
        if self.context.client.set(client).is_err() {
            diags.root_warning(
                "Provider already configured",
                "The provider was configured more than once; the first configuration is kept.",
            );
        }
        Some(())
    }

    fn get_resources(
        &self,
        _diags: &mut tf_provider::Diagnostics,
    ) -> Option<HashMap<String, Box<dyn tf_provider::DynamicResource>>> {
        let ctx = &self.context;
        Some(map! {
            "cloud_vpc" => ManagedResource::new(VpcResource, ctx.clone()),
            "cloud_subnet" => ManagedResource::new(SubnetResource, ctx.clone()),
            "cloud_security_group" => ManagedResource::new(SecurityGroupResource, ctx.clone()),
            "cloud_instance" => ManagedResource::new(InstanceResource, ctx.clone()),
            "cloud_disk" => ManagedResource::new(DiskResource, ctx.clone()),
            "cloud_disk_attachment" => ManagedResource::new(DiskAttachmentResource, ctx.clone()),
            "cloud_eip" => ManagedResource::new(EipResource, ctx.clone()),
            "cloud_eip_association" => ManagedResource::new(EipAssociationResource, ctx.clone()),
            "cloud_lb" => ManagedResource::new(LbResource, ctx.clone()),
            "cloud_lb_listener" => ManagedResource::new(LbListenerResource, ctx.clone()),
            "cloud_db_instance" => ManagedResource::new(DbInstanceResource, ctx.clone()),
            "cloud_iam_user" => ManagedResource::new(IamUserResource, ctx.clone()),
        })
    }

    fn get_data_sources(
        &self,
        _diags: &mut tf_provider::Diagnostics,
    ) -> Option<HashMap<String, Box<dyn tf_provider::DynamicDataSource>>> {
        let ctx = &self.context;
        Some(map! {
            "cloud_zones" => ManagedDataSource::new(ZonesDataSource, ctx.clone()),
            "cloud_images" => ManagedDataSource::new(ImagesDataSource, ctx.clone()),
            "cloud_instances" => ManagedDataSource::new(InstancesDataSource, ctx.clone()),
        })
    }
}
