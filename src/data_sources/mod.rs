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

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tf_provider::value::{Value, ValueEmpty, ValueString};
use tf_provider::{schema::Schema, AttributePath, DataSource, Diagnostics};

use crate::api::Client;
use crate::provider::ProviderContext;
use crate::resources::report;
use crate::utils::value_string;

mod images;
mod instances;
mod zones;

pub use images::ImagesDataSource;
pub use instances::InstancesDataSource;
pub use zones::ZonesDataSource;

/// Page size of listing calls
const PAGE_LIMIT: usize = 100;

/// One object of a data source result
pub type Record<'a> = Value<BTreeMap<String, ValueString<'a>>>;

pub(crate) fn record<'a, const N: usize>(fields: [(&str, String); N]) -> Record<'a> {
    Value::Value(
        fields
            .into_iter()
            .map(|(key, value)| (key.to_owned(), value_string(value)))
            .collect(),
    )
}

/// Validate an optional `name_regex` attribute
pub(crate) fn check_name_regex(diags: &mut Diagnostics, name_regex: &ValueString<'_>) {
    if let Value::Value(pattern) = name_regex {
        if let Err(err) = Regex::new(pattern) {
            diags.error(
                "Invalid regular expression",
                err.to_string(),
                AttributePath::new("name_regex"),
            );
        }
    }
}

/// Compile an optional `name_regex` attribute
pub(crate) fn name_regex(name_regex: &ValueString<'_>) -> Result<Option<Regex>> {
    Ok(match name_regex.as_deref_option() {
        Some(pattern) => Some(Regex::new(pattern)?),
        None => None,
    })
}

/// Read-only listing of cloud objects
#[async_trait]
pub trait CloudDataSource: Send + Sync + Debug + 'static {
    type State<'a>: Send + Sync + Clone + Debug + Default + Serialize + Deserialize<'a>;

    /// Human readable kind, used in diagnostics
    const KIND: &'static str;

    fn schema(&self) -> Schema;

    async fn validate<'a>(&self, _diags: &mut Diagnostics, _config: &Self::State<'a>) {}

    /// Fill the computed attributes of `config`
    async fn read<'a>(&self, client: &Client, config: Self::State<'a>) -> Result<Self::State<'a>>;
}

#[derive(Debug)]
pub struct ManagedDataSource<D: CloudDataSource> {
    data_source: D,
    context: Arc<ProviderContext>,
}

impl<D: CloudDataSource> ManagedDataSource<D> {
    pub fn new(data_source: D, context: Arc<ProviderContext>) -> Self {
        Self {
            data_source,
            context,
        }
    }
}

#[async_trait]
impl<D: CloudDataSource> DataSource for ManagedDataSource<D> {
    type State<'a> = Value<D::State<'a>>;
    type ProviderMetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(self.data_source.schema())
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, config: Self::State<'a>) -> Option<()> {
        if let Value::Value(config) = &config {
            self.data_source.validate(diags, config).await;
        }

        if diags.errors.is_empty() {
            Some(())
        } else {
            None
        }
    }

    async fn read<'a>(
        &self,
        diags: &mut Diagnostics,
        config: Self::State<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<Self::State<'a>> {
        let config = match config {
            Value::Value(config) => config,
            other => return Some(other),
        };
        let client = self.context.client(diags)?;

        match self.data_source.read(client, config).await {
            Ok(state) => Some(Value::Value(state)),
            Err(err) => {
                report(diags, "read", D::KIND, &err);
                None
            }
        }
    }
}
