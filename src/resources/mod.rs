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

use std::fmt::Debug;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tf_provider::value::{Value, ValueEmpty};
use tf_provider::{schema::Schema, AttributePath, Diagnostics, Resource};

use crate::api::{is_not_found, Client, CloudError};
use crate::provider::ProviderContext;

mod db_instance;
mod disk;
mod disk_attachment;
mod eip;
mod eip_association;
mod iam_user;
mod instance;
mod lb;
mod lb_listener;
mod security_group;
mod subnet;
mod vpc;

pub use db_instance::DbInstanceResource;
pub use disk::DiskResource;
pub use disk_attachment::DiskAttachmentResource;
pub use eip::EipResource;
pub use eip_association::EipAssociationResource;
pub use iam_user::IamUserResource;
pub use instance::InstanceResource;
pub use lb::LbResource;
pub use lb_listener::LbListenerResource;
pub use security_group::SecurityGroupResource;
pub use subnet::SubnetResource;
pub use vpc::VpcResource;

/// Implements `plan_create` and `settle` over the computed attributes of a state
///
/// Computed attributes left null by the configuration become unknown at plan
/// time, and any unknown left after apply is settled to null.
macro_rules! computed_attributes {
    ($($field:ident),* $(,)?) => {
        fn plan_create(&self, state: &mut Self::State<'_>) {
            $(
                if state.$field.is_null() {
                    state.$field = tf_provider::value::Value::Unknown;
                }
            )*
        }

        fn settle(&self, state: &mut Self::State<'_>) {
            $(
                if state.$field.is_unknown() {
                    state.$field = tf_provider::value::Value::Null;
                }
            )*
        }
    };
}

/// Attribute paths whose change forces the resource to be replaced
macro_rules! force_new {
    ($prior:expr, $proposed:expr; $($field:ident),* $(,)?) => {{
        let mut paths = Vec::new();
        $(
            if $prior.$field != $proposed.$field {
                paths.push(tf_provider::AttributePath::new(stringify!($field)));
            }
        )*
        paths
    }};
}

pub(crate) use computed_attributes;
pub(crate) use force_new;

/// Lifecycle of one cloud resource type
///
/// Implementors only deal with API calls and field mapping; Terraform plumbing
/// lives in [`ManagedResource`].
#[async_trait]
pub trait CloudResource: Send + Sync + Debug + 'static {
    type State<'a>: Send + Sync + Clone + Debug + Default + Serialize + Deserialize<'a>;

    /// Human readable kind, used in diagnostics
    const KIND: &'static str;

    fn schema(&self) -> Schema;

    async fn validate<'a>(&self, _diags: &mut Diagnostics, _state: &Self::State<'a>) {}

    fn id<'s>(&self, state: &'s Self::State<'_>) -> &'s str;
    fn set_id(&self, state: &mut Self::State<'_>, id: String);

    /// Mark computed attributes unknown before creation
    fn plan_create(&self, state: &mut Self::State<'_>);
    /// Replace unknown values left after apply by null
    fn settle(&self, state: &mut Self::State<'_>);

    fn requires_replace<'a>(
        &self,
        prior: &Self::State<'a>,
        proposed: &Self::State<'a>,
    ) -> Vec<AttributePath>;

    /// Mark attributes that an in-place update will change
    fn plan_update<'a>(&self, _prior: &Self::State<'a>, _state: &mut Self::State<'a>) {}

    /// Submit the creation and return the new identifier
    async fn create<'a>(&self, client: &Client, planned: &Self::State<'a>) -> Result<String>;

    /// Wait for a freshly created resource to become usable
    async fn wait_created<'a>(&self, _client: &Client, _state: &Self::State<'a>) -> Result<()> {
        Ok(())
    }

    async fn read<'a>(&self, client: &Client, state: Self::State<'a>) -> Result<Self::State<'a>>;

    async fn update<'a>(
        &self,
        client: &Client,
        prior: &Self::State<'a>,
        planned: &Self::State<'a>,
    ) -> Result<()>;

    async fn delete<'a>(&self, client: &Client, state: &Self::State<'a>) -> Result<()>;

    fn import<'a>(&self, id: &str) -> Result<Self::State<'a>> {
        let mut state: Self::State<'a> = Default::default();
        self.set_id(&mut state, id.to_owned());
        Ok(state)
    }
}

#[derive(Debug)]
pub struct ManagedResource<R: CloudResource> {
    resource: R,
    context: Arc<ProviderContext>,
}

impl<R: CloudResource> ManagedResource<R> {
    pub fn new(resource: R, context: Arc<ProviderContext>) -> Self {
        Self { resource, context }
    }
}

/// Adapt a describe result for [`crate::wait::StateChange`]
pub(crate) fn refreshed<T>(
    result: Result<T, CloudError>,
    status: impl FnOnce(&T) -> String,
) -> Result<Option<(T, String)>> {
    match result {
        Ok(value) => {
            let status = status(&value);
            Ok(Some((value, status)))
        }
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err.into()),
    }
}

pub(crate) fn report(diags: &mut Diagnostics, operation: &str, kind: &str, err: &anyhow::Error) {
    log::error!("{operation} {kind} failed: {err:#}");
    diags.root_error(format!("Failed to {operation} {kind}"), format!("{err:#}"));
}

#[async_trait]
impl<R: CloudResource> Resource for ManagedResource<R> {
    type State<'a> = Value<R::State<'a>>;
    type PrivateState<'a> = ValueEmpty;
    type ProviderMetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(self.resource.schema())
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, config: Self::State<'a>) -> Option<()> {
        if let Value::Value(config) = &config {
            self.resource.validate(diags, config).await;
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
        state: Self::State<'a>,
        private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let current = match state {
            Value::Value(current) => current,
            other => return Some((other, private_state)),
        };
        let id = self.resource.id(&current).to_owned();
        if id.is_empty() {
            return Some((Value::Value(current), private_state));
        }

        let client = self.context.client(diags)?;
        match self.resource.read(client, current).await {
            Ok(mut state) => {
                self.resource.settle(&mut state);
                Some((Value::Value(state), private_state))
            }
            Err(err) if is_not_found(&err) => {
                log::warn!("{} `{id}` not found, removing it from state", R::KIND);
                Some((Value::Null, private_state))
            }
            Err(err) => {
                report(diags, "read", R::KIND, &err);
                None
            }
        }
    }

    async fn plan_create<'a>(
        &self,
        _diags: &mut Diagnostics,
        proposed_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let mut state = match proposed_state {
            Value::Value(state) => state,
            other => return Some((other, Default::default())),
        };
        self.resource.plan_create(&mut state);

        Some((Value::Value(state), Default::default()))
    }

    async fn plan_update<'a>(
        &self,
        _diags: &mut Diagnostics,
        prior_state: Self::State<'a>,
        proposed_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        prior_private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(
        Self::State<'a>,
        Self::PrivateState<'a>,
        Vec<tf_provider::AttributePath>,
    )> {
        let (prior, mut state) = match (prior_state, proposed_state) {
            (Value::Value(prior), Value::Value(proposed)) => (prior, proposed),
            (_, proposed) => return Some((proposed, prior_private_state, Vec::new())),
        };

        let trigger_replace = self.resource.requires_replace(&prior, &state);
        if trigger_replace.is_empty() {
            self.resource.plan_update(&prior, &mut state);
        }

        Some((Value::Value(state), prior_private_state, trigger_replace))
    }

    async fn plan_destroy<'a>(
        &self,
        _diags: &mut Diagnostics,
        _prior_state: Self::State<'a>,
        prior_private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<Self::PrivateState<'a>> {
        Some(prior_private_state)
    }

    async fn create<'a>(
        &self,
        diags: &mut Diagnostics,
        planned_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let mut state = match planned_state {
            Value::Value(state) => state,
            other => return Some((other, private_state)),
        };
        let client = self.context.client(diags)?;

        let id = match self.resource.create(client, &state).await {
            Ok(id) => id,
            Err(err) => {
                report(diags, "create", R::KIND, &err);
                return None;
            }
        };
        log::info!("created {} `{id}`", R::KIND);
        self.resource.set_id(&mut state, id);

        // From now on the resource exists: failures keep it in state so it gets tainted
        let refreshed = match self.resource.wait_created(client, &state).await {
            Ok(()) => self.resource.read(client, state.clone()).await,
            Err(err) => Err(err),
        };
        let mut state = match refreshed {
            Ok(state) => state,
            Err(err) => {
                report(diags, "create", R::KIND, &err);
                state
            }
        };
        self.resource.settle(&mut state);

        Some((Value::Value(state), private_state))
    }

    async fn update<'a>(
        &self,
        diags: &mut Diagnostics,
        prior_state: Self::State<'a>,
        planned_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let (prior, planned) = match (prior_state, planned_state) {
            (Value::Value(prior), Value::Value(planned)) => (prior, planned),
            (_, planned) => return Some((planned, private_state)),
        };
        let client = self.context.client(diags)?;

        if let Err(err) = self.resource.update(client, &prior, &planned).await {
            report(diags, "update", R::KIND, &err);
            let mut prior = prior;
            self.resource.settle(&mut prior);
            return Some((Value::Value(prior), private_state));
        }

        let mut state = match self.resource.read(client, planned.clone()).await {
            Ok(state) => state,
            Err(err) => {
                report(diags, "update", R::KIND, &err);
                planned
            }
        };
        self.resource.settle(&mut state);

        Some((Value::Value(state), private_state))
    }

    async fn destroy<'a>(
        &self,
        diags: &mut Diagnostics,
        state: Self::State<'a>,
        _planned_private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<()> {
        let Value::Value(state) = &state else {
            return Some(());
        };
        let id = self.resource.id(state);
        if id.is_empty() {
            return Some(());
        }
        let client = self.context.client(diags)?;

        match self.resource.delete(client, state).await {
            Ok(()) => {
                log::info!("deleted {} `{id}`", R::KIND);
                Some(())
            }
            Err(err) if is_not_found(&err) => {
                log::warn!("{} `{id}` was already deleted", R::KIND);
                Some(())
            }
            Err(err) => {
                report(diags, "delete", R::KIND, &err);
                None
            }
        }
    }

    async fn import<'a>(
        &self,
        diags: &mut Diagnostics,
        id: String,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        match self.resource.import(&id) {
            Ok(state) => Some((Value::Value(state), Default::default())),
            Err(err) => {
                report(diags, "import", R::KIND, &err);
                None
            }
        }
    }
}
