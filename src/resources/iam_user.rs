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
use tf_provider::value::{Value, ValueString};
use tf_provider::{schema::{AttributeType, Schema}, map, AttributePath, Diagnostics};

use crate::api::iam::UserRequest;
use crate::api::{Client, Empty};
use crate::schema::{block_schema, computed, optional_computed, required};
use crate::utils::{format_timestamp, value_string};

use super::{computed_attributes, force_new, CloudResource};

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct IamUserState<'a> {
    #[serde(borrow = "'a")]
    pub id: ValueString<'a>,
    pub name: ValueString<'a>,
    pub display_name: ValueString<'a>,
    pub email: ValueString<'a>,
    pub status: ValueString<'a>,
    pub create_time: ValueString<'a>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct IamUserResource;

#[async_trait]
impl CloudResource for IamUserResource {
    type State<'a> = IamUserState<'a>;
    const KIND: &'static str = "iam user";

    fn schema(&self) -> Schema {
        block_schema(
            "Sub-account of the cloud account",
            map! {
                "name" => required(AttributeType::String, "Login name of the user"),
                "display_name" => optional_computed(AttributeType::String, "Name shown in the console"),
                "email" => optional_computed(AttributeType::String, "Contact address"),
                "status" => computed(AttributeType::String, "`Active` or `Inactive`"),
                "create_time" => computed(AttributeType::String, "Creation time (RFC 3339)"),
            },
        )
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, state: &Self::State<'a>) {
        if let Value::Value(name) = &state.name {
            let valid = !name.is_empty()
                && name.len() <= 64
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'));
            if !valid {
                diags.error(
                    "Invalid user name",
                    format!("`{name}` must be 1 to 64 letters, digits or `-_.@`"),
                    AttributePath::new("name"),
                );
            }
        }
        if let Value::Value(email) = &state.email {
            if !email.contains('@') {
                diags.error_short("`email` is not an email address", AttributePath::new("email"));
            }
        }
    }

    fn id<'s>(&self, state: &'s Self::State<'_>) -> &'s str {
        state.id.as_str()
    }

    fn set_id(&self, state: &mut Self::State<'_>, id: String) {
        state.id = value_string(id);
    }

    computed_attributes!(id, display_name, email, status, create_time);

    fn requires_replace<'a>(
        &self,
        prior: &Self::State<'a>,
        proposed: &Self::State<'a>,
    ) -> Vec<AttributePath> {
        force_new!(prior, proposed; name)
    }

    async fn create<'a>(&self, client: &Client, planned: &Self::State<'a>) -> Result<String> {
        let name = planned.name.as_str();
        let _: Empty = client
            .invoke(
                "CreateUser",
                &UserRequest {
                    user_name: name.to_owned(),
                    display_name: planned.display_name.as_str().to_owned(),
                    email: planned.email.as_str().to_owned(),
                },
            )
            .await?;
        // Users are identified by their name
        Ok(name.to_owned())
    }

    async fn read<'a>(&self, client: &Client, mut state: Self::State<'a>) -> Result<Self::State<'a>> {
        let user = client.describe_user_by_name(state.id.as_str()).await?;

        state.name = value_string(user.user_name);
        state.display_name = value_string(user.display_name);
        state.email = value_string(user.email);
        state.status = value_string(user.status);
        state.create_time = value_string(format_timestamp(user.created_at));
        Ok(state)
    }

    async fn update<'a>(
        &self,
        client: &Client,
        prior: &Self::State<'a>,
        planned: &Self::State<'a>,
    ) -> Result<()> {
        if prior.display_name != planned.display_name || prior.email != planned.email {
            let _: Empty = client
                .invoke(
                    "UpdateUser",
                    &UserRequest {
                        user_name: planned.id.as_str().to_owned(),
                        display_name: planned.display_name.as_str().to_owned(),
                        email: planned.email.as_str().to_owned(),
                    },
                )
                .await?;
        }
        Ok(())
    }

    async fn delete<'a>(&self, client: &Client, state: &Self::State<'a>) -> Result<()> {
        let _: Empty = client
            .invoke("DeleteUser", &serde_json::json!({ "UserName": state.id.as_str() }))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::api::fake::FakeCloud;
    use crate::api::is_not_found;

    #[tokio::test]
    async fn create_user_is_named_by_login() {
        let fake = FakeCloud::new();
        let planned = IamUserState {
            name: value_string("alice"),
            email: value_string("alice@example.com"),
            ..Default::default()
        };

        let id = IamUserResource.create(&fake.client(), &planned).await.unwrap();
        assert_eq!(id, "alice");
        let call = &fake.calls("CreateUser")[0];
        assert_eq!(call["UserName"], "alice");
        assert_eq!(call["Email"], "alice@example.com");
        assert!(!call.contains_key("DisplayName"));
    }

    #[tokio::test]
    async fn read_user() {
        let fake = FakeCloud::new();
        fake.respond(
            "DescribeUsers",
            json!({
                "RetCode": 0,
                "TotalCount": 2,
                "Users": [
                    {"UserName": "alice2", "Status": "Active"},
                    {"UserName": "alice", "DisplayName": "Alice", "Status": "Active", "CreatedAt": 1700000000},
                ],
            }),
        );

        let state = IamUserResource.import("alice").unwrap();
        let state = IamUserResource.read(&fake.client(), state).await.unwrap();
        assert_eq!(state.display_name.as_str(), "Alice");
        assert_eq!(state.status.as_str(), "Active");
        assert_eq!(state.create_time.as_str(), "2023-11-14T22:13:20Z");
    }

    #[tokio::test]
    async fn missing_user() {
        let fake = FakeCloud::new();
        fake.respond("DescribeUsers", json!({"RetCode": 0, "TotalCount": 0, "Users": []}));

        let state = IamUserResource.import("bob").unwrap();
        let err = IamUserResource.read(&fake.client(), state).await.unwrap_err();
        assert!(is_not_found(&err));
    }

    #[tokio::test]
    async fn validation() {
        let mut diags = Diagnostics::default();
        let state = IamUserState {
            name: value_string("bad name!"),
            email: value_string("nowhere"),
            ..Default::default()
        };
        IamUserResource.validate(&mut diags, &state).await;
        assert_eq!(diags.errors.len(), 2);
    }
}
