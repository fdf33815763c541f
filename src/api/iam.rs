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
pub struct User {
    pub user_name: String,
    pub display_name: String,
    pub email: String,
    pub status: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserRequest {
    pub user_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub email: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DescribeUsersResponse {
    pub total_count: usize,
    pub users: Vec<User>,
}

impl Client {
    pub async fn describe_user_by_name(&self, name: &str) -> Result<User, CloudError> {
        if name.is_empty() {
            return Err(CloudError::not_found("iam user", name));
        }
        let response: DescribeUsersResponse = self
            .invoke(
                "DescribeUsers",
                &serde_json::json!({ "UserNames": [name], "Offset": 0, "Limit": 1 }),
            )
            .await?;
        let users = response
            .users
            .into_iter()
            .filter(|user| user.user_name == name)
            .collect();
        first_or_not_found(users, "iam user", name)
    }
}
