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

use std::io::Write;

use anyhow::Result;
use tf_provider::serve;

mod api;
mod data_sources;
mod provider;
mod resources;
mod schema;
mod utils;
mod wait;

use crate::provider::CloudProvider;

/// Terraform captures the plugin stderr into its own log
fn init_logging() {
    let level = std::env::var("TF_LOG_PROVIDER")
        .or_else(|_| std::env::var("TF_LOG"))
        .map(|level| level.to_lowercase())
        .ok()
        .filter(|level| matches!(level.as_str(), "trace" | "debug" | "info" | "warn" | "error"))
        .unwrap_or_else(|| "warn".to_owned());

    env_logger::Builder::new()
        .parse_filters(&level)
        .target(env_logger::Target::Stderr)
        .format(|buf, record| {
            writeln!(buf, "[{}] {}: {}", record.level(), record.target(), record.args())
        })
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    serve("cloud", CloudProvider::default()).await
}
