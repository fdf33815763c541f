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

use crypto::{digest::Digest, sha1::Sha1};

use super::Params;

pub const SIGNATURE_KEY: &str = "Signature";

/// Compute the request signature
///
/// Keys are visited in ascending order, each key directly followed by its value,
/// then the private key is appended. The signature is the hex SHA-1 of the whole.
pub fn sign(params: &Params, private_key: &str) -> String {
    let mut digest = Sha1::new();
    for (key, value) in params {
        if key == SIGNATURE_KEY {
            continue;
        }
        digest.input_str(key);
        digest.input_str(value);
    }
    digest.input_str(private_key);
    digest.result_str()
}
