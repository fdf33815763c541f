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

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value as Json};

use super::{Client, CloudApi, CloudError, Params};

/// In-memory stand-in for the vendor API
///
/// Responses are queued per action; the last queued response of an action is
/// replayed once the queue is drained. Unknown actions answer an empty success.
#[derive(Debug, Default, Clone)]
pub(crate) struct FakeCloud {
    inner: Arc<Mutex<FakeState>>,
}

#[derive(Debug, Default)]
struct FakeState {
    responses: HashMap<String, VecDeque<Json>>,
    calls: Vec<(String, Params)>,
}

impl FakeCloud {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn client(&self) -> Client {
        Client::new(Arc::new(self.clone()), "region-1", "project-1")
    }

    /// Queue a response for `action`
    pub(crate) fn respond(&self, action: &str, response: Json) -> &Self {
        self.inner
            .lock()
            .unwrap()
            .responses
            .entry(action.to_owned())
            .or_default()
            .push_back(response);
        self
    }

    /// Parameters of every call made to `action`, in order
    pub(crate) fn calls(&self, action: &str) -> Vec<Params> {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(name, _)| name == action)
            .map(|(_, params)| params.clone())
            .collect()
    }

    /// Names of every action called, in order
    pub(crate) fn actions(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[async_trait]
impl CloudApi for FakeCloud {
    async fn call(&self, action: &str, params: Params) -> Result<Json, CloudError> {
        let mut state = self.inner.lock().unwrap();
        state.calls.push((action.to_owned(), params));
        let response = match state.responses.get_mut(action) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        Ok(response.unwrap_or_else(|| json!({"RetCode": 0})))
    }
}
