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

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::utils::DisplayJoinable;

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum WaitError {
    #[error("timeout after {timeout:?} while waiting for state to become `{expected}` (last state: `{last_state}`)")]
    Timeout {
        timeout: Duration,
        last_state: String,
        expected: String,
    },
    #[error("unexpected state `{state}`, wanted target `{expected}`")]
    UnexpectedState { state: String, expected: String },
    #[error("couldn't find resource ({checks} retries)")]
    NotFound { checks: usize },
    #[error(transparent)]
    Refresh(anyhow::Error),
}

/// Polls a refresh function until the observed status reaches a target
///
/// A refresh returns `None` when the resource does not exist. With an empty
/// `target`, a missing resource is the goal (deletion); otherwise too many
/// consecutive misses abort the wait.
#[derive(Debug, Clone)]
pub struct StateChange<'s> {
    pub pending: &'s [&'s str],
    pub target: &'s [&'s str],
    pub timeout: Duration,
    pub delay: Duration,
    pub min_timeout: Duration,
    pub poll_interval: Duration,
    pub not_found_checks: usize,
    pub continuous_target_occurence: usize,
}

impl<'s> StateChange<'s> {
    pub fn new(pending: &'s [&'s str], target: &'s [&'s str], timeout: Duration) -> Self {
        Self {
            pending,
            target,
            timeout,
            delay: Duration::from_secs(3),
            min_timeout: Duration::from_secs(2),
            poll_interval: Duration::ZERO,
            not_found_checks: 20,
            continuous_target_occurence: 1,
        }
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn min_timeout(mut self, min_timeout: Duration) -> Self {
        self.min_timeout = min_timeout;
        self
    }

    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn not_found_checks(mut self, checks: usize) -> Self {
        self.not_found_checks = checks;
        self
    }

    pub fn continuous_target_occurence(mut self, occurence: usize) -> Self {
        self.continuous_target_occurence = occurence.max(1);
        self
    }

    fn expected(&self) -> String {
        if self.target.is_empty() {
            "<deleted>".to_owned()
        } else {
            self.target.iter().join_with(", ").to_string()
        }
    }

    /// Wait until the refreshed status is a target
    ///
    /// Returns the last refreshed value, or `None` if the target was the resource disappearing.
    pub async fn wait_for_state<T, F, Fut>(&self, mut refresh: F) -> Result<Option<T>, WaitError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<Option<(T, String)>>>,
    {
        let mut last_state = String::new();
        let result =
            tokio::time::timeout(self.timeout, self.poll(&mut refresh, &mut last_state)).await;
        match result {
            Ok(result) => result,
            Err(_) => Err(WaitError::Timeout {
                timeout: self.timeout,
                last_state,
                expected: self.expected(),
            }),
        }
    }

    async fn poll<T, F, Fut>(
        &self,
        refresh: &mut F,
        last_state: &mut String,
    ) -> Result<Option<T>, WaitError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<Option<(T, String)>>>,
    {
        tokio::time::sleep(self.delay).await;

        let mut wait = INITIAL_BACKOFF;
        let mut target_occurence = 0;
        let mut not_found_tick = 0;

        loop {
            match refresh().await.map_err(WaitError::Refresh)? {
                None => {
                    if self.target.is_empty() {
                        target_occurence += 1;
                        if target_occurence >= self.continuous_target_occurence {
                            log::debug!("resource is gone");
                            return Ok(None);
                        }
                    } else {
                        not_found_tick += 1;
                        if not_found_tick > self.not_found_checks {
                            return Err(WaitError::NotFound {
                                checks: self.not_found_checks,
                            });
                        }
                    }
                }
                Some((value, state)) => {
                    not_found_tick = 0;
                    if *last_state != state {
                        log::debug!("state changed: `{last_state}` -> `{state}`");
                    }

                    if self.target.contains(&state.as_str()) {
                        target_occurence += 1;
                        if target_occurence >= self.continuous_target_occurence {
                            *last_state = state;
                            return Ok(Some(value));
                        }
                    } else if self.pending.contains(&state.as_str()) {
                        target_occurence = 0;
                    } else if !self.pending.is_empty() {
                        return Err(WaitError::UnexpectedState {
                            state,
                            expected: self.expected(),
                        });
                    }
                    *last_state = state;
                }
            }

            // Backoff is frozen while the target state must reoccur
            if target_occurence == 0 {
                wait = wait.saturating_mul(2);
            }
            wait = if !self.poll_interval.is_zero() {
                self.poll_interval
            } else {
                wait.max(self.min_timeout).min(MAX_BACKOFF)
            };
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use tokio::time::Instant;

    use super::*;

    /// Replays scripted refresh results, repeating the last one
    fn scripted(
        states: &[Option<&str>],
    ) -> (
        Arc<Mutex<usize>>,
        impl FnMut() -> std::future::Ready<anyhow::Result<Option<(usize, String)>>>,
    ) {
        let calls = Arc::new(Mutex::new(0));
        let mut queue: VecDeque<Option<String>> =
            states.iter().map(|s| s.map(str::to_owned)).collect();
        let counter = calls.clone();
        let refresh = move || {
            let mut calls = counter.lock().unwrap();
            *calls += 1;
            let state = if queue.len() > 1 {
                queue.pop_front().flatten()
            } else {
                queue.front().cloned().flatten()
            };
            std::future::ready(Ok(state.map(|s| (*calls, s))))
        };
        (calls, refresh)
    }

    #[tokio::test(start_paused = true)]
    async fn reaches_target() {
        let (calls, refresh) = scripted(&[Some("Initializing"), Some("Starting"), Some("Running")]);
        let result = StateChange::new(
            &["Initializing", "Starting"],
            &["Running"],
            Duration::from_secs(60),
        )
        .wait_for_state(refresh)
        .await
        .unwrap();

        assert_eq!(result, Some(3));
        assert_eq!(*calls.lock().unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn fixed_poll_interval() {
        let (_, refresh) = scripted(&[Some("Creating"), Some("Creating"), Some("Available")]);
        let start = Instant::now();
        StateChange::new(&["Creating"], &["Available"], Duration::from_secs(60))
            .delay(Duration::from_secs(1))
            .poll_interval(Duration::from_secs(5))
            .wait_for_state(refresh)
            .await
            .unwrap();

        assert_eq!(start.elapsed(), Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_is_clamped() {
        let (_, refresh) = scripted(&[Some("Creating"), Some("Creating"), Some("Available")]);
        let start = Instant::now();
        StateChange::new(&["Creating"], &["Available"], Duration::from_secs(60))
            .delay(Duration::ZERO)
            .min_timeout(Duration::from_secs(2))
            .wait_for_state(refresh)
            .await
            .unwrap();

        // 200ms is raised to the 2s minimum, which then doubles
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn unexpected_state() {
        let (_, refresh) = scripted(&[Some("Initializing"), Some("Install Fail")]);
        let err = StateChange::new(&["Initializing"], &["Running"], Duration::from_secs(60))
            .wait_for_state(refresh)
            .await
            .unwrap_err();

        match err {
            WaitError::UnexpectedState { state, expected } => {
                assert_eq!(state, "Install Fail");
                assert_eq!(expected, "Running");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_reports_last_state() {
        let (_, refresh) = scripted(&[Some("Stopping")]);
        let err = StateChange::new(&["Stopping"], &["Stopped"], Duration::from_secs(30))
            .wait_for_state(refresh)
            .await
            .unwrap_err();

        match err {
            WaitError::Timeout {
                last_state,
                expected,
                timeout,
            } => {
                assert_eq!(last_state, "Stopping");
                assert_eq!(expected, "Stopped");
                assert_eq!(timeout, Duration::from_secs(30));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn deletion_target() {
        let (calls, refresh) = scripted(&[Some("Deleting"), Some("Deleting"), None]);
        let result = StateChange::new(&["Deleting"], &[], Duration::from_secs(60))
            .wait_for_state(refresh)
            .await
            .unwrap();

        assert_eq!(result, None);
        assert_eq!(*calls.lock().unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn too_many_not_found() {
        let (calls, refresh) = scripted(&[None]);
        let err = StateChange::new(&["Creating"], &["Available"], Duration::from_secs(600))
            .not_found_checks(3)
            .wait_for_state(refresh)
            .await
            .unwrap_err();

        assert!(matches!(err, WaitError::NotFound { checks: 3 }));
        assert_eq!(*calls.lock().unwrap(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_counter_resets() {
        let (_, refresh) = scripted(&[
            None,
            None,
            Some("Creating"),
            None,
            None,
            Some("Available"),
        ]);
        let result = StateChange::new(&["Creating"], &["Available"], Duration::from_secs(600))
            .not_found_checks(2)
            .wait_for_state(refresh)
            .await
            .unwrap();

        assert_eq!(result, Some(6));
    }

    #[tokio::test(start_paused = true)]
    async fn continuous_target() {
        let (calls, refresh) = scripted(&[
            Some("Running"),
            Some("Starting"),
            Some("Running"),
            Some("Running"),
        ]);
        let result = StateChange::new(&["Starting"], &["Running"], Duration::from_secs(600))
            .continuous_target_occurence(2)
            .wait_for_state(refresh)
            .await
            .unwrap();

        assert_eq!(result, Some(4));
        assert_eq!(*calls.lock().unwrap(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_error() {
        let err = StateChange::new(&["Creating"], &["Available"], Duration::from_secs(60))
            .wait_for_state(|| async { Err::<Option<((), String)>, _>(anyhow::anyhow!("boom")) })
            .await
            .unwrap_err();

        assert!(matches!(err, WaitError::Refresh(_)));
        assert_eq!(err.to_string(), "boom");
    }
}
