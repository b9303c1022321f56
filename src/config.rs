// Copyright 2025 RustFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
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

use crate::engine::DEFAULT_GRACEFUL_SHUTDOWN_LIMITS;
use clap::Args;
use std::time::Duration;

/// Controller settings, taken from flags or the environment.
#[derive(Args, Clone, Debug, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Seconds between two reconciles of a runtime or a waiting operation.
    #[arg(long, env = "CACHE_OPERATOR_RESYNC_PERIOD", default_value_t = 60)]
    pub resync_period: u64,

    /// Seconds before a failed reconcile is retried.
    #[arg(long, env = "CACHE_OPERATOR_ERROR_REQUEUE", default_value_t = 5)]
    pub error_requeue: u64,

    /// Failed cache clean attempts tolerated before teardown proceeds without it.
    #[arg(long, env = "CACHE_OPERATOR_GRACEFUL_SHUTDOWN_LIMITS", default_value_t = DEFAULT_GRACEFUL_SHUTDOWN_LIMITS)]
    pub graceful_shutdown_limits: u32,

    /// Watch a single namespace instead of the whole cluster.
    #[arg(long, env = "CACHE_OPERATOR_NAMESPACE")]
    pub namespace: Option<String>,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            resync_period: 60,
            error_requeue: 5,
            graceful_shutdown_limits: DEFAULT_GRACEFUL_SHUTDOWN_LIMITS,
            namespace: None,
        }
    }
}

impl OperatorConfig {
    pub fn resync_period(&self) -> Duration {
        Duration::from_secs(self.resync_period)
    }

    pub fn error_requeue(&self) -> Duration {
        Duration::from_secs(self.error_requeue)
    }
}
