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


pub mod component;
pub mod condition;

use crate::types::v1alpha1::cache_runtime::Role;
use kube::KubeSchema;
use serde::{Deserialize, Serialize};

pub use component::{ComponentStatus, RuntimePhase};
pub use condition::{Condition, ConditionType};

/// Observed state of a CacheRuntime.
#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    #[serde(default)]
    pub master: ComponentStatus,

    #[serde(default)]
    pub worker: ComponentStatus,

    #[serde(default)]
    pub client: ComponentStatus,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Time between creation and the first moment master and workers were ready, e.g. `1m30s`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_duration: Option<String>,

    /// Name of the ConfigMap holding the generated runtime configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_file: Option<String>,
}

impl Status {
    pub fn component(&self, role: Role) -> &ComponentStatus {
        match role {
            Role::Master => &self.master,
            Role::Worker => &self.worker,
            Role::Client => &self.client,
        }
    }

    pub fn component_mut(&mut self, role: Role) -> &mut ComponentStatus {
        match role {
            Role::Master => &mut self.master,
            Role::Worker => &mut self.worker,
            Role::Client => &mut self.client,
        }
    }
}
