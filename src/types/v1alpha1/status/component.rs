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

use k8s_openapi::schemars::JsonSchema;
use kube::KubeSchema;
use serde::{Deserialize, Serialize};
use strum::Display;

/// Readiness of one component.
///
/// `None` is only ever observed before the first setup; the engine never writes it back.
#[derive(Default, Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, Display, PartialEq, Eq)]
pub enum RuntimePhase {
    #[serde(rename = "")]
    #[strum(to_string = "None")]
    #[default]
    None,

    #[strum(to_string = "NotReady")]
    NotReady,

    #[strum(to_string = "PartialReady")]
    PartialReady,

    #[strum(to_string = "Ready")]
    Ready,
}

impl RuntimePhase {
    /// Ready and PartialReady components can serve traffic.
    pub fn is_usable(self) -> bool {
        matches!(self, Self::Ready | Self::PartialReady)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    #[serde(default)]
    pub phase: RuntimePhase,

    #[serde(default)]
    pub ready_replicas: i32,

    #[serde(default)]
    pub desired_replicas: i32,
}

impl ComponentStatus {
    /// Derives the phase from replica counts. A component that wants no replicas is ready.
    pub fn from_replicas(ready_replicas: i32, desired_replicas: i32) -> Self {
        let phase = if desired_replicas <= 0 || ready_replicas == desired_replicas {
            RuntimePhase::Ready
        } else if ready_replicas > 0 && ready_replicas < desired_replicas {
            RuntimePhase::PartialReady
        } else {
            RuntimePhase::NotReady
        };

        Self {
            phase,
            ready_replicas,
            desired_replicas,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    // Test: zero desired replicas is vacuously ready
    #[test]
    fn test_zero_desired_is_ready() {
        for ready in [0, 1, 5] {
            let status = ComponentStatus::from_replicas(ready, 0);
            assert_eq!(
                status.phase,
                RuntimePhase::Ready,
                "desired=0 should be Ready regardless of ready={ready}"
            );
        }
    }

    // Test: partial and missing replicas
    #[test]
    fn test_phase_from_replicas() {
        assert_eq!(ComponentStatus::from_replicas(3, 3).phase, RuntimePhase::Ready);
        assert_eq!(
            ComponentStatus::from_replicas(1, 3).phase,
            RuntimePhase::PartialReady
        );
        assert_eq!(
            ComponentStatus::from_replicas(0, 3).phase,
            RuntimePhase::NotReady
        );
    }

    // Test: None serializes as the empty string
    #[test]
    fn test_none_phase_serializes_empty() {
        let json = serde_json::to_string(&RuntimePhase::None).unwrap();
        assert_eq!(json, "\"\"");
        assert!(!RuntimePhase::None.is_usable());
        assert!(RuntimePhase::PartialReady.is_usable());
    }
}
