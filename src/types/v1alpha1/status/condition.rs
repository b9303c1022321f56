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

use crate::types::v1alpha1::k8s::ConditionStatus;
use kube::KubeSchema;
use serde::{Deserialize, Serialize};
use strum::Display;

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum ConditionType {
    #[strum(to_string = "MasterInitialized")]
    MasterInitialized,

    #[strum(to_string = "MasterReady")]
    MasterReady,

    #[strum(to_string = "WorkersInitialized")]
    WorkersInitialized,

    #[strum(to_string = "WorkersReady")]
    WorkersReady,

    #[strum(to_string = "FusesInitialized")]
    FusesInitialized,

    #[strum(to_string = "FusesReady")]
    FusesReady,

    /// Dataset level: a runtime is bound and serving.
    #[strum(to_string = "Ready")]
    Ready,
}

impl ConditionType {
    pub fn reason(self) -> &'static str {
        match self {
            Self::MasterInitialized => "Master is initialized",
            Self::MasterReady => "Master is ready",
            Self::WorkersInitialized => "Workers are initialized",
            Self::WorkersReady => "Workers are ready",
            Self::FusesInitialized => "Fuses are initialized",
            Self::FusesReady => "Fuses are ready",
            Self::Ready => "The runtime is bound to the dataset",
        }
    }
}

/// A timestamped, reason-coded status entry keyed by `type`.
#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,

    pub status: ConditionStatus,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_probe_time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

impl Condition {
    pub fn new(
        type_: ConditionType,
        status: impl Into<ConditionStatus>,
        message: impl Into<String>,
        now: &str,
    ) -> Self {
        Self {
            type_: type_.to_string(),
            status: status.into(),
            reason: type_.reason().to_owned(),
            message: message.into(),
            last_probe_time: Some(now.to_owned()),
            last_transition_time: Some(now.to_owned()),
        }
    }
}

/// Inserts or updates a condition by type.
///
/// An entry whose status, reason and message are unchanged is left untouched so that
/// re-computing the same condition never produces a new status write. When only the
/// reason or message changes the transition time is kept.
pub fn upsert(conditions: &mut Vec<Condition>, condition: Condition) {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) if existing.status == condition.status => {
            if existing.reason != condition.reason || existing.message != condition.message {
                existing.reason = condition.reason;
                existing.message = condition.message;
                existing.last_probe_time = condition.last_probe_time;
            }
        }
        Some(existing) => *existing = condition,
        None => conditions.push(condition),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    // Test: unchanged status keeps the transition time
    #[test]
    fn test_upsert_preserves_transition_time() {
        let mut conditions = vec![Condition::new(
            ConditionType::WorkersReady,
            true,
            "3/3 ready",
            "2025-01-01T00:00:00Z",
        )];

        upsert(
            &mut conditions,
            Condition::new(
                ConditionType::WorkersReady,
                true,
                "4/4 ready",
                "2025-01-02T00:00:00Z",
            ),
        );

        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].message, "4/4 ready");
        assert_eq!(
            conditions[0].last_transition_time.as_deref(),
            Some("2025-01-01T00:00:00Z")
        );
        assert_eq!(
            conditions[0].last_probe_time.as_deref(),
            Some("2025-01-02T00:00:00Z")
        );
    }

    // Test: a status flip replaces the entry
    #[test]
    fn test_upsert_status_change() {
        let mut conditions = vec![Condition::new(
            ConditionType::MasterReady,
            false,
            "",
            "2025-01-01T00:00:00Z",
        )];

        upsert(
            &mut conditions,
            Condition::new(ConditionType::MasterReady, true, "", "2025-01-02T00:00:00Z"),
        );

        assert_eq!(conditions[0].status, ConditionStatus::True);
        assert_eq!(
            conditions[0].last_transition_time.as_deref(),
            Some("2025-01-02T00:00:00Z")
        );
    }

    // Test: identical condition is a no-op
    #[test]
    fn test_upsert_identical_is_noop() {
        let original = vec![Condition::new(
            ConditionType::FusesInitialized,
            true,
            "",
            "2025-01-01T00:00:00Z",
        )];
        let mut conditions = original.clone();

        upsert(
            &mut conditions,
            Condition::new(
                ConditionType::FusesInitialized,
                true,
                "",
                "2025-03-01T00:00:00Z",
            ),
        );

        assert_eq!(conditions, original);
    }
}
