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

use crate::types;
use crate::types::error::NoNamespaceSnafu;
use crate::types::v1alpha1::k8s::PlacementMode;
use crate::types::v1alpha1::status::Condition;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::schemars::JsonSchema;
use kube::{CustomResource, KubeSchema, ResourceExt};
use serde::{Deserialize, Serialize};
use snafu::OptionExt;
use std::collections::BTreeMap;
use strum::Display;

/// Category under which cache runtimes register themselves on a dataset.
pub const ACCELERATE_CATEGORY: &str = "Accelerate";

const NATIVE_SCHEMES: [&str; 2] = ["local://", "pvc://"];

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
#[kube(
    group = "data.fluid.io",
    version = "v1alpha1",
    kind = "Dataset",
    namespaced,
    status = "DatasetStatus",
    derive = "PartialEq",
    shortname = "dataset",
    plural = "datasets",
    singular = "dataset",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#,
    crates(serde_json = "k8s_openapi::serde_json")
)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSpec {
    #[serde(default)]
    pub mounts: Vec<Mount>,

    /// Encrypt options applied to every mount.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shared_encrypt_options: Vec<EncryptOption>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_modes: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement: Option<PlacementMode>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<corev1::Toleration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_affinity: Option<CacheableNodeAffinity>,
}

#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Mount {
    pub mount_point: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,

    #[serde(default)]
    pub read_only: bool,

    #[serde(default)]
    pub shared: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub encrypt_options: Vec<EncryptOption>,
}

impl Mount {
    /// Native mounts are served by the cluster itself and never need credentials.
    pub fn is_native(&self) -> bool {
        NATIVE_SCHEMES
            .iter()
            .any(|scheme| self.mount_point.starts_with(scheme))
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EncryptOption {
    pub name: String,

    pub value_from: EncryptOptionSource,
}

#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EncryptOptionSource {
    pub secret_key_ref: SecretKeySelector,
}

#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeySelector {
    pub name: String,

    pub key: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CacheableNodeAffinity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<corev1::NodeSelector>,
}

#[derive(Default, Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, Display, PartialEq, Eq)]
pub enum DatasetPhase {
    #[serde(rename = "")]
    #[strum(to_string = "None")]
    #[default]
    None,

    #[strum(to_string = "NotBound")]
    NotBound,

    #[strum(to_string = "Bound")]
    Bound,

    #[strum(to_string = "Failed")]
    Failed,
}

#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DatasetStatus {
    #[serde(default)]
    pub phase: DatasetPhase,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Mounts as of the first binding.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<Mount>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub runtimes: Vec<RuntimeRef>,
}

/// A runtime bound to the dataset. At most one per category.
#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeRef {
    pub name: String,

    pub namespace: String,

    pub category: String,

    #[serde(rename = "type")]
    pub type_: String,
}

impl Dataset {
    pub fn namespace(&self) -> Result<String, types::error::Error> {
        ResourceExt::namespace(self).context(NoNamespaceSnafu)
    }

    pub fn name(&self) -> String {
        ResourceExt::name_any(self)
    }

    pub fn placement_mode(&self) -> PlacementMode {
        self.spec.placement.unwrap_or_default()
    }

    /// Whether a runtime with this identity is registered in the status.
    pub fn is_bound_to(&self, namespace: &str, name: &str) -> bool {
        self.status.as_ref().is_some_and(|status| {
            status.phase == DatasetPhase::Bound
                && status
                    .runtimes
                    .iter()
                    .any(|r| r.namespace == namespace && r.name == name)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    // Test: native schemes are recognized
    #[test]
    fn test_mount_is_native() {
        let local = Mount {
            mount_point: "local:///mnt/data".to_string(),
            ..Default::default()
        };
        let pvc = Mount {
            mount_point: "pvc://my-claim/sub".to_string(),
            ..Default::default()
        };
        let remote = Mount {
            mount_point: "s3://bucket/path".to_string(),
            ..Default::default()
        };

        assert!(local.is_native());
        assert!(pvc.is_native());
        assert!(!remote.is_native());
    }

    // Test: placement defaults to exclusive
    #[test]
    fn test_placement_default() {
        let mut dataset = crate::tests::create_test_dataset("hbase", "default", 1);
        assert_eq!(dataset.placement_mode(), PlacementMode::Exclusive);

        dataset.spec.placement = Some(PlacementMode::Shared);
        assert_eq!(dataset.placement_mode(), PlacementMode::Shared);
    }

    // Test: binding requires the Bound phase and a matching runtime entry
    #[test]
    fn test_is_bound_to() {
        let mut dataset = crate::tests::create_test_dataset("hbase", "default", 1);
        assert!(!dataset.is_bound_to("default", "hbase"));

        dataset.status = Some(DatasetStatus {
            phase: DatasetPhase::Bound,
            runtimes: vec![RuntimeRef {
                name: "hbase".to_string(),
                namespace: "default".to_string(),
                category: ACCELERATE_CATEGORY.to_string(),
                type_: "cache".to_string(),
            }],
            ..Default::default()
        });
        assert!(dataset.is_bound_to("default", "hbase"));
        assert!(!dataset.is_bound_to("other", "hbase"));
    }
}
