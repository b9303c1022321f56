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

//! Label and annotation keys shared with the scheduler plugins and the CSI driver.

use std::collections::BTreeMap;

pub const LABEL_PREFIX: &str = "fluid.io/";

pub const STORAGE_LABEL_PREFIX: &str = const_str::concat!(LABEL_PREFIX, "s-");

pub const FUSE_LABEL_PREFIX: &str = const_str::concat!(LABEL_PREFIX, "f-");

pub const RUNTIME_TYPE: &str = "cache";

/// Node label claiming a node for one exclusive dataset, valued `<namespace>_<name>`.
pub const EXCLUSIVE_LABEL: &str = "fluid_exclusive";

pub const DATASET_LABEL: &str = const_str::concat!(LABEL_PREFIX, "dataset");

pub const DATASET_PLACEMENT_LABEL: &str = const_str::concat!(LABEL_PREFIX, "dataset-placement");

pub const DATASET_ID_LABEL: &str = const_str::concat!(LABEL_PREFIX, "dataset-id");

pub const CACHE_RUNTIME_NAME_LABEL: &str = "cacheruntime.fluid.io/name";

pub const CACHE_RUNTIME_COMPONENT_LABEL: &str = "cacheruntime.fluid.io/component-name";

pub const HOSTNAME_TOPOLOGY_KEY: &str = "kubernetes.io/hostname";

const EXPECTED_ANNOTATIONS: [(&str, &str); 1] = [("CreatedBy", "fluid")];

/// Longest allowed name segment of a qualified label key.
const MAX_LABEL_NAME_LEN: usize = 63;

/// Annotations stamped on everything this operator provisions.
pub fn expected_annotations() -> BTreeMap<String, String> {
    EXPECTED_ANNOTATIONS
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Whether `annotations` carries every expected annotation.
pub fn has_expected_annotations(annotations: Option<&BTreeMap<String, String>>) -> bool {
    let Some(annotations) = annotations else {
        return false;
    };
    EXPECTED_ANNOTATIONS
        .iter()
        .all(|(k, v)| annotations.get(*k).map(String::as_str) == Some(*v))
}

/// Per-runtime label keys and values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeLabels {
    namespace: String,
    name: String,
    owner_uid: String,
}

impl RuntimeLabels {
    pub fn new(namespace: &str, name: &str, owner_uid: &str) -> Self {
        Self {
            namespace: namespace.to_owned(),
            name: name.to_owned(),
            owner_uid: owner_uid.to_owned(),
        }
    }

    /// `fluid.io/s-cache-<ns>-<name>`
    pub fn runtime(&self) -> String {
        self.qualified(&format!("{STORAGE_LABEL_PREFIX}{RUNTIME_TYPE}-"))
    }

    /// `fluid.io/s-<ns>-<name>`
    pub fn common(&self) -> String {
        self.qualified(STORAGE_LABEL_PREFIX)
    }

    /// `fluid.io/f-<ns>-<name>`
    pub fn fuse(&self) -> String {
        self.qualified(FUSE_LABEL_PREFIX)
    }

    pub fn exclusive_value(&self) -> String {
        format!("{}_{}", self.namespace, self.name)
    }

    pub fn dataset_id(&self) -> String {
        format!("{}-{}", self.namespace, self.name)
    }

    /// Falls back to the owner uid when `<prefix><ns>-<name>` would not be a valid key.
    fn qualified(&self, prefix: &str) -> String {
        let key = format!("{prefix}{}-{}", self.namespace, self.name);
        let name_len = key.len() - LABEL_PREFIX.len();
        if name_len > MAX_LABEL_NAME_LEN && !self.owner_uid.is_empty() {
            format!("{prefix}{}", self.owner_uid)
        } else {
            key
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    // Test: label keys follow the fluid naming scheme
    #[test]
    fn test_runtime_labels() {
        let labels = RuntimeLabels::new("default", "hbase", "uid-1");

        assert_eq!(labels.runtime(), "fluid.io/s-cache-default-hbase");
        assert_eq!(labels.common(), "fluid.io/s-default-hbase");
        assert_eq!(labels.fuse(), "fluid.io/f-default-hbase");
        assert_eq!(labels.exclusive_value(), "default_hbase");
        assert_eq!(labels.dataset_id(), "default-hbase");
    }

    // Test: overlong keys fall back to the owner uid
    #[test]
    fn test_long_label_falls_back_to_uid() {
        let name = "a".repeat(60);
        let labels = RuntimeLabels::new("default", &name, "0b7c4b4e-uid");

        assert_eq!(labels.fuse(), "fluid.io/f-0b7c4b4e-uid");
        assert_eq!(labels.runtime(), "fluid.io/s-cache-0b7c4b4e-uid");
    }

    // Test: expected annotations must all be present
    #[test]
    fn test_expected_annotations() {
        let annotations = expected_annotations();
        assert!(has_expected_annotations(Some(&annotations)));
        assert!(!has_expected_annotations(None));

        let mut other = BTreeMap::new();
        other.insert("CreatedBy".to_string(), "someone".to_string());
        assert!(!has_expected_annotations(Some(&other)));
    }
}
