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

use k8s_openapi::api::core::v1 as corev1;
use std::collections::BTreeMap;

/// Union of two maps, entries of `overrides` win.
pub fn union_with_override(
    base: &BTreeMap<String, String>,
    overrides: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = base.clone();
    merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// Appends `volume`, replacing an existing volume of the same name.
pub fn append_or_override_volume(volumes: &mut Vec<corev1::Volume>, volume: corev1::Volume) {
    match volumes.iter_mut().find(|v| v.name == volume.name) {
        Some(existing) => *existing = volume,
        None => volumes.push(volume),
    }
}

/// Appends `mount`, replacing an existing mount of the same volume.
pub fn append_or_override_volume_mount(
    mounts: &mut Vec<corev1::VolumeMount>,
    mount: corev1::VolumeMount,
) {
    match mounts.iter_mut().find(|m| m.name == mount.name) {
        Some(existing) => *existing = mount,
        None => mounts.push(mount),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    // Test: override values win and keys are unioned
    #[test]
    fn test_union_with_override() {
        let merged = union_with_override(
            &map(&[("foo", "bar")]),
            &map(&[("foo", "baz"), ("qux", "1")]),
        );
        assert_eq!(merged, map(&[("foo", "baz"), ("qux", "1")]));
    }

    // Test: volumes are deduplicated by name
    #[test]
    fn test_append_or_override_volume() {
        let mut volumes = vec![corev1::Volume {
            name: "secret-a".to_string(),
            ..Default::default()
        }];
        append_or_override_volume(
            &mut volumes,
            corev1::Volume {
                name: "secret-a".to_string(),
                secret: Some(corev1::SecretVolumeSource {
                    secret_name: Some("a".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        append_or_override_volume(
            &mut volumes,
            corev1::Volume {
                name: "secret-b".to_string(),
                ..Default::default()
            },
        );

        assert_eq!(volumes.len(), 2);
        assert!(volumes[0].secret.is_some(), "later volume should win");
    }
}
