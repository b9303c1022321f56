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

use crate::engine::value::TieredStoreOption;
use crate::types::error::{Error, InvalidQuantitySnafu, TieredStoreMismatchSnafu};
use crate::types::v1alpha1::cache_runtime::TieredStoreLevel;
use crate::utils::quantity;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use snafu::ensure;

const CACHE_DIR_VOLUME_PREFIX: &str = "fluid-cache-dir-";

const MEMORY_MEDIUM: &str = "Memory";

#[derive(Debug, Default)]
pub(super) struct Expanded {
    pub options: Vec<TieredStoreOption>,
    pub volumes: Vec<corev1::Volume>,
    pub volume_mounts: Vec<corev1::VolumeMount>,
}

/// Splits every level into one cache directory per `path`/`quota` pair.
///
/// Directories are numbered across levels; process-memory directories consume an index
/// without producing a volume.
pub(super) fn expand(levels: &[TieredStoreLevel]) -> Result<Expanded, Error> {
    let mut expanded = Expanded::default();
    let mut index = 0usize;

    for (level_index, level) in levels.iter().enumerate() {
        let paths = split(&level.path);
        let quotas = split(&level.quota);
        ensure!(
            paths.len() == quotas.len(),
            TieredStoreMismatchSnafu {
                level: level_index,
                paths: paths.len(),
                quotas: quotas.len(),
                path: level.path.clone(),
                quota: level.quota.clone(),
            }
        );

        for (path, quota) in paths.into_iter().zip(quotas) {
            ensure!(
                quantity::parse(quota).is_some(),
                InvalidQuantitySnafu {
                    field: format!("tieredStore.levels[{level_index}].quota"),
                    value: quota,
                }
            );

            let mut option = TieredStoreOption {
                cache_dir: path.to_owned(),
                cache_capacity: quota.to_owned(),
                low: level.low.clone(),
                high: level.high.clone(),
                mem_quantity_requirement: None,
            };

            if level.medium.process_memory.is_some() {
                option.mem_quantity_requirement = Some(quota.to_owned());
            } else if let Some(medium) = &level.medium.volume {
                let name = format!("{CACHE_DIR_VOLUME_PREFIX}{index}");
                let mut volume = corev1::Volume {
                    name: name.clone(),
                    ..Default::default()
                };
                if let Some(host_path) = &medium.host_path {
                    volume.host_path = Some(host_path.clone());
                } else if let Some(empty_dir) = &medium.empty_dir {
                    let mut empty_dir = empty_dir.clone();
                    if empty_dir.medium.as_deref() == Some(MEMORY_MEDIUM) {
                        empty_dir.size_limit = Some(Quantity(quota.to_owned()));
                    }
                    volume.empty_dir = Some(empty_dir);
                } else if let Some(ephemeral) = &medium.ephemeral {
                    volume.ephemeral = Some(ephemeral.clone());
                }

                expanded.volumes.push(volume);
                expanded.volume_mounts.push(corev1::VolumeMount {
                    name,
                    mount_path: path.to_owned(),
                    ..Default::default()
                });
            }

            expanded.options.push(option);
            index += 1;
        }
    }

    Ok(expanded)
}

fn split(list: &str) -> Vec<&str> {
    list.split(',').map(str::trim).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::v1alpha1::cache_runtime::{Medium, MediumVolume, ProcessMemory};

    fn level(medium: Medium, path: &str, quota: &str) -> TieredStoreLevel {
        TieredStoreLevel {
            medium,
            path: path.to_string(),
            quota: quota.to_string(),
            ..Default::default()
        }
    }

    // Test: volume names are indexed across levels
    #[test]
    fn test_expand_indexes_across_levels() {
        let memory = level(
            Medium {
                process_memory: Some(ProcessMemory {}),
                volume: None,
            },
            "/dev/shm",
            "1Gi",
        );
        let disks = level(
            Medium {
                process_memory: None,
                volume: Some(MediumVolume {
                    host_path: Some(corev1::HostPathVolumeSource {
                        path: "/mnt/disk".to_string(),
                        type_: None,
                    }),
                    ..Default::default()
                }),
            },
            "/mnt/a, /mnt/b",
            "100Gi,200Gi",
        );

        let expanded = expand(&[memory, disks]).unwrap();

        assert_eq!(expanded.options.len(), 3);
        assert_eq!(
            expanded.options[0].mem_quantity_requirement.as_deref(),
            Some("1Gi")
        );
        let names: Vec<_> = expanded.volumes.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["fluid-cache-dir-1", "fluid-cache-dir-2"]);
        assert_eq!(expanded.volume_mounts[1].mount_path, "/mnt/b");
        assert_eq!(expanded.options[2].cache_capacity, "200Gi");
    }

    // Test: memory backed emptyDir is capped at the quota
    #[test]
    fn test_memory_empty_dir_size_limit() {
        let tier = level(
            Medium {
                process_memory: None,
                volume: Some(MediumVolume {
                    empty_dir: Some(corev1::EmptyDirVolumeSource {
                        medium: Some("Memory".to_string()),
                        size_limit: None,
                    }),
                    ..Default::default()
                }),
            },
            "/cache",
            "4Gi",
        );

        let expanded = expand(&[tier]).unwrap();
        let empty_dir = expanded.volumes[0].empty_dir.as_ref().unwrap();

        assert_eq!(empty_dir.size_limit, Some(Quantity("4Gi".to_string())));
    }

    // Test: unparsable quota is rejected
    #[test]
    fn test_invalid_quota() {
        let tier = level(Medium::default(), "/cache", "lots");

        let err = expand(&[tier]).unwrap_err();
        assert!(matches!(err, Error::InvalidQuantity { .. }));
    }
}
