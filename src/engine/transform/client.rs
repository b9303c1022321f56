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

use super::RuntimePaths;
use crate::engine::value::ComponentValue;
use crate::types::v1alpha1::cache_runtime::ComponentSpec;
use crate::utils::labels::RuntimeLabels;
use k8s_openapi::api::core::v1 as corev1;

const TARGET_PATH_VOLUME: &str = "cache-fuse-mount";

/// Fuse client extras: unmount on stop, the shared target path, and node pinning
/// through the fuse label.
pub(super) fn apply(
    value: &mut ComponentValue,
    spec: &ComponentSpec,
    paths: &RuntimePaths,
    labels: &RuntimeLabels,
) {
    let target_path = paths.target_path.clone();
    let pod = value
        .pod_template_spec
        .spec
        .get_or_insert_with(Default::default);

    if let Some(container) = pod.containers.first_mut() {
        let lifecycle = container.lifecycle.get_or_insert_with(Default::default);
        if lifecycle.pre_stop.is_none() {
            lifecycle.pre_stop = Some(corev1::LifecycleHandler {
                exec: Some(corev1::ExecAction {
                    command: Some(vec!["umount".to_owned(), target_path.clone()]),
                }),
                ..Default::default()
            });
        }

        container
            .volume_mounts
            .get_or_insert_with(Vec::new)
            .push(corev1::VolumeMount {
                name: TARGET_PATH_VOLUME.to_owned(),
                mount_path: target_path.clone(),
                mount_propagation: Some("Bidirectional".to_owned()),
                ..Default::default()
            });
    }

    pod.volumes.get_or_insert_with(Vec::new).push(corev1::Volume {
        name: TARGET_PATH_VOLUME.to_owned(),
        host_path: Some(corev1::HostPathVolumeSource {
            path: target_path.clone(),
            type_: Some("DirectoryOrCreate".to_owned()),
        }),
        ..Default::default()
    });

    let mut node_selector = spec.node_selector.clone();
    node_selector.insert(labels.fuse(), "true".to_owned());
    pod.node_selector = Some(node_selector.clone());

    value.node_selector = node_selector;
    value.target_path = Some(target_path);
}
