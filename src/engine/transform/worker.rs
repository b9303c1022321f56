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

use crate::engine::value::ComponentValue;
use crate::types::v1alpha1::dataset::Dataset;
use crate::types::v1alpha1::k8s::PlacementMode;
use crate::utils::labels::{
    DATASET_LABEL, DATASET_PLACEMENT_LABEL, HOSTNAME_TOPOLOGY_KEY, RuntimeLabels,
};
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;

const SHARED_ANTI_AFFINITY_WEIGHT: i32 = 50;

const FUSE_NODE_AFFINITY_WEIGHT: i32 = 100;

/// Keeps workers of different datasets apart and close to their fuse clients.
/// An affinity already present in the class template is left untouched.
pub(super) fn set_affinity(value: &mut ComponentValue, dataset: &Dataset, labels: &RuntimeLabels) {
    let pod = value
        .pod_template_spec
        .spec
        .get_or_insert_with(Default::default);
    if pod.affinity.is_some() {
        return;
    }

    let any_dataset = metav1::LabelSelectorRequirement {
        key: DATASET_LABEL.to_owned(),
        operator: "Exists".to_owned(),
        values: None,
    };

    let pod_anti_affinity = match dataset.placement_mode() {
        PlacementMode::Exclusive => corev1::PodAntiAffinity {
            required_during_scheduling_ignored_during_execution: Some(vec![host_term(
                any_dataset,
            )]),
            ..Default::default()
        },
        PlacementMode::Shared => corev1::PodAntiAffinity {
            preferred_during_scheduling_ignored_during_execution: Some(vec![
                corev1::WeightedPodAffinityTerm {
                    weight: SHARED_ANTI_AFFINITY_WEIGHT,
                    pod_affinity_term: host_term(any_dataset),
                },
            ]),
            required_during_scheduling_ignored_during_execution: Some(vec![host_term(
                metav1::LabelSelectorRequirement {
                    key: DATASET_PLACEMENT_LABEL.to_owned(),
                    operator: "In".to_owned(),
                    values: Some(vec![PlacementMode::Exclusive.to_string()]),
                },
            )]),
        },
    };

    let node_affinity = corev1::NodeAffinity {
        preferred_during_scheduling_ignored_during_execution: Some(vec![
            corev1::PreferredSchedulingTerm {
                weight: FUSE_NODE_AFFINITY_WEIGHT,
                preference: corev1::NodeSelectorTerm {
                    match_expressions: Some(vec![corev1::NodeSelectorRequirement {
                        key: labels.fuse(),
                        operator: "In".to_owned(),
                        values: Some(vec!["true".to_owned()]),
                    }]),
                    match_fields: None,
                },
            },
        ]),
        required_during_scheduling_ignored_during_execution: dataset
            .spec
            .node_affinity
            .as_ref()
            .and_then(|affinity| affinity.required.clone()),
    };

    pod.affinity = Some(corev1::Affinity {
        node_affinity: Some(node_affinity),
        pod_affinity: None,
        pod_anti_affinity: Some(pod_anti_affinity),
    });
}

fn host_term(requirement: metav1::LabelSelectorRequirement) -> corev1::PodAffinityTerm {
    corev1::PodAffinityTerm {
        label_selector: Some(metav1::LabelSelector {
            match_expressions: Some(vec![requirement]),
            match_labels: None,
        }),
        topology_key: HOSTNAME_TOPOLOGY_KEY.to_owned(),
        ..Default::default()
    }
}
