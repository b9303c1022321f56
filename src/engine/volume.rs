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

//! The PV/PVC pair through which applications mount the dataset via the fuse CSI driver.

use super::{CacheEngine, Error};
use crate::context::{NotFoundExt, Object, Store};
use crate::engine::value::RuntimeValue;
use crate::types::v1alpha1::cache_runtime::CacheRuntime;
use crate::types::v1alpha1::dataset::Dataset;
use crate::utils::labels::{
    DATASET_ID_LABEL, RuntimeLabels, expected_annotations, has_expected_annotations,
};
use crate::utils::quantity;
use crate::utils::retry::{Target, update_with_retry};
use crate::utils::time::parse_time;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use kube::Resource;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const CSI_DRIVER: &str = "fuse.csi.fluid.io";

pub const STORAGE_CLASS: &str = "fluid";

pub const PVC_PROTECTION_FINALIZER: &str = "kubernetes.io/pvc-protection";

/// Dataset annotation overriding the advertised capacity.
pub const STORAGE_CAPACITY_ANNOTATION: &str = "pvc.fluid.io/resources.requests.storage";

const DEFAULT_CAPACITY: &str = "100Pi";

const DEFAULT_ACCESS_MODE: &str = "ReadOnlyMany";

const PV_AVAILABLE_TIMEOUT: Duration = Duration::from_secs(1);
const PV_POLL_INTERVAL: Duration = Duration::from_millis(200);

const DELETION_CHECKS: u32 = 10;
const DELETION_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How long a PVC may sit in Terminating before its protection finalizer is forced off.
const PROTECTION_GRACE: chrono::Duration = chrono::Duration::seconds(30);

const ATTR_FLUID_PATH: &str = "fluid_path";
const ATTR_MOUNT_TYPE: &str = "mount_type";
const ATTR_RUNTIME_NAMESPACE: &str = "runtime_namespace";
const ATTR_RUNTIME_NAME: &str = "runtime_name";

/// True once a terminating PVC has kept the `pvc-protection` finalizer past the grace period.
pub fn should_remove_protection_finalizer(
    pvc: &corev1::PersistentVolumeClaim,
    now: DateTime<Utc>,
) -> bool {
    let Some(deleted_at) = pvc.metadata.deletion_timestamp.as_ref().and_then(parse_time) else {
        return false;
    };
    let protected = pvc
        .metadata
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|f| f == PVC_PROTECTION_FINALIZER));

    protected && now > deleted_at + PROTECTION_GRACE
}

fn is_complete(pod: &corev1::Pod) -> bool {
    matches!(
        pod.status.as_ref().and_then(|s| s.phase.as_deref()),
        Some("Succeeded") | Some("Failed")
    )
}

fn mounts_claim(pod: &corev1::Pod, claim: &str) -> bool {
    pod.spec
        .iter()
        .flat_map(|spec| spec.volumes.iter().flatten())
        .filter_map(|v| v.persistent_volume_claim.as_ref())
        .any(|source| source.claim_name == claim)
}

/// Falls back to the default when the annotation is absent or not a quantity.
fn capacity(dataset: &Dataset) -> Quantity {
    let requested = dataset
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(STORAGE_CAPACITY_ANNOTATION))
        .filter(|value| quantity::parse(value).is_some());

    match requested {
        Some(value) => Quantity(value.clone()),
        None => Quantity(DEFAULT_CAPACITY.to_owned()),
    }
}

fn access_modes(dataset: &Dataset) -> Vec<String> {
    if dataset.spec.access_modes.is_empty() {
        vec![DEFAULT_ACCESS_MODE.to_owned()]
    } else {
        dataset.spec.access_modes.clone()
    }
}

/// One `key In [value]` requirement per selector entry.
fn node_affinity(node_selector: &BTreeMap<String, String>) -> Option<corev1::VolumeNodeAffinity> {
    if node_selector.is_empty() {
        return None;
    }
    let requirements = node_selector
        .iter()
        .map(|(key, value)| corev1::NodeSelectorRequirement {
            key: key.clone(),
            operator: "In".to_owned(),
            values: Some(vec![value.clone()]),
        })
        .collect();

    Some(corev1::VolumeNodeAffinity {
        required: Some(corev1::NodeSelector {
            node_selector_terms: vec![corev1::NodeSelectorTerm {
                match_expressions: Some(requirements),
                ..Default::default()
            }],
        }),
    })
}

impl<S: Store> CacheEngine<S> {
    /// `<namespace>-<name>`, unique across namespaces.
    fn volume_name(&self) -> String {
        format!("{}-{}", self.namespace, self.name)
    }

    fn volume_labels(&self, runtime: &CacheRuntime) -> BTreeMap<String, String> {
        let labels = RuntimeLabels::new(&self.namespace, &self.name, &runtime.owner_uid());
        BTreeMap::from([
            (labels.common(), "true".to_owned()),
            (DATASET_ID_LABEL.to_owned(), labels.dataset_id()),
        ])
    }

    /// Present and created by us.
    async fn provisioned<T: Object>(&self, name: &str, namespace: Option<&str>) -> Result<Option<T>, Error> {
        let found: Option<T> = self.store.get(name, namespace).await.optional()?;
        Ok(found.filter(|o| has_expected_annotations(o.meta().annotations.as_ref())))
    }

    /// Creates the PV and PVC if missing.
    pub async fn create_volume(
        &self,
        runtime: &CacheRuntime,
        dataset: &Dataset,
        value: &RuntimeValue,
    ) -> Result<(), Error> {
        self.create_persistent_volume(runtime, dataset, value).await?;
        self.create_persistent_volume_claim(runtime, dataset).await
    }

    async fn create_persistent_volume(
        &self,
        runtime: &CacheRuntime,
        dataset: &Dataset,
        value: &RuntimeValue,
    ) -> Result<(), Error> {
        let name = self.volume_name();
        if self
            .provisioned::<corev1::PersistentVolume>(&name, None)
            .await?
            .is_some()
        {
            return Ok(());
        }

        let class = self.runtime_class(runtime).await?;
        let attributes = BTreeMap::from([
            (
                ATTR_FLUID_PATH.to_owned(),
                value.client.target_path.clone().unwrap_or_default(),
            ),
            (ATTR_MOUNT_TYPE.to_owned(), class.spec.file_system_type.clone()),
            (ATTR_RUNTIME_NAMESPACE.to_owned(), self.namespace.clone()),
            (ATTR_RUNTIME_NAME.to_owned(), self.name.clone()),
        ]);

        let pv = corev1::PersistentVolume {
            metadata: metav1::ObjectMeta {
                name: Some(name.clone()),
                labels: Some(self.volume_labels(runtime)),
                annotations: Some(expected_annotations()),
                ..Default::default()
            },
            spec: Some(corev1::PersistentVolumeSpec {
                access_modes: Some(access_modes(dataset)),
                capacity: Some(BTreeMap::from([("storage".to_owned(), capacity(dataset))])),
                claim_ref: Some(corev1::ObjectReference {
                    namespace: Some(self.namespace.clone()),
                    name: Some(self.name.clone()),
                    ..Default::default()
                }),
                csi: Some(corev1::CSIPersistentVolumeSource {
                    driver: CSI_DRIVER.to_owned(),
                    volume_handle: name.clone(),
                    volume_attributes: Some(attributes),
                    ..Default::default()
                }),
                node_affinity: node_affinity(&runtime.spec.client.node_selector),
                persistent_volume_reclaim_policy: Some("Retain".to_owned()),
                storage_class_name: Some(STORAGE_CLASS.to_owned()),
                ..Default::default()
            }),
            ..Default::default()
        };

        self.store.create(&pv).await?;
        info!("created persistent volume {} for {}", name, self.id());
        self.wait_volume_available(&name).await
    }

    /// A PV that never turns Available is only logged; the claim binds on its own later.
    async fn wait_volume_available(&self, name: &str) -> Result<(), Error> {
        let deadline = tokio::time::Instant::now() + PV_AVAILABLE_TIMEOUT;
        loop {
            let pv: Option<corev1::PersistentVolume> = self.store.get(name, None).await.optional()?;
            let phase = pv
                .as_ref()
                .and_then(|pv| pv.status.as_ref())
                .and_then(|s| s.phase.as_deref());
            if phase == Some("Available") {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(
                    "persistent volume {} not available after {:?}, phase {:?}",
                    name, PV_AVAILABLE_TIMEOUT, phase
                );
                return Ok(());
            }
            tokio::time::sleep(PV_POLL_INTERVAL).await;
        }
    }

    async fn create_persistent_volume_claim(
        &self,
        runtime: &CacheRuntime,
        dataset: &Dataset,
    ) -> Result<(), Error> {
        if self
            .provisioned::<corev1::PersistentVolumeClaim>(&self.name, Some(&self.namespace))
            .await?
            .is_some()
        {
            return Ok(());
        }

        let labels = self.volume_labels(runtime);
        let selector = labels
            .get(DATASET_ID_LABEL)
            .map(|id| BTreeMap::from([(DATASET_ID_LABEL.to_owned(), id.clone())]));

        let pvc = corev1::PersistentVolumeClaim {
            metadata: metav1::ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: Some(labels),
                annotations: Some(expected_annotations()),
                ..Default::default()
            },
            spec: Some(corev1::PersistentVolumeClaimSpec {
                access_modes: Some(access_modes(dataset)),
                resources: Some(corev1::VolumeResourceRequirements {
                    requests: Some(BTreeMap::from([("storage".to_owned(), capacity(dataset))])),
                    ..Default::default()
                }),
                selector: Some(metav1::LabelSelector {
                    match_labels: selector,
                    ..Default::default()
                }),
                storage_class_name: Some(STORAGE_CLASS.to_owned()),
                volume_name: Some(self.volume_name()),
                ..Default::default()
            }),
            ..Default::default()
        };

        self.store.create(&pvc).await?;
        info!("created persistent volume claim {}", self.id());
        Ok(())
    }

    /// Deletes the PVC, then the PV, waiting for each to disappear.
    pub async fn delete_volume(&self) -> Result<(), Error> {
        self.delete_persistent_volume_claim().await?;
        self.delete_persistent_volume().await
    }

    async fn delete_persistent_volume_claim(&self) -> Result<(), Error> {
        let namespace = Some(self.namespace.as_str());
        if self
            .provisioned::<corev1::PersistentVolumeClaim>(&self.name, namespace)
            .await?
            .is_none()
        {
            return Ok(());
        }
        self.delete_ignore_missing::<corev1::PersistentVolumeClaim>(&self.name, namespace)
            .await?;

        for _ in 0..DELETION_CHECKS {
            let Some(pvc) = self
                .store
                .get::<corev1::PersistentVolumeClaim>(&self.name, namespace)
                .await
                .optional()?
            else {
                return Ok(());
            };

            if should_remove_protection_finalizer(&pvc, Utc::now()) {
                self.remove_protection_finalizer().await?;
            }
            tokio::time::sleep(DELETION_POLL_INTERVAL).await;
        }

        self.ensure_gone::<corev1::PersistentVolumeClaim>(&self.name, namespace)
            .await
    }

    /// Refuses while a pod that is still running mounts the claim.
    async fn remove_protection_finalizer(&self) -> Result<(), Error> {
        let pods: Vec<corev1::Pod> = self.store.list(Some(&self.namespace), None).await?;
        if let Some(pod) = pods
            .iter()
            .find(|pod| mounts_claim(pod, &self.name) && !is_complete(pod))
        {
            return Err(Error::VolumeInUse {
                name: self.name.clone(),
                pod: pod.metadata.name.clone().unwrap_or_default(),
            });
        }

        info!("forcing off {} of pvc {}", PVC_PROTECTION_FINALIZER, self.id());
        update_with_retry(
            self.store.as_ref(),
            &self.backoff,
            &self.name,
            Some(&self.namespace),
            Target::Object,
            |pvc: &mut corev1::PersistentVolumeClaim| {
                if let Some(finalizers) = pvc.metadata.finalizers.as_mut() {
                    finalizers.retain(|f| f != PVC_PROTECTION_FINALIZER);
                }
            },
        )
        .await
        .optional()?;
        Ok(())
    }

    async fn delete_persistent_volume(&self) -> Result<(), Error> {
        let name = self.volume_name();
        if self
            .provisioned::<corev1::PersistentVolume>(&name, None)
            .await?
            .is_none()
        {
            return Ok(());
        }
        self.delete_ignore_missing::<corev1::PersistentVolume>(&name, None)
            .await?;

        for _ in 0..DELETION_CHECKS {
            let found: Option<corev1::PersistentVolume> =
                self.store.get(&name, None).await.optional()?;
            if found.is_none() {
                return Ok(());
            }
            tokio::time::sleep(DELETION_POLL_INTERVAL).await;
        }

        self.ensure_gone::<corev1::PersistentVolume>(&name, None).await
    }

    async fn delete_ignore_missing<T: Object>(&self, name: &str, namespace: Option<&str>) -> Result<(), Error> {
        match self.store.delete::<T>(name, namespace).await {
            Err(e) if !e.is_not_found() => Err(e.into()),
            _ => {
                debug!("deleted {} {}", T::kind(&()), name);
                Ok(())
            }
        }
    }

    async fn ensure_gone<T: Object>(&self, name: &str, namespace: Option<&str>) -> Result<(), Error> {
        let found: Option<T> = self.store.get(name, namespace).await.optional()?;
        match found {
            None => Ok(()),
            Some(_) => Err(Error::DeletionTimeout {
                kind: T::kind(&()).to_string(),
                name: name.to_owned(),
                attempts: DELETION_CHECKS,
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::engine::NodeLabelLock;
    use crate::engine::transform::transform;
    use crate::tests::FakeStore;
    use crate::utils::time::to_time;
    use std::sync::Arc;

    fn terminating_pvc(deleted_ago: i64, finalizers: &[&str]) -> corev1::PersistentVolumeClaim {
        corev1::PersistentVolumeClaim {
            metadata: metav1::ObjectMeta {
                name: Some("hbase".to_string()),
                namespace: Some("default".to_string()),
                annotations: Some(expected_annotations()),
                deletion_timestamp: to_time(Utc::now() - chrono::Duration::seconds(deleted_ago)),
                finalizers: Some(finalizers.iter().map(|f| f.to_string()).collect()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn pod_using_claim(name: &str, phase: &str) -> corev1::Pod {
        corev1::Pod {
            metadata: metav1::ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: Some(corev1::PodSpec {
                volumes: Some(vec![corev1::Volume {
                    name: "data".to_string(),
                    persistent_volume_claim: Some(corev1::PersistentVolumeClaimVolumeSource {
                        claim_name: "hbase".to_string(),
                        ..Default::default()
                    }),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            status: Some(corev1::PodStatus {
                phase: Some(phase.to_string()),
                ..Default::default()
            }),
        }
    }

    fn engine(store: Arc<FakeStore>) -> CacheEngine<FakeStore> {
        CacheEngine::new(store, "default", "hbase", NodeLabelLock::default())
    }

    // Test: the finalizer is only forced off after 30s in Terminating
    #[test]
    fn test_should_remove_protection_finalizer() {
        let now = Utc::now();

        let pvc = terminating_pvc(10, &[PVC_PROTECTION_FINALIZER]);
        assert!(!should_remove_protection_finalizer(&pvc, now));

        let pvc = terminating_pvc(31, &[PVC_PROTECTION_FINALIZER]);
        assert!(should_remove_protection_finalizer(&pvc, now));

        let pvc = terminating_pvc(60, &["example.com/other"]);
        assert!(!should_remove_protection_finalizer(&pvc, now));

        let mut pvc = terminating_pvc(60, &[PVC_PROTECTION_FINALIZER]);
        pvc.metadata.deletion_timestamp = None;
        assert!(!should_remove_protection_finalizer(&pvc, now));
    }

    // Test: an invalid capacity annotation falls back to the default
    #[test]
    fn test_capacity_and_access_modes() {
        let mut dataset = crate::tests::create_test_dataset("hbase", "default", 1);
        assert_eq!(capacity(&dataset).0, "100Pi");
        assert_eq!(access_modes(&dataset), vec!["ReadOnlyMany".to_string()]);

        dataset.metadata.annotations = Some(BTreeMap::from([(
            STORAGE_CAPACITY_ANNOTATION.to_string(),
            "20Gi".to_string(),
        )]));
        dataset.spec.access_modes = vec!["ReadWriteMany".to_string()];
        assert_eq!(capacity(&dataset).0, "20Gi");
        assert_eq!(access_modes(&dataset), vec!["ReadWriteMany".to_string()]);

        dataset.metadata.annotations = Some(BTreeMap::from([(
            STORAGE_CAPACITY_ANNOTATION.to_string(),
            "lots".to_string(),
        )]));
        assert_eq!(capacity(&dataset).0, "100Pi");
    }

    // Test: PV and PVC carry the CSI attributes, claim and selector
    #[tokio::test(start_paused = true)]
    async fn test_create_volume() {
        let store = Arc::new(FakeStore::default());
        let mut runtime = crate::tests::create_test_runtime("hbase", "default");
        runtime
            .spec
            .client
            .node_selector
            .insert("zone".to_string(), "a".to_string());
        let dataset = crate::tests::create_test_dataset("hbase", "default", 1);
        let class = crate::tests::create_test_runtime_class();
        let value = transform(&dataset, &runtime, &class).unwrap();
        store.insert(class.clone());

        let engine = engine(store.clone());
        engine.create_volume(&runtime, &dataset, &value).await.unwrap();
        let writes = store.writes();
        engine.create_volume(&runtime, &dataset, &value).await.unwrap();
        assert_eq!(store.writes(), writes, "existing volumes are kept");

        let pv: corev1::PersistentVolume = store.get_sync("default-hbase", None).unwrap();
        let spec = pv.spec.unwrap();
        let csi = spec.csi.unwrap();
        assert_eq!(csi.driver, CSI_DRIVER);
        assert_eq!(csi.volume_handle, "default-hbase");
        let attributes = csi.volume_attributes.unwrap();
        assert_eq!(
            attributes.get(ATTR_FLUID_PATH).map(String::as_str),
            Some("/runtime-mnt/cache/default/hbase/cache-fuse")
        );
        assert_eq!(
            attributes.get(ATTR_MOUNT_TYPE),
            Some(&class.spec.file_system_type)
        );
        assert_eq!(attributes.get(ATTR_RUNTIME_NAME).map(String::as_str), Some("hbase"));
        let claim = spec.claim_ref.unwrap();
        assert_eq!(claim.name.as_deref(), Some("hbase"));
        assert_eq!(claim.namespace.as_deref(), Some("default"));
        assert_eq!(spec.storage_class_name.as_deref(), Some(STORAGE_CLASS));
        assert_eq!(spec.capacity.unwrap()["storage"].0, "100Pi");
        let terms = spec.node_affinity.unwrap().required.unwrap().node_selector_terms;
        let requirement = &terms[0].match_expressions.as_ref().unwrap()[0];
        assert_eq!(requirement.key, "zone");
        assert_eq!(requirement.values, Some(vec!["a".to_string()]));

        let pvc: corev1::PersistentVolumeClaim = store.get_sync("hbase", Some("default")).unwrap();
        assert!(has_expected_annotations(pvc.metadata.annotations.as_ref()));
        let spec = pvc.spec.unwrap();
        assert_eq!(spec.volume_name.as_deref(), Some("default-hbase"));
        assert_eq!(
            spec.selector.unwrap().match_labels.unwrap()[DATASET_ID_LABEL],
            "default-hbase"
        );
    }

    // Test: a PVC stuck in Terminating loses its protection finalizer
    #[tokio::test(start_paused = true)]
    async fn test_delete_volume_removes_protection() {
        let store = Arc::new(FakeStore::default());
        store.insert(terminating_pvc(60, &[PVC_PROTECTION_FINALIZER]));
        store.insert(pod_using_claim("done", "Succeeded"));

        engine(store.clone()).delete_volume().await.unwrap();

        assert!(
            store
                .get_sync::<corev1::PersistentVolumeClaim>("hbase", Some("default"))
                .is_none()
        );
    }

    // Test: a running pod mounting the claim blocks finalizer removal
    #[tokio::test(start_paused = true)]
    async fn test_delete_volume_in_use() {
        let store = Arc::new(FakeStore::default());
        store.insert(terminating_pvc(60, &[PVC_PROTECTION_FINALIZER]));
        store.insert(pod_using_claim("reader", "Running"));

        let err = engine(store).delete_volume().await.unwrap_err();
        assert!(matches!(err, Error::VolumeInUse { ref pod, .. } if pod == "reader"));
    }

    // Test: a claim that never goes away exhausts the checks
    #[tokio::test(start_paused = true)]
    async fn test_delete_volume_timeout() {
        let store = Arc::new(FakeStore::default());
        store.insert(terminating_pvc(0, &["example.com/other"]));

        let err = engine(store).delete_volume().await.unwrap_err();
        assert!(matches!(err, Error::DeletionTimeout { attempts: 10, .. }));
    }

    // Test: volumes not created by the operator are left alone
    #[tokio::test]
    async fn test_delete_volume_skips_foreign() {
        let store = Arc::new(FakeStore::default());
        let mut pvc = terminating_pvc(0, &[]);
        pvc.metadata.annotations = None;
        pvc.metadata.deletion_timestamp = None;
        store.insert(pvc);

        engine(store.clone()).delete_volume().await.unwrap();
        assert!(
            store
                .get_sync::<corev1::PersistentVolumeClaim>("hbase", Some("default"))
                .is_some()
        );
    }
}
