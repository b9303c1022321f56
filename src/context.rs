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
use crate::types::v1alpha1::cache_runtime::CacheRuntime;
use crate::types::v1alpha1::cache_runtime_class::CacheRuntimeClass;
use crate::types::v1alpha1::dataset::Dataset;
use crate::types::v1alpha1::operation::{DataBackup, DataLoad, DataMigrate, DataProcess};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::core::v1 as corev1;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Resource, ResourceExt, api::Api};
use serde::Serialize;
use serde::de::DeserializeOwned;
use snafu::Snafu;
use snafu::futures::TryFutureExt;
use std::fmt::Debug;

const FIELD_MANAGER: &str = "cache-operator";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Kubernetes API error: {}", source))]
    Kube { source: kube::Error },

    #[snafu(display("{} '{}' not found", kind, name))]
    NotFound { kind: String, name: String },

    #[snafu(display("{} '{}' was modified concurrently", kind, name))]
    Conflict { kind: String, name: String },

    #[snafu(display("record event error: {}", source))]
    Record { source: kube::Error },

    #[snafu(transparent)]
    Types { source: types::error::Error },
}

impl Error {
    /// Splits API errors into the kinds callers recover from.
    fn from_kube<T: Object>(name: &str, source: kube::Error) -> Self {
        let kind = T::kind(&()).to_string();
        match &source {
            kube::Error::Api(response) if response.code == 404 => Error::NotFound {
                kind,
                name: name.to_owned(),
            },
            kube::Error::Api(response) if response.code == 409 => Error::Conflict {
                kind,
                name: name.to_owned(),
            },
            _ => Error::Kube { source },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }
}

/// Turns a soft NotFound into `None`.
pub trait NotFoundExt<T> {
    fn optional(self) -> Result<Option<T>, Error>;
}

impl<T> NotFoundExt<T> for Result<T, Error> {
    fn optional(self) -> Result<Option<T>, Error> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// A cluster object the operator reads or writes.
pub trait Object:
    Resource<DynamicType = ()>
    + Clone
    + Serialize
    + DeserializeOwned
    + Debug
    + PartialEq
    + Send
    + Sync
    + 'static
{
    /// `namespace == None` addresses every namespace for namespaced kinds.
    fn api(client: kube::Client, namespace: Option<&str>) -> Api<Self>;
}

macro_rules! namespaced_object {
    ($($kind:ty),* $(,)?) => {
        $(
            impl Object for $kind {
                fn api(client: kube::Client, namespace: Option<&str>) -> Api<Self> {
                    match namespace {
                        Some(ns) => Api::namespaced(client, ns),
                        None => Api::all(client),
                    }
                }
            }
        )*
    };
}

macro_rules! cluster_object {
    ($($kind:ty),* $(,)?) => {
        $(
            impl Object for $kind {
                fn api(client: kube::Client, _namespace: Option<&str>) -> Api<Self> {
                    Api::all(client)
                }
            }
        )*
    };
}

namespaced_object!(
    CacheRuntime,
    Dataset,
    DataLoad,
    DataMigrate,
    DataBackup,
    DataProcess,
    appsv1::StatefulSet,
    appsv1::DaemonSet,
    corev1::ConfigMap,
    corev1::Service,
    corev1::Pod,
    corev1::PersistentVolumeClaim,
);

cluster_object!(
    CacheRuntimeClass,
    corev1::Node,
    corev1::PersistentVolume
);

/// Typed access to the cluster object store.
///
/// Every method reports missing objects as [`Error::NotFound`] and optimistic concurrency
/// failures as [`Error::Conflict`].
#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn get<T: Object>(&self, name: &str, namespace: Option<&str>) -> Result<T, Error>;

    async fn list<T: Object>(
        &self,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<T>, Error>;

    async fn create<T: Object>(&self, resource: &T) -> Result<T, Error>;

    /// Full update, guarded by the resourceVersion carried in `resource`.
    async fn replace<T: Object>(&self, resource: &T) -> Result<T, Error>;

    /// Status sub-resource update, guarded by the resourceVersion carried in `resource`.
    async fn replace_status<T: Object>(&self, resource: &T) -> Result<T, Error>;

    async fn delete<T: Object>(&self, name: &str, namespace: Option<&str>) -> Result<(), Error>;

    /// Server-side apply owned by this operator.
    async fn apply<T: Object>(&self, resource: &T) -> Result<T, Error>;

    /// send event
    async fn record<T: Object>(
        &self,
        resource: &T,
        event_type: EventType,
        reason: &str,
        message: &str,
    ) -> Result<(), Error>;
}

pub struct Context {
    pub(crate) client: kube::Client,
    pub(crate) recorder: Recorder,
}

impl Context {
    pub fn new(client: kube::Client) -> Self {
        let reporter = Reporter {
            controller: FIELD_MANAGER.into(),
            instance: std::env::var("HOSTNAME").ok(),
        };

        let recorder = Recorder::new(client.clone(), reporter);
        Self { client, recorder }
    }
}

#[async_trait]
impl Store for Context {
    async fn get<T: Object>(&self, name: &str, namespace: Option<&str>) -> Result<T, Error> {
        T::api(self.client.clone(), namespace)
            .get(name)
            .await
            .map_err(|source| Error::from_kube::<T>(name, source))
    }

    async fn list<T: Object>(
        &self,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<T>, Error> {
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }

        let list = T::api(self.client.clone(), namespace)
            .list(&params)
            .context(KubeSnafu)
            .await?;
        Ok(list.items)
    }

    async fn create<T: Object>(&self, resource: &T) -> Result<T, Error> {
        let name = resource.name_any();
        T::api(self.client.clone(), resource.meta().namespace.as_deref())
            .create(&PostParams::default(), resource)
            .await
            .map_err(|source| Error::from_kube::<T>(&name, source))
    }

    async fn replace<T: Object>(&self, resource: &T) -> Result<T, Error> {
        let name = resource.name_any();
        T::api(self.client.clone(), resource.meta().namespace.as_deref())
            .replace(&name, &PostParams::default(), resource)
            .await
            .map_err(|source| Error::from_kube::<T>(&name, source))
    }

    async fn replace_status<T: Object>(&self, resource: &T) -> Result<T, Error> {
        let name = resource.name_any();
        T::api(self.client.clone(), resource.meta().namespace.as_deref())
            .replace_status(&name, &PostParams::default(), resource)
            .await
            .map_err(|source| Error::from_kube::<T>(&name, source))
    }

    async fn delete<T: Object>(&self, name: &str, namespace: Option<&str>) -> Result<(), Error> {
        T::api(self.client.clone(), namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|source| Error::from_kube::<T>(name, source))?;
        Ok(())
    }

    async fn apply<T: Object>(&self, resource: &T) -> Result<T, Error> {
        let name = resource.name_any();
        T::api(self.client.clone(), resource.meta().namespace.as_deref())
            .patch(
                &name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Apply(resource),
            )
            .await
            .map_err(|source| Error::from_kube::<T>(&name, source))
    }

    #[inline]
    async fn record<T: Object>(
        &self,
        resource: &T,
        event_type: EventType,
        reason: &str,
        message: &str,
    ) -> Result<(), Error> {
        self.recorder
            .publish(
                &Event {
                    type_: event_type,
                    reason: reason.to_owned(),
                    note: Some(message.into()),
                    action: "Reconcile".into(),
                    secondary: None,
                },
                &resource.object_ref(&()),
            )
            .context(RecordSnafu)
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::v1alpha1::status::Status;
    use kube::client::Body;

    // Test: status replacement sends the object itself to the status subresource
    #[tokio::test]
    async fn test_replace_status_request() {
        let service = tower::service_fn(|request: http::Request<Body>| async move {
            assert_eq!(request.method(), http::Method::PUT);
            assert_eq!(
                request.uri().path(),
                "/apis/data.fluid.io/v1alpha1/namespaces/default/cacheruntimes/hbase/status"
            );
            let body = request.into_body().collect_bytes().await?;
            Ok::<_, kube::Error>(http::Response::new(Body::from(body.to_vec())))
        });
        let context = Context::new(kube::Client::new(service, "default"));

        let mut runtime = crate::tests::create_test_runtime("hbase", "default");
        runtime.status = Some(Status {
            value_file: Some(runtime.config_map_name()),
            ..Default::default()
        });

        let replaced = context.replace_status(&runtime).await.unwrap();
        assert_eq!(replaced.status, runtime.status);
        assert_eq!(replaced.metadata.uid, runtime.metadata.uid);
    }
}
