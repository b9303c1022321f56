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

use crate::config::OperatorConfig;
use crate::context::{Context, Object};
use crate::dataflow::DataOperation;
use crate::reconcile::{State, error_policy, reconcile_operation, reconcile_runtime};
use crate::types::v1alpha1::cache_runtime::CacheRuntime;
use crate::types::v1alpha1::cache_runtime_class::CacheRuntimeClass;
use crate::types::v1alpha1::dataset::Dataset;
use crate::types::v1alpha1::operation::{DataBackup, DataLoad, DataMigrate, DataProcess};
use futures::StreamExt;
use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::core::v1 as corev1;
use kube::runtime::{Controller, watcher};
use kube::{Client, CustomResourceExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

pub mod component_helper;
pub mod config;
pub mod context;
pub mod dataflow;
pub mod engine;
pub mod reconcile;
pub mod types;
pub mod utils;


fn operation_controller<T: DataOperation>(
    client: Client,
    namespace: Option<&str>,
    state: Arc<State<Context>>,
) -> impl Future<Output = ()> {
    Controller::new(T::api(client, namespace), watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile_operation::<T, Context>, error_policy, state)
        .for_each(|res| async move {
            match res {
                Ok((operation, _)) => debug!("reconciled {}", operation),
                Err(e) => warn!("reconcile {} failed: {}", T::KIND, e),
            }
        })
}

pub async fn run(config: OperatorConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_level(true)
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();

    let client = Client::try_default().await?;
    let namespace = config.namespace.clone();
    let ns = namespace.as_deref();
    info!("starting cache operator, namespace {:?}", ns);

    let state = Arc::new(State::new(Arc::new(Context::new(client.clone())), config));

    let runtimes = Controller::new(CacheRuntime::api(client.clone(), ns), watcher::Config::default())
        .owns(
            appsv1::StatefulSet::api(client.clone(), ns),
            watcher::Config::default(),
        )
        .owns(
            appsv1::DaemonSet::api(client.clone(), ns),
            watcher::Config::default(),
        )
        .owns(
            corev1::ConfigMap::api(client.clone(), ns),
            watcher::Config::default(),
        )
        .shutdown_on_signal()
        .run(reconcile_runtime, error_policy, state.clone())
        .for_each(|res| async move {
            match res {
                Ok((runtime, _)) => debug!("reconciled {}", runtime),
                Err(e) => warn!("reconcile failed: {}", e),
            }
        });

    futures::join!(
        runtimes,
        operation_controller::<DataLoad>(client.clone(), ns, state.clone()),
        operation_controller::<DataMigrate>(client.clone(), ns, state.clone()),
        operation_controller::<DataBackup>(client.clone(), ns, state.clone()),
        operation_controller::<DataProcess>(client, ns, state),
    );

    Ok(())
}

/// Every custom resource of the operator as one multi-document YAML stream.
pub fn crds() -> Result<String, serde_yaml_ng::Error> {
    let documents = [
        serde_yaml_ng::to_string(&Dataset::crd())?,
        serde_yaml_ng::to_string(&CacheRuntimeClass::crd())?,
        serde_yaml_ng::to_string(&CacheRuntime::crd())?,
        serde_yaml_ng::to_string(&DataLoad::crd())?,
        serde_yaml_ng::to_string(&DataMigrate::crd())?,
        serde_yaml_ng::to_string(&DataBackup::crd())?,
        serde_yaml_ng::to_string(&DataProcess::crd())?,
    ];
    Ok(documents.join("---\n"))
}

pub async fn crd(file: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer: Pin<Box<dyn AsyncWrite + Send>> = if let Some(file) = file {
        Box::pin(
            tokio::fs::OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(file)
                .await?,
        )
    } else {
        Box::pin(tokio::io::stdout())
    };

    writer.write_all(crds()?.as_bytes()).await?;
    writer.flush().await?;

    Ok(())
}
