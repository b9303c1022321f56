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

//! `runAfter` ordering between data operations.

use crate::context::{self, Object, Store};
use crate::types::v1alpha1::operation::{
    DataBackup, DataLoad, DataMigrate, DataProcess, OperationKind, OperationPhase, OperationRef,
    OperationStatus,
};
use crate::utils::retry::{Backoff, Target, update_with_retry};
use kube::ResourceExt;
use kube::runtime::events::EventType;
use snafu::{OptionExt, ResultExt, Snafu};
use tracing::{debug, info, warn};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("{} '{}' has no namespace", kind, name))]
    NoNamespace { kind: OperationKind, name: String },

    #[snafu(display("failed to get preceding {} '{}': {}", kind, name, source))]
    GetPreceding {
        kind: OperationKind,
        name: String,
        source: context::Error,
    },

    #[snafu(display("failed to clear operation waiting status of '{}': {}", name, source))]
    ClearWaiting { name: String, source: context::Error },
}

/// The parts of a data operation the dependency gate reads and writes.
pub trait DataOperation: Object {
    const KIND: OperationKind;

    fn run_after(&self) -> Option<&OperationRef>;

    fn operation_status(&self) -> Option<&OperationStatus>;

    fn operation_status_mut(&mut self) -> &mut OperationStatus;

    fn is_waiting(&self) -> bool {
        self.operation_status()
            .is_some_and(|s| s.waiting_for.operation_complete == Some(true))
    }
}

macro_rules! data_operation {
    ($($kind:ident),* $(,)?) => {
        $(
            impl DataOperation for $kind {
                const KIND: OperationKind = OperationKind::$kind;

                fn run_after(&self) -> Option<&OperationRef> {
                    self.spec.run_after.as_ref()
                }

                fn operation_status(&self) -> Option<&OperationStatus> {
                    self.status.as_ref()
                }

                fn operation_status_mut(&mut self) -> &mut OperationStatus {
                    self.status.get_or_insert_with(Default::default)
                }
            }
        )*
    };
}

data_operation!(DataLoad, DataMigrate, DataBackup, DataProcess);

async fn preceding_phase<S: Store>(
    store: &S,
    reference: &OperationRef,
    namespace: &str,
) -> Result<OperationPhase, context::Error> {
    let name = reference.name.as_str();
    let namespace = Some(reference.namespace.as_deref().unwrap_or(namespace));

    let status = match reference.kind {
        OperationKind::DataLoad => store.get::<DataLoad>(name, namespace).await?.status,
        OperationKind::DataMigrate => store.get::<DataMigrate>(name, namespace).await?.status,
        OperationKind::DataBackup => store.get::<DataBackup>(name, namespace).await?.status,
        OperationKind::DataProcess => store.get::<DataProcess>(name, namespace).await?.status,
    };
    Ok(status.map(|s| s.phase).unwrap_or_default())
}

/// Drops the waiting flag. A flag that is already clear is not written.
async fn clear_waiting<S: Store, T: DataOperation>(
    store: &S,
    backoff: &Backoff,
    name: &str,
    namespace: &str,
) -> Result<(), Error> {
    update_with_retry(
        store,
        backoff,
        name,
        Some(namespace),
        Target::Status,
        |operation: &mut T| {
            if operation.is_waiting() {
                operation.operation_status_mut().waiting_for.operation_complete = Some(false);
            }
        },
    )
    .await
    .context(ClearWaitingSnafu { name })?;
    Ok(())
}

async fn record<S: Store, T: DataOperation>(
    store: &S,
    operation: &T,
    event_type: EventType,
    reason: &str,
    message: &str,
) {
    if let Err(e) = store.record(operation, event_type, reason, message).await {
        warn!("failed to record event {}: {}", reason, e);
    }
}

/// Holds an operation back until the one named in `runAfter` is complete.
///
/// Returns whether the operation has to be requeued because it is still waiting.
pub async fn reconcile_operation_data_flow<S: Store, T: DataOperation>(
    store: &S,
    backoff: &Backoff,
    operation: &T,
) -> Result<bool, Error> {
    let name = operation.name_any();
    let namespace = operation.namespace().context(NoNamespaceSnafu {
        kind: T::KIND,
        name: name.as_str(),
    })?;

    let Some(run_after) = operation.run_after() else {
        clear_waiting::<S, T>(store, backoff, &name, &namespace).await?;
        return Ok(false);
    };

    let phase = match preceding_phase(store, run_after, &namespace).await {
        Ok(phase) => phase,
        Err(e) if e.is_not_found() => {
            warn!(
                "preceding {} {} of {} {}/{} not found",
                run_after.kind,
                run_after.name,
                T::KIND,
                namespace,
                name
            );
            record(
                store,
                operation,
                EventType::Warning,
                "PrecedingOperationNotFound",
                &format!("Preceding {} '{}' is not found.", run_after.kind, run_after.name),
            )
            .await;
            return Ok(true);
        }
        Err(source) => {
            return Err(Error::GetPreceding {
                kind: run_after.kind,
                name: run_after.name.clone(),
                source,
            });
        }
    };

    if phase != OperationPhase::Complete {
        info!(
            "{} {}/{} waits for {} {} in phase {}",
            T::KIND,
            namespace,
            name,
            run_after.kind,
            run_after.name,
            phase
        );
        record(
            store,
            operation,
            EventType::Normal,
            "OperationWaiting",
            &format!(
                "Waiting for {} '{}' to complete, currently {}.",
                run_after.kind, run_after.name, phase
            ),
        )
        .await;
        return Ok(true);
    }

    debug!("preceding {} {} is complete", run_after.kind, run_after.name);
    clear_waiting::<S, T>(store, backoff, &name, &namespace).await?;
    Ok(false)
}
