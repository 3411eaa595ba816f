//! High-level driver: snapshot or apply every requested resource kind.
//!
//! This module is the entrypoint used by the CLI crate and by integration tests. It:
//!   - Selects the requested kinds from an inclusion or exclusion list
//!   - Dispatches each kind to its reconciler through the closed [`KindSnapshot`] enum
//!   - Runs all kinds concurrently against one borrowed [`ResourceAdapter`]
//!   - Collects one outcome per kind, wrapping failures in a [`SectionError`]
//!
//! # Major Types
//! - [`KindSnapshot`]: the desired-state document of one kind, already parsed
//! - [`SnapshotOptions`]: extra remote filters used while taking snapshots
//! - [`RunReport`]: per-kind outcomes of an apply run
//!
//! # Error Handling
//! A kind's failure is attributed to that kind only; it neither aborts nor corrupts its
//! siblings. There is no rollback: a failure part way through a kind leaves the remote instance
//! partially converged.

use futures::future::join_all;
use serde_json::Value;
use tracing::{error, info};

use crate::contract::{Record, ResourceAdapter, ResourceKind};
use crate::error::{ReconcileError, SectionError, Stage, ValidationError};
use crate::folders::{apply_folders, snapshot_folders};
use crate::permissions::{apply_permissions, snapshot_permissions, RoleSnapshot};
use crate::report::{KindReport, RunReport};
use crate::schema::{apply_schema, snapshot_schema};
use crate::translations::{apply_translations, snapshot_translations};

/// Desired state for one resource kind.
#[derive(Debug, Clone, PartialEq)]
pub enum KindSnapshot {
    Schema(Value),
    Translations(Vec<Record>),
    Permissions(Vec<RoleSnapshot>),
    Folders(Vec<Record>),
}

impl KindSnapshot {
    pub fn kind(&self) -> ResourceKind {
        match self {
            KindSnapshot::Schema(_) => ResourceKind::Schema,
            KindSnapshot::Translations(_) => ResourceKind::Translations,
            KindSnapshot::Permissions(_) => ResourceKind::Permissions,
            KindSnapshot::Folders(_) => ResourceKind::Folders,
        }
    }

    /// Parse the JSON document stored for `kind`.
    pub fn from_json(kind: ResourceKind, value: Value) -> Result<Self, ReconcileError> {
        Ok(match kind {
            ResourceKind::Schema => KindSnapshot::Schema(value),
            ResourceKind::Translations => KindSnapshot::Translations(serde_json::from_value(value)?),
            ResourceKind::Permissions => KindSnapshot::Permissions(serde_json::from_value(value)?),
            ResourceKind::Folders => KindSnapshot::Folders(serde_json::from_value(value)?),
        })
    }

    pub fn to_json(&self) -> Result<Value, serde_json::Error> {
        match self {
            KindSnapshot::Schema(value) => Ok(value.clone()),
            KindSnapshot::Translations(records) | KindSnapshot::Folders(records) => {
                serde_json::to_value(records)
            }
            KindSnapshot::Permissions(roles) => serde_json::to_value(roles),
        }
    }
}

/// Remote filters applied while taking snapshots.
#[derive(Debug, Clone, Default)]
pub struct SnapshotOptions {
    pub roles_filter: Option<Value>,
    pub folders_filter: Option<Value>,
}

/// Remote filters must be JSON objects or arrays.
pub fn validate_filter(filter: Value) -> Result<Value, ValidationError> {
    match filter {
        Value::Object(_) | Value::Array(_) => Ok(filter),
        other => Err(ValidationError::InvalidFilter(format!(
            "expected a JSON object or array, got {other}"
        ))),
    }
}

/// Resolve the kinds to process, in canonical order.
///
/// `only` and `except` are mutually exclusive; with neither, every kind is selected.
pub fn requested_kinds(
    only: Option<&[ResourceKind]>,
    except: Option<&[ResourceKind]>,
) -> Result<Vec<ResourceKind>, ValidationError> {
    match (only, except) {
        (Some(_), Some(_)) => Err(ValidationError::ConflictingKindFilters),
        (Some(only), None) => Ok(ResourceKind::ALL
            .into_iter()
            .filter(|kind| only.contains(kind))
            .collect()),
        (None, Some(except)) => Ok(ResourceKind::ALL
            .into_iter()
            .filter(|kind| !except.contains(kind))
            .collect()),
        (None, None) => Ok(ResourceKind::ALL.to_vec()),
    }
}

/// Apply one kind's snapshot.
pub async fn apply_snapshot<A>(
    adapter: &A,
    snapshot: KindSnapshot,
) -> Result<KindReport, ReconcileError>
where
    A: ResourceAdapter + ?Sized,
{
    match snapshot {
        KindSnapshot::Schema(blob) => apply_schema(adapter, blob).await,
        KindSnapshot::Translations(records) => apply_translations(adapter, &records).await,
        KindSnapshot::Permissions(roles) => apply_permissions(adapter, &roles).await,
        KindSnapshot::Folders(records) => apply_folders(adapter, &records).await,
    }
}

/// Apply every snapshot concurrently; each kind's outcome is collected independently.
pub async fn apply_snapshots<A>(adapter: &A, snapshots: Vec<KindSnapshot>) -> RunReport
where
    A: ResourceAdapter + ?Sized,
{
    info!(kinds = snapshots.len(), "[APPLY] Starting reconciliation");
    let outcomes = join_all(snapshots.into_iter().map(|snapshot| async move {
        let kind = snapshot.kind();
        match apply_snapshot(adapter, snapshot).await {
            Ok(report) => {
                info!(kind = %kind, tally = ?report.tally(), "[APPLY] Kind converged");
                Ok(report)
            }
            Err(e) => {
                error!(kind = %kind, error = %e, "[APPLY][ERROR] Kind failed");
                Err(SectionError::new(kind, Stage::Apply, e))
            }
        }
    }))
    .await;
    RunReport { outcomes }
}

/// Read the live state of one kind into its snapshot form.
pub async fn take_snapshot<A>(
    adapter: &A,
    kind: ResourceKind,
    options: &SnapshotOptions,
) -> Result<KindSnapshot, ReconcileError>
where
    A: ResourceAdapter + ?Sized,
{
    Ok(match kind {
        ResourceKind::Schema => KindSnapshot::Schema(snapshot_schema(adapter).await?),
        ResourceKind::Translations => {
            KindSnapshot::Translations(snapshot_translations(adapter).await?)
        }
        ResourceKind::Permissions => KindSnapshot::Permissions(
            snapshot_permissions(adapter, options.roles_filter.clone()).await?,
        ),
        ResourceKind::Folders => KindSnapshot::Folders(
            snapshot_folders(adapter, options.folders_filter.clone()).await?,
        ),
    })
}

/// Snapshot every requested kind concurrently.
pub async fn take_snapshots<A>(
    adapter: &A,
    kinds: &[ResourceKind],
    options: &SnapshotOptions,
) -> Vec<Result<KindSnapshot, SectionError>>
where
    A: ResourceAdapter + ?Sized,
{
    join_all(kinds.iter().map(|&kind| async move {
        take_snapshot(adapter, kind, options).await.map_err(|e| {
            error!(kind = %kind, error = %e, "[SNAPSHOT][ERROR] Kind failed");
            SectionError::new(kind, Stage::Snapshot, e)
        })
    }))
    .await
}
