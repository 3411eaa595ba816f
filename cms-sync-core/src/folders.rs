//! Folders: hierarchy-aware reconciliation.
//!
//! Desired folders may reference parents that do not exist remotely yet, and the remote
//! instance may assign a different id than the snapshot carries. Folders are therefore loaded
//! into an arena and applied in rounds: each round reconciles the frontier of folders whose
//! parent is already resolved, records the remote id every folder ended up with, and only then
//! computes the next frontier.
//!
//! A round that finds no frontier while folders are still pending means the parent graph has a
//! cycle or a dangling reference; that is reported as a [`StructuralError`] instead of looping.

use std::collections::{BTreeSet, HashMap};

use futures::future::try_join_all;
use serde_json::Value;
use tracing::{debug, info};

use crate::contract::{Endpoint, ListQuery, Record, RecordId, ResourceAdapter, ResourceKind};
use crate::diff::{diff_attributes, FOLDER_FIELDS};
use crate::error::{ReconcileError, StructuralError};
use crate::identity::{parent_of, resolve, MatchStrategy};
use crate::paginate::fetch_all;
use crate::report::{KindReport, Operation};

const KIND: ResourceKind = ResourceKind::Folders;

/// One desired folder, with its snapshot-side identity and parent reference split out.
#[derive(Debug)]
struct FolderNode {
    snapshot_id: Option<RecordId>,
    parent: Option<RecordId>,
    record: Record,
}

impl FolderNode {
    fn new(record: &Record) -> Self {
        Self {
            snapshot_id: RecordId::of(record),
            parent: parent_of(record),
            record: record.clone(),
        }
    }

    fn label(&self) -> String {
        match self.record.get("name").and_then(Value::as_str) {
            Some(name) => name.to_string(),
            None => self
                .snapshot_id
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "<unnamed>".to_string()),
        }
    }
}

/// Export folders sorted by id, keeping only fields with a truthy value.
pub async fn snapshot_folders<A>(
    adapter: &A,
    filter: Option<Value>,
) -> Result<Vec<Record>, ReconcileError>
where
    A: ResourceAdapter + ?Sized,
{
    let query = ListQuery::new().sort("id").filter(filter);
    let live = fetch_all(adapter, Endpoint::Folders, &query).await?;
    Ok(live.into_iter().map(keep_truthy).collect())
}

/// Converge folders towards `desired`, parents before children.
///
/// Folders are only created or updated; live folders missing from the snapshot are kept.
pub async fn apply_folders<A>(adapter: &A, desired: &[Record]) -> Result<KindReport, ReconcileError>
where
    A: ResourceAdapter + ?Sized,
{
    let live = fetch_all(adapter, Endpoint::Folders, &ListQuery::new().sort("id")).await?;
    info!(live = live.len(), desired = desired.len(), "[APPLY][folders] Live set fetched");

    let nodes: Vec<FolderNode> = desired.iter().map(FolderNode::new).collect();
    let mut pending: Vec<usize> = (0..nodes.len()).collect();
    // snapshot id -> remote id
    let mut resolved: HashMap<RecordId, RecordId> = HashMap::new();
    let mut operations = Vec::with_capacity(nodes.len());
    let max_rounds = nodes.len();
    let mut round = 0;

    while !pending.is_empty() {
        let (frontier, waiting): (Vec<usize>, Vec<usize>) =
            pending.iter().copied().partition(|&index| match &nodes[index].parent {
                None => true,
                Some(parent) => resolved.contains_key(parent),
            });
        if frontier.is_empty() || round >= max_rounds {
            return Err(unresolved(&nodes, &pending).into());
        }
        round += 1;
        debug!(round, frontier = frontier.len(), waiting = waiting.len(), "[APPLY][folders] Reconciling frontier");

        let outcomes = try_join_all(frontier.iter().map(|&index| {
            let node = &nodes[index];
            let parent = node
                .parent
                .as_ref()
                .and_then(|parent| resolved.get(parent))
                .cloned();
            reconcile_folder(adapter, &live, node, parent)
        }))
        .await?;

        for (&index, (remote_id, operation)) in frontier.iter().zip(outcomes) {
            if let Some(snapshot_id) = &nodes[index].snapshot_id {
                resolved.insert(snapshot_id.clone(), remote_id);
            }
            operations.push(operation);
        }
        pending = waiting;
    }

    Ok(KindReport::with_operations(KIND, operations))
}

/// Reconcile a single folder whose parent is already resolved to `parent`.
/// Returns the remote id the folder ended up with.
async fn reconcile_folder<A>(
    adapter: &A,
    live: &[Record],
    node: &FolderNode,
    parent: Option<RecordId>,
) -> Result<(RecordId, Operation), ReconcileError>
where
    A: ResourceAdapter + ?Sized,
{
    let label = node.label();
    let mut wanted = node.record.clone();
    wanted.insert(
        "parent".to_string(),
        parent.as_ref().map_or(Value::Null, RecordId::to_value),
    );

    let Some(existing) = resolve(&wanted, live, MatchStrategy::Folder { parent: parent.as_ref() })
    else {
        info!(folder = %label, "[APPLY][folders] Creating folder");
        let created = adapter.create(Endpoint::Folders, wanted.clone()).await?;
        let remote_id = RecordId::of(&created)
            .or_else(|| node.snapshot_id.clone())
            .ok_or_else(|| {
                ReconcileError::Format(format!("created folder '{label}' came back without an id"))
            })?;
        return Ok((
            remote_id,
            Operation::Create {
                kind: KIND,
                payload: wanted,
            },
        ));
    };

    let remote_id = RecordId::of(existing)
        .ok_or_else(|| ReconcileError::Format(format!("live folder '{label}' has no id")))?;
    let mut patch = diff_attributes(existing, &wanted, FOLDER_FIELDS);
    if parent_of(existing) != parent {
        patch.insert("parent".to_string(), wanted["parent"].clone());
    }
    if patch.is_empty() {
        info!(folder = %label, "[APPLY][folders] Skipping update");
        return Ok((
            remote_id.clone(),
            Operation::Skip {
                kind: KIND,
                target: Some(remote_id),
            },
        ));
    }

    info!(folder = %label, id = %remote_id, "[APPLY][folders] Updating folder");
    adapter
        .update(Endpoint::Folders, remote_id.clone(), patch.clone())
        .await?;
    Ok((
        remote_id.clone(),
        Operation::Update {
            kind: KIND,
            target: remote_id,
            patch,
        },
    ))
}

fn unresolved(nodes: &[FolderNode], pending: &[usize]) -> StructuralError {
    let parents: BTreeSet<String> = pending
        .iter()
        .filter_map(|&index| nodes[index].parent.as_ref().map(ToString::to_string))
        .collect();
    StructuralError::UnresolvedParents {
        pending: pending.len(),
        parents: parents.into_iter().collect(),
    }
}

fn keep_truthy(mut record: Record) -> Record {
    record.retain(|_, value| match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64() != Some(0.0),
        _ => true,
    });
    record
}
