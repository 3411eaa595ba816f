//! Permissions: roles plus a (collection, action) rule matrix per role.
//!
//! Snapshots store one entry per role. The role's own attributes sit next to a `permits` map of
//! `collection -> action -> leaf attributes`. Rules that belong to no role live under a
//! synthetic public role whose `id` is null. That role is never created, updated or deleted
//! itself; only its leaves are reconciled.
//!
//! Unlike the other kinds, leaves are deleted when the snapshot no longer lists them.

use std::collections::{BTreeMap, BTreeSet};

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::contract::{Endpoint, ListQuery, Record, RecordId, ResourceAdapter, ResourceKind};
use crate::diff::{diff_attributes, sort_array_field, PERMISSION_FIELDS, ROLE_FIELDS};
use crate::error::ReconcileError;
use crate::identity::{resolve, MatchStrategy};
use crate::paginate::fetch_all;
use crate::report::{KindReport, Operation};

const KIND: ResourceKind = ResourceKind::Permissions;

/// Role fields exported by a snapshot.
pub const ROLE_SNAPSHOT_FIELDS: &[&str] = &[
    "id",
    "name",
    "icon",
    "description",
    "ip_access",
    "enforce_tfa",
    "admin_access",
    "app_access",
];

/// Leaf fields that form its key rather than its attributes.
const LEAF_KEY_FIELDS: &[&str] = &["id", "role", "collection", "action"];

/// `collection -> action -> leaf attributes`
pub type Permits = BTreeMap<String, BTreeMap<String, Record>>;

/// One role entry of a permissions snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleSnapshot {
    #[serde(flatten)]
    pub attributes: Record,
    #[serde(default)]
    pub permits: Permits,
}

impl RoleSnapshot {
    /// The public role: no id and no name, standing for rules without an owning role.
    pub fn public(permits: Permits) -> Self {
        let mut attributes = Record::new();
        attributes.insert("id".to_string(), Value::Null);
        Self { attributes, permits }
    }

    pub fn is_public(&self) -> bool {
        RecordId::of(&self.attributes).is_none()
            && self.attributes.get("name").map_or(true, Value::is_null)
    }

    fn label(&self) -> String {
        if self.is_public() {
            return "public".to_string();
        }
        match self.attributes.get("name").and_then(Value::as_str) {
            Some(name) => name.to_string(),
            None => RecordId::of(&self.attributes)
                .map(|id| id.to_string())
                .unwrap_or_default(),
        }
    }
}

/// Export every role (optionally filtered) plus the public role, each with its rule matrix.
pub async fn snapshot_permissions<A>(
    adapter: &A,
    roles_filter: Option<Value>,
) -> Result<Vec<RoleSnapshot>, ReconcileError>
where
    A: ResourceAdapter + ?Sized,
{
    let query = ListQuery::new()
        .sort("id")
        .fields(ROLE_SNAPSHOT_FIELDS)
        .filter(roles_filter);
    let mut roles = fetch_all(adapter, Endpoint::Roles, &query).await?;
    roles.push(RoleSnapshot::public(Permits::new()).attributes);

    try_join_all(roles.into_iter().map(|attributes| async move {
        let role_id = RecordId::of(&attributes);
        let leaves = fetch_leaves(adapter, role_id.as_ref()).await?;
        Ok::<_, ReconcileError>(RoleSnapshot {
            attributes,
            permits: into_matrix(leaves, false),
        })
    }))
    .await
}

/// Converge roles and their rule matrices towards `desired`.
///
/// Roles are reconciled concurrently; so are the leaves of each role. Roles themselves are
/// never deleted.
pub async fn apply_permissions<A>(
    adapter: &A,
    desired: &[RoleSnapshot],
) -> Result<KindReport, ReconcileError>
where
    A: ResourceAdapter + ?Sized,
{
    let live_roles = fetch_all(adapter, Endpoint::Roles, &ListQuery::new()).await?;
    info!(live = live_roles.len(), desired = desired.len(), "[APPLY][permissions] Live roles fetched");

    let per_role = try_join_all(
        desired
            .iter()
            .map(|role| reconcile_role(adapter, &live_roles, role)),
    )
    .await?;

    Ok(KindReport::with_operations(
        KIND,
        per_role.into_iter().flatten().collect(),
    ))
}

async fn reconcile_role<A>(
    adapter: &A,
    live_roles: &[Record],
    desired: &RoleSnapshot,
) -> Result<Vec<Operation>, ReconcileError>
where
    A: ResourceAdapter + ?Sized,
{
    let mut operations = Vec::new();
    let role_id = if desired.is_public() {
        None
    } else {
        let (id, operation) = upsert_role(adapter, live_roles, desired).await?;
        operations.push(operation);
        Some(id)
    };

    let existing = into_matrix(fetch_leaves(adapter, role_id.as_ref()).await?, true);
    let plan = plan_leaves(&existing, &desired.permits);
    debug!(role = %desired.label(), leaves = plan.len(), "[APPLY][permissions] Leaf plan computed");

    let leaf_operations = try_join_all(
        plan.into_iter()
            .map(|leaf| sync_leaf(adapter, role_id.as_ref(), leaf)),
    )
    .await?;
    operations.extend(leaf_operations);
    Ok(operations)
}

/// Resolve, create or update the role entity, excluding its rule matrix.
async fn upsert_role<A>(
    adapter: &A,
    live_roles: &[Record],
    desired: &RoleSnapshot,
) -> Result<(RecordId, Operation), ReconcileError>
where
    A: ResourceAdapter + ?Sized,
{
    let label = desired.label();
    let Some(existing) = resolve(&desired.attributes, live_roles, MatchStrategy::Role) else {
        info!(role = %label, "[APPLY][permissions] Creating role");
        let created = adapter
            .create(Endpoint::Roles, desired.attributes.clone())
            .await?;
        let id = RecordId::of(&created)
            .or_else(|| RecordId::of(&desired.attributes))
            .ok_or_else(|| {
                ReconcileError::Format(format!("created role '{label}' came back without an id"))
            })?;
        return Ok((
            id,
            Operation::Create {
                kind: KIND,
                payload: desired.attributes.clone(),
            },
        ));
    };

    let id = RecordId::of(existing)
        .ok_or_else(|| ReconcileError::Format(format!("live role '{label}' has no id")))?;
    let patch = diff_attributes(existing, &desired.attributes, ROLE_FIELDS);
    if patch.is_empty() {
        info!(role = %label, id = %id, "[APPLY][permissions] Skipping role update");
        return Ok((
            id.clone(),
            Operation::Skip {
                kind: KIND,
                target: Some(id),
            },
        ));
    }

    let shown = Value::Object(patch.clone());
    info!(role = %label, id = %id, patch = %shown, "[APPLY][permissions] Updating role");
    adapter
        .update(Endpoint::Roles, id.clone(), patch.clone())
        .await?;
    Ok((
        id.clone(),
        Operation::Update {
            kind: KIND,
            target: id,
            patch,
        },
    ))
}

/// Live leaves of one role, or of no role at all when `role` is `None`.
async fn fetch_leaves<A>(adapter: &A, role: Option<&RecordId>) -> Result<Vec<Record>, ReconcileError>
where
    A: ResourceAdapter + ?Sized,
{
    let filter = match role {
        Some(id) => json!({ "role": { "_eq": id.to_value() } }),
        None => json!({ "role": { "_null": true } }),
    };
    let query = ListQuery::new().sort("id").filter(Some(filter));
    Ok(fetch_all(adapter, Endpoint::Permissions, &query).await?)
}

/// Fold flat leaf records into a matrix, stripping key fields and sorting `fields`.
///
/// Leaf ids are kept when `keep_ids` is set so existing leaves can be updated or deleted.
pub fn into_matrix(leaves: Vec<Record>, keep_ids: bool) -> Permits {
    let mut permits = Permits::new();
    for mut leaf in leaves {
        let collection = leaf.get("collection").and_then(Value::as_str).map(str::to_string);
        let action = leaf.get("action").and_then(Value::as_str).map(str::to_string);
        let (Some(collection), Some(action)) = (collection, action) else {
            let raw_id = leaf.get("id").cloned().unwrap_or(Value::Null);
            warn!(
                id = %raw_id,
                "[permissions] Skipping permission because of missing collection or action"
            );
            continue;
        };
        let id = leaf.remove("id");
        for field in LEAF_KEY_FIELDS {
            leaf.remove(*field);
        }
        if keep_ids {
            if let Some(id) = id {
                leaf.insert("id".to_string(), id);
            }
        }
        sort_array_field(&mut leaf, "fields");
        permits.entry(collection).or_default().insert(action, leaf);
    }
    permits
}

/// One (collection, action) intersection with whatever each side holds for it.
#[derive(Debug)]
struct LeafPlan<'a> {
    collection: &'a str,
    action: &'a str,
    existing: Option<&'a Record>,
    desired: Option<&'a Record>,
}

/// Union collections, then actions per collection, across both sides.
fn plan_leaves<'a>(existing: &'a Permits, desired: &'a Permits) -> Vec<LeafPlan<'a>> {
    let collections: BTreeSet<&str> = existing
        .keys()
        .chain(desired.keys())
        .map(String::as_str)
        .collect();

    let mut plan = Vec::new();
    for collection in collections {
        let existing_actions = existing.get(collection);
        let desired_actions = desired.get(collection);
        let actions: BTreeSet<&str> = existing_actions
            .into_iter()
            .flat_map(|actions| actions.keys())
            .chain(desired_actions.into_iter().flat_map(|actions| actions.keys()))
            .map(String::as_str)
            .collect();
        for action in actions {
            plan.push(LeafPlan {
                collection,
                action,
                existing: existing_actions.and_then(|actions| actions.get(action)),
                desired: desired_actions.and_then(|actions| actions.get(action)),
            });
        }
    }
    plan
}

async fn sync_leaf<A>(
    adapter: &A,
    role: Option<&RecordId>,
    leaf: LeafPlan<'_>,
) -> Result<Operation, ReconcileError>
where
    A: ResourceAdapter + ?Sized,
{
    let role_label = role.map_or_else(|| "public".to_string(), ToString::to_string);
    let LeafPlan {
        collection,
        action,
        existing,
        desired,
    } = leaf;

    match (existing, desired) {
        (None, Some(wanted)) => {
            let mut payload = Record::new();
            payload.insert("role".to_string(), role.map_or(Value::Null, RecordId::to_value));
            payload.insert("collection".to_string(), Value::String(collection.to_string()));
            payload.insert("action".to_string(), Value::String(action.to_string()));
            for (field, value) in wanted {
                if !LEAF_KEY_FIELDS.contains(&field.as_str()) {
                    payload.insert(field.clone(), value.clone());
                }
            }
            info!(role = %role_label, collection, action, "[APPLY][permissions] Creating permission");
            adapter.create(Endpoint::Permissions, payload.clone()).await?;
            Ok(Operation::Create {
                kind: KIND,
                payload,
            })
        }
        (Some(current), None) => {
            let id = leaf_id(current, collection, action)?;
            info!(role = %role_label, collection, action, id = %id, "[APPLY][permissions] Deleting permission");
            adapter.delete(Endpoint::Permissions, id.clone()).await?;
            Ok(Operation::Delete {
                kind: KIND,
                target: id,
            })
        }
        (Some(current), Some(wanted)) => {
            let id = leaf_id(current, collection, action)?;
            let patch = diff_attributes(current, wanted, PERMISSION_FIELDS);
            if patch.is_empty() {
                debug!(role = %role_label, collection, action, "[APPLY][permissions] Skipping permission update");
                return Ok(Operation::Skip {
                    kind: KIND,
                    target: Some(id),
                });
            }
            let shown = Value::Object(patch.clone());
            info!(
                role = %role_label,
                collection,
                action,
                patch = %shown,
                "[APPLY][permissions] Updating permission"
            );
            adapter
                .update(Endpoint::Permissions, id.clone(), patch.clone())
                .await?;
            Ok(Operation::Update {
                kind: KIND,
                target: id,
                patch,
            })
        }
        (None, None) => Ok(Operation::Skip {
            kind: KIND,
            target: None,
        }),
    }
}

fn leaf_id(leaf: &Record, collection: &str, action: &str) -> Result<RecordId, ReconcileError> {
    RecordId::of(leaf).ok_or_else(|| {
        ReconcileError::Format(format!("live permission {collection}/{action} has no id"))
    })
}
