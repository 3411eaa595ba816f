//! Schema: opaque passthrough to the remote diff/apply service.
//!
//! The engine never inspects schema documents. Correctness of the diff is entirely the remote
//! instance's responsibility; all this module decides is whether there is anything to apply.

use serde_json::Value;
use tracing::info;

use crate::contract::{Record, RecordId, ResourceAdapter, ResourceKind};
use crate::error::ReconcileError;
use crate::report::{KindReport, Operation};

const KIND: ResourceKind = ResourceKind::Schema;

pub async fn snapshot_schema<A>(adapter: &A) -> Result<Value, ReconcileError>
where
    A: ResourceAdapter + ?Sized,
{
    Ok(adapter.schema_snapshot().await?)
}

/// Diff `snapshot` remotely and apply the result unless it is empty.
///
/// The remote apply response is returned verbatim as the report's `remote_result`.
pub async fn apply_schema<A>(adapter: &A, snapshot: Value) -> Result<KindReport, ReconcileError>
where
    A: ResourceAdapter + ?Sized,
{
    let diff = adapter.schema_diff(snapshot).await?;
    let mut report = KindReport::new(KIND);
    if is_empty_diff(&diff) {
        info!("[APPLY][schema] Skipping because there is no difference");
        report.operations.push(Operation::Skip {
            kind: KIND,
            target: None,
        });
        return Ok(report);
    }

    info!("[APPLY][schema] Applying remote schema diff");
    let mut patch = Record::new();
    patch.insert("diff".to_string(), diff.clone());
    let result = adapter.schema_apply(diff).await?;
    report.operations.push(Operation::Update {
        kind: KIND,
        target: RecordId::from("schema"),
        patch,
    });
    report.remote_result = Some(result);
    Ok(report)
}

/// Only a non-empty object, array or string counts as a difference. Scalars such as `false`
/// and `0` carry nothing to apply.
pub fn is_empty_diff(diff: &Value) -> bool {
    match diff {
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        Value::Null | Value::Bool(_) | Value::Number(_) => true,
    }
}
