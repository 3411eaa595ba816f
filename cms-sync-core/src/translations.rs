//! Translations: flat, natural-key addressed, additive-only.

use tracing::{debug, info};

use crate::contract::{Endpoint, ListQuery, Record, RecordId, ResourceAdapter, ResourceKind};
use crate::diff::{diff_attributes, TRANSLATION_FIELDS};
use crate::error::ReconcileError;
use crate::identity::{natural_key, resolve, MatchStrategy};
use crate::paginate::fetch_all;
use crate::report::{KindReport, Operation};

const KIND: ResourceKind = ResourceKind::Translations;

/// Export every translation, ordered by natural key, without remote ids.
pub async fn snapshot_translations<A>(adapter: &A) -> Result<Vec<Record>, ReconcileError>
where
    A: ResourceAdapter + ?Sized,
{
    let mut live = fetch_all(adapter, Endpoint::Translations, &ListQuery::new()).await?;
    live.sort_by_key(|record| natural_key(record).unwrap_or_default());
    Ok(live
        .into_iter()
        .map(|mut record| {
            record.remove("id");
            record
        })
        .collect())
}

/// Converge translations towards `desired`.
///
/// Existing translations without a desired counterpart are left alone: this kind never deletes.
/// Duplicate natural keys on either side are not supported; the first live match wins.
pub async fn apply_translations<A>(
    adapter: &A,
    desired: &[Record],
) -> Result<KindReport, ReconcileError>
where
    A: ResourceAdapter + ?Sized,
{
    let live = fetch_all(adapter, Endpoint::Translations, &ListQuery::new()).await?;
    info!(live = live.len(), desired = desired.len(), "[APPLY][translations] Live set fetched");

    let mut operations = Vec::with_capacity(desired.len());
    for wanted in desired {
        let label = natural_key(wanted).unwrap_or_default();
        let Some(existing) = resolve(wanted, &live, MatchStrategy::Translation) else {
            info!(translation = %label, "[APPLY][translations] Creating translation");
            adapter.create(Endpoint::Translations, wanted.clone()).await?;
            operations.push(Operation::Create {
                kind: KIND,
                payload: wanted.clone(),
            });
            continue;
        };

        let target = RecordId::of(existing);
        let patch = diff_attributes(existing, wanted, TRANSLATION_FIELDS);
        if patch.is_empty() {
            debug!(translation = %label, "[APPLY][translations] Skipping translation");
            operations.push(Operation::Skip { kind: KIND, target });
            continue;
        }

        let target = target.ok_or_else(|| {
            ReconcileError::Format(format!("live translation '{label}' has no id"))
        })?;
        info!(translation = %label, id = %target, "[APPLY][translations] Updating translation");
        adapter
            .update(Endpoint::Translations, target.clone(), patch.clone())
            .await?;
        operations.push(Operation::Update {
            kind: KIND,
            target,
            patch,
        });
    }

    Ok(KindReport::with_operations(KIND, operations))
}
