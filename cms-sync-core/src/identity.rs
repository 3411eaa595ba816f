//! Identity resolution: find the live record a desired record refers to.

use crate::contract::{Record, RecordId};

/// How a kind identifies its records.
#[derive(Debug, Clone, Copy)]
pub enum MatchStrategy<'a> {
    /// Explicit id, else `(name, parent)` where `parent` is the already-resolved remote id.
    Folder { parent: Option<&'a RecordId> },
    /// Explicit id, else `name`.
    Role,
    /// Always the case-insensitive `(key, language)` natural key; ids are never match keys.
    Translation,
}

/// Return the live record matched by `desired`, or `None` when it must be created.
///
/// An explicit id that is absent from the live set is a miss: it does not fall back to the
/// natural key.
pub fn resolve<'l>(
    desired: &Record,
    live: &'l [Record],
    strategy: MatchStrategy<'_>,
) -> Option<&'l Record> {
    match strategy {
        MatchStrategy::Folder { parent } => match RecordId::of(desired) {
            Some(id) => find_by_id(live, &id),
            None => live.iter().find(|candidate| {
                candidate.get("name") == desired.get("name") && parent_of(candidate).as_ref() == parent
            }),
        },
        MatchStrategy::Role => match RecordId::of(desired) {
            Some(id) => find_by_id(live, &id),
            None => {
                let name = desired.get("name")?;
                live.iter().find(|candidate| candidate.get("name") == Some(name))
            }
        },
        MatchStrategy::Translation => {
            let key = natural_key(desired)?;
            live.iter()
                .find(|candidate| natural_key(candidate).as_deref() == Some(key.as_str()))
        }
    }
}

/// `key/language`, lowercased. `None` when either part is missing or not a string.
pub fn natural_key(record: &Record) -> Option<String> {
    let key = record.get("key")?.as_str()?;
    let language = record.get("language")?.as_str()?;
    Some(format!("{key}/{language}").to_lowercase())
}

/// The folder's parent reference, if any.
pub fn parent_of(record: &Record) -> Option<RecordId> {
    record.get("parent").and_then(RecordId::from_value)
}

fn find_by_id<'l>(live: &'l [Record], id: &RecordId) -> Option<&'l Record> {
    live.iter()
        .find(|candidate| RecordId::of(candidate).as_ref() == Some(id))
}
