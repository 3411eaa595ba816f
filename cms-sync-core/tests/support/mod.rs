#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use cms_sync_core::contract::{Endpoint, ListQuery, Record, RecordId, ResourceAdapter};
use cms_sync_core::error::TransportError;
use serde_json::{json, Value};

/// A mutating call observed by the fake, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Create(Endpoint, Record),
    Update(Endpoint, String, Record),
    Delete(Endpoint, String),
}

#[derive(Default)]
struct State {
    collections: HashMap<Endpoint, Vec<Record>>,
    calls: Vec<Call>,
    list_requests: usize,
    schema: Value,
    failing: Vec<Endpoint>,
}

/// In-memory remote instance with paging, `_eq`/`_null` filters and a call log.
pub struct FakeAdapter {
    state: Mutex<State>,
    page_size: usize,
    reassign_ids: bool,
}

impl FakeAdapter {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            page_size: 100,
            reassign_ids: false,
        }
    }

    /// Ignore ids sent on create and always assign a fresh one.
    pub fn reassigning_ids(mut self) -> Self {
        self.reassign_ids = true;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_records(self, endpoint: Endpoint, records: Vec<Record>) -> Self {
        self.state
            .lock()
            .unwrap()
            .collections
            .entry(endpoint)
            .or_default()
            .extend(records);
        self
    }

    pub fn with_schema(self, schema: Value) -> Self {
        self.state.lock().unwrap().schema = schema;
        self
    }

    /// Every call against `endpoint` fails with a 503.
    pub fn failing_on(self, endpoint: Endpoint) -> Self {
        self.state.lock().unwrap().failing.push(endpoint);
        self
    }

    pub fn records(&self, endpoint: Endpoint) -> Vec<Record> {
        self.state
            .lock()
            .unwrap()
            .collections
            .get(&endpoint)
            .cloned()
            .unwrap_or_default()
    }

    pub fn schema(&self) -> Value {
        self.state.lock().unwrap().schema.clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn list_requests(&self) -> usize {
        self.state.lock().unwrap().list_requests
    }

    fn check(&self, state: &State, endpoint: Endpoint) -> Result<(), TransportError> {
        if state.failing.contains(&endpoint) {
            return Err(TransportError::Status {
                status: 503,
                reason: "Service Unavailable".to_string(),
                url: format!("http://fake/{}", endpoint.path()),
                message: None,
            });
        }
        Ok(())
    }
}

fn not_found(endpoint: Endpoint, id: &RecordId) -> TransportError {
    TransportError::Status {
        status: 404,
        reason: "Not Found".to_string(),
        url: format!("http://fake/{}/{}", endpoint.path(), id),
        message: None,
    }
}

fn id_text(record: &Record) -> String {
    RecordId::of(record).map(|id| id.to_string()).unwrap_or_default()
}

fn matches_filter(record: &Record, filter: &Value) -> bool {
    let Some(conditions) = filter.as_object() else {
        return true;
    };
    conditions.iter().all(|(field, condition)| {
        let value = record.get(field).unwrap_or(&Value::Null);
        match condition.as_object() {
            Some(ops) => ops.iter().all(|(op, operand)| match op.as_str() {
                "_eq" => value == operand,
                "_null" => value.is_null() == operand.as_bool().unwrap_or(false),
                "_in" => operand
                    .as_array()
                    .is_some_and(|candidates| candidates.contains(value)),
                _ => true,
            }),
            None => value == condition,
        }
    })
}

#[async_trait]
impl ResourceAdapter for FakeAdapter {
    async fn list(&self, endpoint: Endpoint, query: ListQuery) -> Result<Vec<Record>, TransportError> {
        let mut state = self.state.lock().unwrap();
        self.check(&state, endpoint)?;
        state.list_requests += 1;
        let mut records: Vec<Record> = state
            .collections
            .get(&endpoint)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|record| query.filter.as_ref().map_or(true, |f| matches_filter(record, f)))
            .collect();
        if query.sort.iter().any(|field| field == "id") {
            records.sort_by_key(id_text);
        }
        if !query.fields.is_empty() {
            for record in &mut records {
                record.retain(|field, _| query.fields.iter().any(|f| f == field));
            }
        }
        let size = query.limit.map_or(self.page_size, |limit| limit as usize);
        let skip = (query.page.saturating_sub(1) as usize) * size;
        Ok(records.into_iter().skip(skip).take(size).collect())
    }

    async fn create(&self, endpoint: Endpoint, record: Record) -> Result<Record, TransportError> {
        let mut state = self.state.lock().unwrap();
        self.check(&state, endpoint)?;
        state.calls.push(Call::Create(endpoint, record.clone()));
        let mut stored = record;
        if self.reassign_ids || RecordId::of(&stored).is_none() {
            stored.insert(
                "id".to_string(),
                Value::String(uuid::Uuid::new_v4().to_string()),
            );
        }
        state
            .collections
            .entry(endpoint)
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn update(&self, endpoint: Endpoint, id: RecordId, patch: Record) -> Result<Record, TransportError> {
        let mut state = self.state.lock().unwrap();
        self.check(&state, endpoint)?;
        state
            .calls
            .push(Call::Update(endpoint, id.to_string(), patch.clone()));
        let record = state
            .collections
            .entry(endpoint)
            .or_default()
            .iter_mut()
            .find(|record| RecordId::of(record).as_ref() == Some(&id))
            .ok_or_else(|| not_found(endpoint, &id))?;
        record.extend(patch);
        Ok(record.clone())
    }

    async fn delete(&self, endpoint: Endpoint, id: RecordId) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        self.check(&state, endpoint)?;
        state.calls.push(Call::Delete(endpoint, id.to_string()));
        let records = state.collections.entry(endpoint).or_default();
        let before = records.len();
        records.retain(|record| RecordId::of(record).as_ref() != Some(&id));
        if records.len() == before {
            return Err(not_found(endpoint, &id));
        }
        Ok(())
    }

    async fn schema_snapshot(&self) -> Result<Value, TransportError> {
        Ok(self.schema())
    }

    async fn schema_diff(&self, snapshot: Value) -> Result<Value, TransportError> {
        if snapshot == self.schema() {
            return Ok(Value::Null);
        }
        Ok(json!({ "hash": "fake-hash", "diff": snapshot }))
    }

    async fn schema_apply(&self, diff: Value) -> Result<Value, TransportError> {
        self.state.lock().unwrap().schema = diff["diff"].clone();
        Ok(Value::Null)
    }
}

pub fn rec(value: Value) -> Record {
    value
        .as_object()
        .cloned()
        .expect("test records are JSON objects")
}

pub fn recs(values: &[Value]) -> Vec<Record> {
    values.iter().cloned().map(rec).collect()
}
