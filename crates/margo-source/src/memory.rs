//! In-memory source fake for adapter and pipeline tests

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::client::{Condition, Domain, SourceClient};
use crate::error::SourceError;
use crate::record::Record;

/// Table-backed [`SourceClient`] with enough domain evaluation for the
/// queries the adapters issue. Records are seeded as JSON objects in the
/// same shape the real backend returns (m2o pairs, `false` for unset).
#[derive(Default)]
pub struct MemoryClient {
    models: FxHashMap<String, Vec<Record>>,
    probe_ok: bool,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self {
            models: FxHashMap::default(),
            probe_ok: true,
        }
    }

    /// Seed one record. Non-object values are ignored.
    pub fn insert(&mut self, model: &str, record: Value) {
        if let Value::Object(map) = record {
            self.models
                .entry(model.to_string())
                .or_default()
                .push(Record(map));
        } else {
            debug_assert!(false, "seeded record must be a JSON object");
        }
    }

    pub fn set_probe(&mut self, ok: bool) {
        self.probe_ok = ok;
    }

    fn rows(&self, model: &str) -> Result<&Vec<Record>, SourceError> {
        self.models
            .get(model)
            .ok_or_else(|| SourceError::MissingModel(model.to_string()))
    }

    fn project(record: &Record, fields: &[&str]) -> Record {
        if fields.is_empty() {
            return record.clone();
        }
        let mut map = serde_json::Map::new();
        if let Some(id) = record.get("id") {
            map.insert("id".to_string(), id.clone());
        }
        for field in fields {
            if let Some(v) = record.get(field) {
                map.insert((*field).to_string(), v.clone());
            }
        }
        Record(map)
    }
}

/// Comparable scalar for a stored field: m2o pairs compare by their id.
fn scalar(value: &Value) -> &Value {
    match value {
        Value::Array(pair) if pair.first().is_some_and(Value::is_number) => &pair[0],
        other => other,
    }
}

fn matches(record: &Record, cond: &Condition) -> bool {
    let Some(stored) = record.get(&cond.field) else {
        return false;
    };
    let stored = scalar(stored);
    match cond.op {
        "=" => stored == &cond.value,
        "!=" => stored != &cond.value,
        "in" => cond
            .value
            .as_array()
            .is_some_and(|list| list.contains(stored)),
        ">" | ">=" | "<" | "<=" => compare(stored, &cond.value).is_some_and(|ord| match cond.op {
            ">" => ord == std::cmp::Ordering::Greater,
            ">=" => ord != std::cmp::Ordering::Less,
            "<" => ord == std::cmp::Ordering::Less,
            _ => ord != std::cmp::Ordering::Greater,
        }),
        _ => false,
    }
}

fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.as_str().cmp(y.as_str())),
        _ => None,
    }
}

impl SourceClient for MemoryClient {
    fn available_fields(
        &mut self,
        model: &str,
        candidates: &[&str],
    ) -> Result<Vec<String>, SourceError> {
        let rows = self.rows(model)?;
        Ok(candidates
            .iter()
            .filter(|f| rows.iter().any(|r| r.get(f).is_some()))
            .map(|f| (*f).to_string())
            .collect())
    }

    fn search_read(
        &mut self,
        model: &str,
        domain: &Domain,
        fields: &[&str],
    ) -> Result<Vec<Record>, SourceError> {
        let rows = self.rows(model)?;
        Ok(rows
            .iter()
            .filter(|r| domain.iter().all(|c| matches(r, c)))
            .map(|r| Self::project(r, fields))
            .collect())
    }

    fn read(
        &mut self,
        model: &str,
        ids: &[i64],
        fields: &[&str],
    ) -> Result<Vec<Record>, SourceError> {
        let rows = self.rows(model)?;
        Ok(rows
            .iter()
            .filter(|r| r.id().is_some_and(|id| ids.contains(&id)))
            .map(|r| Self::project(r, fields))
            .collect())
    }

    fn probe(&mut self) -> bool {
        self.probe_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seeded() -> MemoryClient {
        let mut client = MemoryClient::new();
        client.insert(
            "pos.order",
            json!({"id": 1, "state": "done", "date_order": "2025-03-15 09:30:00"}),
        );
        client.insert(
            "pos.order",
            json!({"id": 2, "state": "draft", "date_order": "2025-03-16 10:00:00"}),
        );
        client.insert(
            "pos.order.line",
            json!({"id": 10, "order_id": [1, "POS/001"], "qty": 2.0}),
        );
        client
    }

    #[test]
    fn search_read_filters_on_domain() {
        let mut client = seeded();
        let rows = client
            .search_read(
                "pos.order",
                &vec![Condition::eq("state", "done")],
                &["date_order"],
            )
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id(), Some(1));
        assert_eq!(rows[0].as_str("state"), None); // projected away
    }

    #[test]
    fn date_window_compares_lexicographically() {
        let mut client = seeded();
        let domain = vec![
            Condition::gte("date_order", "2025-03-15 00:00:00"),
            Condition::lte("date_order", "2025-03-15 23:59:59"),
        ];
        let rows = client.search_read("pos.order", &domain, &[]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id(), Some(1));
    }

    #[test]
    fn in_condition_matches_m2o_by_id() {
        let mut client = seeded();
        let domain = vec![Condition::in_list("order_id", [1])];
        let rows = client.search_read("pos.order.line", &domain, &[]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].m2o_id("order_id"), Some(1));
    }

    #[test]
    fn unknown_model_is_missing_model() {
        let mut client = seeded();
        let err = client.search_read("stock.lot", &vec![], &[]).unwrap_err();
        assert!(matches!(err, SourceError::MissingModel(_)));
    }

    #[test]
    fn available_fields_preserves_candidate_order() {
        let mut client = seeded();
        let fields = client
            .available_fields("pos.order", &["date_order", "no_such_field", "state"])
            .unwrap();
        assert_eq!(fields, vec!["date_order", "state"]);
    }
}
