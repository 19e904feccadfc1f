//! Source record value model
//!
//! The ERP serializes records as JSON objects with some quirks: an absent
//! value is `false` (not `null`), a many-to-one link is a `[id, "display
//! name"]` pair, a x2many link is a plain id array. The accessors here
//! absorb all of that and hand adapters plain `Option`s.

use serde_json::{Map, Value};

/// Ids are read back in sorted batches of this size per RPC call.
pub const BATCH_SIZE: usize = 500;

/// One record returned by the source.
#[derive(Debug, Clone, Default)]
pub struct Record(pub Map<String, Value>);

impl Record {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Record id. Every readable record carries one.
    pub fn id(&self) -> Option<i64> {
        self.as_i64("id")
    }

    pub fn as_i64(&self, field: &str) -> Option<i64> {
        match self.0.get(field)? {
            Value::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self, field: &str) -> Option<f64> {
        match self.0.get(field)? {
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_str(&self, field: &str) -> Option<&str> {
        match self.0.get(field)? {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self, field: &str) -> Option<bool> {
        match self.0.get(field)? {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Id half of a many-to-one `[id, name]` pair. `false` means unset.
    pub fn m2o_id(&self, field: &str) -> Option<i64> {
        match self.0.get(field)? {
            Value::Array(pair) => pair.first()?.as_i64(),
            Value::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    /// Display-name half of a many-to-one `[id, name]` pair.
    pub fn m2o_name(&self, field: &str) -> Option<&str> {
        match self.0.get(field)? {
            Value::Array(pair) => pair.get(1)?.as_str(),
            _ => None,
        }
    }

    /// Ids of a x2many field, in source order. Empty when unset.
    pub fn o2m_ids(&self, field: &str) -> Vec<i64> {
        match self.0.get(field) {
            Some(Value::Array(ids)) => ids.iter().filter_map(Value::as_i64).collect(),
            _ => Vec::new(),
        }
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Sort ids and split them into read-sized batches.
pub fn batch_ids(ids: impl IntoIterator<Item = i64>) -> Vec<Vec<i64>> {
    let mut sorted: Vec<i64> = ids.into_iter().collect();
    sorted.sort_unstable();
    sorted.dedup();
    sorted.chunks(BATCH_SIZE).map(<[i64]>::to_vec).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => Record(map),
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn m2o_pair_decodes_both_halves() {
        let rec = record(json!({"product_id": [42, "Widget A"]}));
        assert_eq!(rec.m2o_id("product_id"), Some(42));
        assert_eq!(rec.m2o_name("product_id"), Some("Widget A"));
    }

    #[test]
    fn false_means_absent() {
        let rec = record(json!({
            "product_id": false,
            "qty": false,
            "name": false,
        }));
        assert_eq!(rec.m2o_id("product_id"), None);
        assert_eq!(rec.m2o_name("product_id"), None);
        assert_eq!(rec.as_f64("qty"), None);
        assert_eq!(rec.as_str("name"), None);
    }

    #[test]
    fn missing_field_is_none() {
        let rec = record(json!({}));
        assert_eq!(rec.as_i64("anything"), None);
        assert!(rec.o2m_ids("lines").is_empty());
    }

    #[test]
    fn o2m_collects_ids() {
        let rec = record(json!({"payment_ids": [3, 1, 2]}));
        assert_eq!(rec.o2m_ids("payment_ids"), vec![3, 1, 2]);
    }

    #[test]
    fn batch_ids_sorted_deduped_chunked() {
        let batches = batch_ids([5, 1, 5, 3]);
        assert_eq!(batches, vec![vec![1, 3, 5]]);

        let many: Vec<i64> = (0..1200).collect();
        let batches = batch_ids(many);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 500);
        assert_eq!(batches[2].len(), 200);
        assert_eq!(batches[0][0], 0);
        assert_eq!(batches[2][199], 1199);
    }
}
