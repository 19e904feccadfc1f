//! Source client trait and query domain model

use serde_json::{Value, json};

use crate::error::SourceError;
use crate::record::Record;

/// One `(field, operator, value)` condition of a search domain.
#[derive(Debug, Clone)]
pub struct Condition {
    pub field: String,
    pub op: &'static str,
    pub value: Value,
}

impl Condition {
    fn new(field: &str, op: &'static str, value: Value) -> Self {
        Self {
            field: field.to_string(),
            op,
            value,
        }
    }

    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self::new(field, "=", value.into())
    }

    pub fn ne(field: &str, value: impl Into<Value>) -> Self {
        Self::new(field, "!=", value.into())
    }

    pub fn gt(field: &str, value: impl Into<Value>) -> Self {
        Self::new(field, ">", value.into())
    }

    pub fn gte(field: &str, value: impl Into<Value>) -> Self {
        Self::new(field, ">=", value.into())
    }

    pub fn lte(field: &str, value: impl Into<Value>) -> Self {
        Self::new(field, "<=", value.into())
    }

    pub fn in_list(field: &str, values: impl IntoIterator<Item = i64>) -> Self {
        Self::new(field, "in", Value::from(values.into_iter().collect::<Vec<_>>()))
    }

    pub fn in_names(field: &str, values: &[&str]) -> Self {
        Self::new(
            field,
            "in",
            Value::from(values.iter().map(|v| v.to_string()).collect::<Vec<_>>()),
        )
    }

    pub fn to_json(&self) -> Value {
        json!([self.field, self.op, self.value])
    }
}

/// AND-ed search conditions.
pub type Domain = Vec<Condition>;

/// Conditions for records inside one day's `[00:00:00, 23:59:59]` window.
pub fn day_window(field: &str, date: chrono::NaiveDate) -> Domain {
    vec![
        Condition::gte(field, format!("{date} 00:00:00")),
        Condition::lte(field, format!("{date} 23:59:59")),
    ]
}

/// Abstraction over the upstream ERP.
///
/// Implemented by [`JsonRpcClient`](crate::rpc::JsonRpcClient) in
/// production and by [`MemoryClient`](crate::memory::MemoryClient) in
/// adapter tests.
pub trait SourceClient: Send {
    /// Capability negotiation: the subset of `candidates` this source's
    /// `model` actually exposes, preserving candidate order. Sources vary
    /// by version and installed modules, so adapters ask before reading.
    fn available_fields(
        &mut self,
        model: &str,
        candidates: &[&str],
    ) -> Result<Vec<String>, SourceError>;

    /// Search for records matching `domain` and read `fields` in one call.
    fn search_read(
        &mut self,
        model: &str,
        domain: &Domain,
        fields: &[&str],
    ) -> Result<Vec<Record>, SourceError>;

    /// Read `fields` for explicit `ids`. Callers batch ids via
    /// [`batch_ids`](crate::record::batch_ids).
    fn read(
        &mut self,
        model: &str,
        ids: &[i64],
        fields: &[&str],
    ) -> Result<Vec<Record>, SourceError>;

    /// Cheap liveness check for connection reuse.
    fn probe(&mut self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_serializes_as_triple() {
        let cond = Condition::eq("state", "posted");
        assert_eq!(cond.to_json(), json!(["state", "=", "posted"]));

        let cond = Condition::in_list("move_type", [1, 2]);
        assert_eq!(cond.to_json(), json!(["move_type", "in", [1, 2]]));
    }

    #[test]
    fn day_window_covers_full_day() {
        let date = "2025-03-15".parse().unwrap();
        let window = day_window("date_order", date);
        assert_eq!(
            window[0].to_json(),
            json!(["date_order", ">=", "2025-03-15 00:00:00"])
        );
        assert_eq!(
            window[1].to_json(),
            json!(["date_order", "<=", "2025-03-15 23:59:59"])
        );
    }
}
