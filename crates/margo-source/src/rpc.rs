//! JSON-RPC client for the ERP backend

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};

use crate::client::{Domain, SourceClient};
use crate::error::SourceError;
use crate::record::Record;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Connection settings, normally read from the `[source]` config section.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub url: String,
    pub database: String,
    pub username: String,
    pub api_key: String,
}

#[derive(Debug, Deserialize)]
struct RpcFault {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<RpcFaultData>,
}

#[derive(Debug, Deserialize)]
struct RpcFaultData {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcFault>,
}

/// Blocking JSON-RPC client speaking the ERP's `execute_kw` protocol.
///
/// Authenticates lazily on the first call and keeps the resulting user id
/// for the connection's lifetime. Not shared across threads; each worker
/// opens its own via the connection factory.
pub struct JsonRpcClient {
    http: reqwest::blocking::Client,
    config: SourceConfig,
    uid: Option<i64>,
    next_id: u64,
}

impl JsonRpcClient {
    pub fn new(config: SourceConfig) -> Result<Self, SourceError> {
        let http = reqwest::blocking::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SourceError::from_reqwest(&e))?;
        Ok(Self {
            http,
            config,
            uid: None,
            next_id: 1,
        })
    }

    fn call(&mut self, service: &str, method: &str, args: Value) -> Result<Value, SourceError> {
        let id = self.next_id;
        self.next_id += 1;
        let body = json!({
            "jsonrpc": "2.0",
            "method": "call",
            "params": {"service": service, "method": method, "args": args},
            "id": id,
        });

        let endpoint = format!("{}/jsonrpc", self.config.url.trim_end_matches('/'));
        let response: RpcResponse = self
            .http
            .post(&endpoint)
            .json(&body)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| SourceError::from_reqwest(&e))?
            .json()
            .map_err(|e| SourceError::Protocol(format!("invalid RPC response: {e}")))?;

        if let Some(fault) = response.error {
            let message = fault
                .data
                .and_then(|d| d.message)
                .unwrap_or(fault.message);
            if message.contains("does not exist")
                || message.contains("doesn't exist")
                || message.contains("Invalid model")
            {
                return Err(SourceError::MissingModel(message));
            }
            return Err(SourceError::Rpc {
                code: fault.code,
                message,
            });
        }
        response
            .result
            .ok_or_else(|| SourceError::Protocol("response carries neither result nor error".to_string()))
    }

    fn uid(&mut self) -> Result<i64, SourceError> {
        if let Some(uid) = self.uid {
            return Ok(uid);
        }
        let result = self.call(
            "common",
            "login",
            json!([self.config.database, self.config.username, self.config.api_key]),
        )?;
        // Login failure comes back as `false`, not a fault
        let uid = result
            .as_i64()
            .ok_or_else(|| SourceError::Auth(format!("login rejected for {}", self.config.username)))?;
        log::debug!("authenticated against {} as uid {uid}", self.config.url);
        self.uid = Some(uid);
        Ok(uid)
    }

    fn execute_kw(
        &mut self,
        model: &str,
        method: &str,
        args: Value,
        kwargs: Value,
    ) -> Result<Value, SourceError> {
        let uid = self.uid()?;
        self.call(
            "object",
            "execute_kw",
            json!([
                self.config.database,
                uid,
                self.config.api_key,
                model,
                method,
                args,
                kwargs,
            ]),
        )
    }

    fn decode_records(value: Value) -> Result<Vec<Record>, SourceError> {
        match value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(map) => Ok(Record(map)),
                    other => Err(SourceError::Protocol(format!(
                        "expected record object, got {other}"
                    ))),
                })
                .collect(),
            other => Err(SourceError::Protocol(format!(
                "expected record list, got {other}"
            ))),
        }
    }
}

impl SourceClient for JsonRpcClient {
    fn available_fields(
        &mut self,
        model: &str,
        candidates: &[&str],
    ) -> Result<Vec<String>, SourceError> {
        let result = self.execute_kw(model, "fields_get", json!([]), json!({"attributes": ["type"]}))?;
        let known = match result {
            Value::Object(map) => map,
            other => {
                return Err(SourceError::Protocol(format!(
                    "expected field map, got {other}"
                )));
            }
        };
        Ok(candidates
            .iter()
            .filter(|f| known.contains_key(**f))
            .map(|f| (*f).to_string())
            .collect())
    }

    fn search_read(
        &mut self,
        model: &str,
        domain: &Domain,
        fields: &[&str],
    ) -> Result<Vec<Record>, SourceError> {
        let domain_json: Vec<Value> = domain.iter().map(|c| c.to_json()).collect();
        let result = self.execute_kw(
            model,
            "search_read",
            json!([domain_json]),
            json!({"fields": fields}),
        )?;
        Self::decode_records(result)
    }

    fn read(
        &mut self,
        model: &str,
        ids: &[i64],
        fields: &[&str],
    ) -> Result<Vec<Record>, SourceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let result = self.execute_kw(model, "read", json!([ids]), json!({"fields": fields}))?;
        Self::decode_records(result)
    }

    fn probe(&mut self) -> bool {
        match self.call("common", "version", json!([])) {
            Ok(_) => true,
            Err(e) => {
                log::debug!("probe failed: {e}");
                false
            }
        }
    }
}
