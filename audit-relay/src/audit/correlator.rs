//! Request/response correlation
//!
//! At ingress the raw request body is kept and a business reference number
//! is pulled out of it. At egress the pair is combined with the route and
//! status into one [`AuditEvent`] on the ordered sink. Extraction failures
//! are logged as warnings and never reach the caller.

use std::sync::Arc;

use axum::body::Bytes;
use chrono::Local;
use serde_json::Value;
use thiserror::Error;

use crate::config::AuditConfig;
use crate::formatter::{AuditEvent, Event};
use crate::log_args;
use crate::logger::Logger;

/// Per-request state captured at ingress
///
/// Also inserted into the request extensions, so handlers can read the
/// reference number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationState {
    pub ref_no: Option<String>,
    pub raw_body: Bytes,
}

/// Why a reference number could not be extracted
#[derive(Debug, Error)]
pub enum CorrelationError {
    #[error("request body is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("request body is not a JSON object")]
    NotAnObject,

    #[error("field `{0}` is not a string")]
    NotAString(String),
}

/// Read `field` from a JSON object body
///
/// A missing or `null` field is `Ok(None)`. Numbers are accepted in their
/// textual form.
pub fn extract_reference(body: &[u8], field: &str) -> Result<Option<String>, CorrelationError> {
    let value: Value = serde_json::from_slice(body)?;
    let object = value.as_object().ok_or(CorrelationError::NotAnObject)?;

    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(reference)) => Ok(Some(reference.clone())),
        Some(Value::Number(number)) => Ok(Some(number.to_string())),
        Some(_) => Err(CorrelationError::NotAString(field.to_string())),
    }
}

/// Render a body for the audit envelope
///
/// JSON bodies are re-serialized compactly, anything else becomes a JSON
/// string, and an empty body is `null`.
pub fn serialize_body(body: &[u8]) -> String {
    if body.is_empty() {
        return Value::Null.to_string();
    }

    match serde_json::from_slice::<Value>(body) {
        Ok(value) => value.to_string(),
        Err(_) => Value::String(String::from_utf8_lossy(body).into_owned()).to_string(),
    }
}

/// Pairs each request with its response and emits one audit record
#[derive(Clone, Debug)]
pub struct AuditCorrelator {
    enabled: bool,
    config: Arc<AuditConfig>,
    logger: Logger,
}

impl AuditCorrelator {
    pub fn new(enabled: bool, config: AuditConfig, logger: Logger) -> Self {
        Self {
            enabled,
            config: Arc::new(config),
            logger,
        }
    }

    /// Correlator that never audits
    pub fn disabled(logger: Logger) -> Self {
        Self::new(false, AuditConfig::default(), logger)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Capture the request body and its reference number
    ///
    /// Returns `None` when auditing is disabled.
    pub fn on_ingress(&self, raw_body: Bytes) -> Option<CorrelationState> {
        if !self.enabled {
            return None;
        }

        let ref_no = match extract_reference(&raw_body, &self.config.reference_field) {
            Ok(ref_no) => ref_no,
            Err(e) => {
                self.logger.warn(
                    "AuditCorrelator",
                    "on_ingress",
                    "Unable to fetch %s (%s).. setting value as null",
                    log_args![self.config.reference_field.as_str(), e.to_string()],
                );
                None
            }
        };

        Some(CorrelationState { ref_no, raw_body })
    }

    /// Queue the audit record for a completed exchange
    ///
    /// Without ingress state (no body was captured) the record carries a
    /// `null` reference number and request.
    pub fn on_egress(
        &self,
        state: Option<&CorrelationState>,
        endpoint_path: &str,
        http_status: u16,
        response_body: Bytes,
    ) {
        if !self.enabled {
            return;
        }

        let timestamp = Local::now();
        let endpoint_path = endpoint_path.to_string();
        let ref_no = state.and_then(|s| s.ref_no.clone());
        let request_body = state.map(|s| s.raw_body.clone());

        self.logger.sink().submit(move || {
            Event::Audit(AuditEvent {
                timestamp,
                endpoint_path,
                ref_no,
                http_status,
                request: request_body
                    .as_deref()
                    .map_or_else(|| Value::Null.to_string(), serialize_body),
                response: serialize_body(&response_body),
            })
        });
    }
}
