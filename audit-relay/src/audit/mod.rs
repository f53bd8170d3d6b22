//! Request/response auditing
//!
//! [`AuditCorrelator`] pairs each HTTP request with its response and emits a
//! single audit record through the ordered sink. [`audit_middleware`] wires it
//! into an axum router.
//!
//! Auditing is on when `config.kafka.enable-audit-kafka` is true. Reference
//! number extraction failures are logged as warnings; the request itself is
//! never failed because of auditing.

pub mod correlator;
pub mod middleware;

pub use correlator::{extract_reference, serialize_body, AuditCorrelator, CorrelationError, CorrelationState};
pub use middleware::{audit_middleware, path_matches_patterns};
