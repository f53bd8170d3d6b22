//! # audit-relay
//!
//! Strictly-ordered structured logging and request/response auditing for axum
//! services, with optional forwarding of every envelope to a message broker.
//!
//! ## Features
//!
//! - **Ordered sink**: one worker thread writes every event in submission order
//! - **Canonical envelopes**: fixed JSON layout for log and audit records
//! - **Audit correlation**: request body, reference number, status and response in one record
//! - **Broker forwarding**: NATS JetStream with linger batching and retries (`events` feature)
//! - **Property files**: runtime refresh and atomic in-place updates
//!
//! ## Example
//!
//! ```rust,no_run
//! use audit_relay::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let properties = PropertyCache::load("application.properties")?;
//!     let ctx = PipelineContext::builder()
//!         .config(config)
//!         .store(properties)
//!         .build()
//!         .await?;
//!
//!     ctx.logger().info("Main", "main", "listening on %s", log_args!["0.0.0.0:8080"]);
//!
//!     let app: Router = Router::new()
//!         .route("/api/pay", post(|body: String| async move { body }))
//!         .layer(from_fn_with_state(ctx.correlator().clone(), audit_middleware));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//!     axum::serve(listener, app).await?;
//!
//!     ctx.shutdown().await
//! }
//! ```

pub mod audit;
pub mod broker;
pub mod config;
pub mod context;
pub mod error;
pub mod formatter;
pub mod logger;
pub mod observability;
pub mod properties;
pub mod sink;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::audit::{audit_middleware, AuditCorrelator, CorrelationState};
    pub use crate::broker::{
        Acks, BrokerPublisher, DeliveryReport, DeliveryTransport, ProducerSettings, Record,
    };

    #[cfg(feature = "events")]
    pub use crate::broker::NatsTransport;

    pub use crate::config::{BrokerConfig, Config, ConfigStore, FigmentStore, MapStore};
    pub use crate::context::{PipelineContext, PipelineContextBuilder};
    pub use crate::error::{Error, Result};
    pub use crate::formatter::{
        interpolate, AuditEvent, Event, EventFormatter, EventKind, LogArg, LogEvent, LogLevel,
    };
    pub use crate::log_args;
    pub use crate::logger::Logger;
    pub use crate::observability::init_tracing;
    pub use crate::properties::{update_property, PropertyCache};
    pub use crate::sink::{
        BrokerRoutes, LogStream, MemoryStream, OrderedLogSink, SinkOptions, SinkStats,
        TracingStream,
    };

    // Re-export axum essentials for wiring the middleware
    pub use axum::{
        middleware::from_fn_with_state,
        routing::{get, post},
        Router,
    };
}
