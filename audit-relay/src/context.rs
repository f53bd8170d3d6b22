//! Pipeline context shared by every request handler
//!
//! `PipelineContext` owns the ordered sink and the handles built on top of it
//! (logger, audit correlator). It is built once at startup. Broker switches
//! are resolved from the [`ConfigStore`] at that point and never re-read.

use std::sync::Arc;

use crate::audit::AuditCorrelator;
use crate::broker::{BrokerPublisher, DeliveryTransport, ProducerSettings};
use crate::config::{BrokerConfig, Config, ConfigStore, MapStore};
use crate::error::Result;
use crate::formatter::EventKind;
use crate::log_args;
use crate::logger::Logger;
use crate::sink::{BrokerRoutes, LogStream, OrderedLogSink, SinkOptions, TracingStream};

/// Everything a service needs to log and audit
///
/// Cheap to clone. Use it as (or inside) the axum router state.
#[derive(Clone, Debug)]
pub struct PipelineContext {
    config: Arc<Config>,
    sink: OrderedLogSink,
    logger: Logger,
    correlator: AuditCorrelator,
    log_broker: Arc<BrokerConfig>,
    audit_broker: Arc<BrokerConfig>,
}

impl PipelineContext {
    /// Create a builder for the pipeline context
    pub fn builder() -> PipelineContextBuilder {
        PipelineContextBuilder::new()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sink(&self) -> &OrderedLogSink {
        &self.sink
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn correlator(&self) -> &AuditCorrelator {
        &self.correlator
    }

    /// Resolved broker settings for `kind`
    pub fn broker(&self, kind: EventKind) -> &BrokerConfig {
        match kind {
            EventKind::Log => &self.log_broker,
            EventKind::Audit => &self.audit_broker,
        }
    }

    /// Drain the sink and every publisher
    pub async fn shutdown(&self) -> Result<()> {
        self.sink.shutdown().await
    }
}

/// Builder for [`PipelineContext`]
pub struct PipelineContextBuilder {
    config: Option<Config>,
    store: Option<Arc<dyn ConfigStore>>,
    stream: Option<Arc<dyn LogStream>>,
    transport: Option<Arc<dyn DeliveryTransport>>,
    init_tracing: bool,
}

impl PipelineContextBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            store: None,
            stream: None,
            transport: None,
            init_tracing: false,
        }
    }

    /// Set the configuration (defaults to `Config::default()`)
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Key-value source for the `config.kafka.*` switches
    ///
    /// Without a store, broker forwarding stays disabled.
    pub fn store(mut self, store: impl ConfigStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    pub fn shared_store(mut self, store: Arc<dyn ConfigStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Destination for envelope lines (defaults to [`TracingStream`])
    pub fn stream(mut self, stream: impl LogStream) -> Self {
        self.stream = Some(Arc::new(stream));
        self
    }

    /// Transport used instead of connecting to the configured brokers
    pub fn transport(mut self, transport: Arc<dyn DeliveryTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Install the global tracing subscriber during build
    pub fn with_tracing(mut self) -> Self {
        self.init_tracing = true;
        self
    }

    /// Build the context
    ///
    /// Must run inside a Tokio runtime. Fails when broker forwarding is
    /// enabled but its parameters are missing or the broker is unreachable.
    pub async fn build(self) -> Result<PipelineContext> {
        let config = self.config.unwrap_or_default();

        if self.init_tracing {
            if let Err(e) = crate::observability::init_tracing(&config) {
                tracing::debug!("Tracing already initialized: {}", e);
            }
        }

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MapStore::default()));

        let log_broker = BrokerConfig::resolve(store.as_ref(), EventKind::Log)?;
        let audit_broker = BrokerConfig::resolve(store.as_ref(), EventKind::Audit)?;

        let mut routes = BrokerRoutes::new();
        if log_broker.enabled || audit_broker.enabled {
            let servers = if log_broker.enabled {
                &log_broker.bootstrap_servers
            } else {
                &audit_broker.bootstrap_servers
            };

            let transport = match self.transport {
                Some(transport) => transport,
                None => connect_transport(servers, &config.producer).await?,
            };

            if log_broker.enabled {
                routes = routes.with_log(BrokerPublisher::spawn(
                    transport.clone(),
                    &log_broker.topic,
                    config.producer.clone(),
                )?);
            }
            if audit_broker.enabled {
                routes = routes.with_audit(BrokerPublisher::spawn(
                    transport,
                    &audit_broker.topic,
                    config.producer.clone(),
                )?);
            }
        }

        let stream = self.stream.unwrap_or_else(|| Arc::new(TracingStream));
        let sink = OrderedLogSink::spawn(stream, routes, SinkOptions::from_config(&config.sink))?;
        let logger = Logger::new(sink.clone(), &config.service.name);
        let correlator =
            AuditCorrelator::new(audit_broker.enabled, config.audit.clone(), logger.clone());

        logger.info(
            "PipelineContext",
            "build",
            "logger initialized..",
            log_args![],
        );
        tracing::info!(
            log_forwarding = log_broker.enabled,
            audit_forwarding = audit_broker.enabled,
            "Logging pipeline ready for service: {}",
            config.service.name
        );

        Ok(PipelineContext {
            config: Arc::new(config),
            sink,
            logger,
            correlator,
            log_broker: Arc::new(log_broker),
            audit_broker: Arc::new(audit_broker),
        })
    }
}

impl Default for PipelineContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "events")]
async fn connect_transport(
    servers: &str,
    settings: &ProducerSettings,
) -> Result<Arc<dyn DeliveryTransport>> {
    let transport = crate::broker::NatsTransport::connect(servers, settings).await?;
    Ok(Arc::new(transport))
}

#[cfg(not(feature = "events"))]
async fn connect_transport(
    _servers: &str,
    _settings: &ProducerSettings,
) -> Result<Arc<dyn DeliveryTransport>> {
    Err(crate::error::Error::Configuration(
        "Broker forwarding is enabled but audit-relay was built without the `events` feature"
            .to_string(),
    ))
}
