//! Ordered log sink
//!
//! Every event, from any thread, is written to the log stream in exactly the
//! order it was submitted. A single dedicated worker thread owns the stream:
//! it runs each deferred event builder, formats the envelope, writes the line
//! and hands it to the broker route for the event's kind.
//!
//! Callers never block on formatting, I/O or the network. [`OrderedLogSink::submit`]
//! only pushes a closure onto an unbounded queue.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::broker::BrokerPublisher;
use crate::config::SinkConfig;
use crate::error::{Error, Result};
use crate::formatter::{Event, EventFormatter, EventKind, LogLevel};

/// Tracing target used by [`TracingStream`]
pub const STREAM_TARGET: &str = "audit_relay::stream";

/// Destination for formatted envelope lines
///
/// Only the sink worker calls `write`, one line at a time.
pub trait LogStream: Send + Sync + 'static {
    fn write(&self, level: LogLevel, line: &str);
}

/// Writes envelopes through the installed `tracing` subscriber
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingStream;

impl LogStream for TracingStream {
    fn write(&self, level: LogLevel, line: &str) {
        match level {
            LogLevel::Trace => tracing::trace!(target: STREAM_TARGET, "{}", line),
            LogLevel::Debug => tracing::debug!(target: STREAM_TARGET, "{}", line),
            LogLevel::Info => tracing::info!(target: STREAM_TARGET, "{}", line),
            LogLevel::Warn => tracing::warn!(target: STREAM_TARGET, "{}", line),
            LogLevel::Error => tracing::error!(target: STREAM_TARGET, "{}", line),
        }
    }
}

/// Keeps every line in memory
///
/// Handy for tests and for hosts that ship lines themselves.
#[derive(Debug, Clone, Default)]
pub struct MemoryStream {
    lines: Arc<Mutex<Vec<(LogLevel, String)>>>,
}

impl MemoryStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines written so far, with their levels
    pub fn lines(&self) -> Vec<(LogLevel, String)> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Lines written so far, without levels
    pub fn messages(&self) -> Vec<String> {
        self.lines().into_iter().map(|(_, line)| line).collect()
    }
}

impl LogStream for MemoryStream {
    fn write(&self, level: LogLevel, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((level, line.to_string()));
    }
}

/// Broker publishers keyed by event kind
///
/// A missing route means forwarding for that kind is disabled.
#[derive(Debug, Clone, Default)]
pub struct BrokerRoutes {
    log: Option<BrokerPublisher>,
    audit: Option<BrokerPublisher>,
}

impl BrokerRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log(mut self, publisher: BrokerPublisher) -> Self {
        self.log = Some(publisher);
        self
    }

    pub fn with_audit(mut self, publisher: BrokerPublisher) -> Self {
        self.audit = Some(publisher);
        self
    }

    /// Publisher for `kind`, if forwarding is enabled
    pub fn route(&self, kind: EventKind) -> Option<&BrokerPublisher> {
        match kind {
            EventKind::Log => self.log.as_ref(),
            EventKind::Audit => self.audit.as_ref(),
        }
    }

    fn publishers(&self) -> impl Iterator<Item = &BrokerPublisher> {
        self.log.iter().chain(self.audit.iter())
    }
}

/// Sink construction options
#[derive(Debug, Clone)]
pub struct SinkOptions {
    pub formatter: EventFormatter,
    /// Upper bound on [`OrderedLogSink::shutdown`]
    pub drain_timeout: Duration,
    pub thread_name: String,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            formatter: EventFormatter::new(),
            drain_timeout: Duration::from_secs(5),
            thread_name: "audit-relay-sink".to_string(),
        }
    }
}

impl SinkOptions {
    pub fn from_config(config: &SinkConfig) -> Self {
        Self {
            formatter: EventFormatter::new().with_pretty(config.pretty_json),
            drain_timeout: config.drain_timeout(),
            ..Self::default()
        }
    }
}

/// Snapshot of the sink counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    /// Events accepted onto the queue
    pub submitted: u64,
    /// Envelopes written to the stream
    pub written: u64,
    /// Events replaced by a placeholder line
    pub degraded: u64,
    /// Events rejected after shutdown
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    written: AtomicU64,
    degraded: AtomicU64,
    dropped: AtomicU64,
}

type Job = Box<dyn FnOnce() -> Event + Send + 'static>;

enum Command {
    Emit(Job),
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

struct SinkInner {
    tx: mpsc::UnboundedSender<Command>,
    closed: AtomicBool,
    counters: Arc<Counters>,
    routes: BrokerRoutes,
    drain_timeout: Duration,
}

/// Process-wide ordered sink
///
/// Cheap to clone. All clones feed the same worker.
#[derive(Clone)]
pub struct OrderedLogSink {
    inner: Arc<SinkInner>,
}

impl std::fmt::Debug for OrderedLogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderedLogSink")
            .field("stats", &self.stats())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl OrderedLogSink {
    /// Start the worker thread
    pub fn spawn(
        stream: Arc<dyn LogStream>,
        routes: BrokerRoutes,
        options: SinkOptions,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let counters = Arc::new(Counters::default());

        let worker = Worker {
            stream,
            formatter: options.formatter,
            routes: routes.clone(),
            counters: counters.clone(),
        };

        std::thread::Builder::new()
            .name(options.thread_name.clone())
            .spawn(move || worker.run(rx))?;

        tracing::debug!("Log sink worker started on thread {}", options.thread_name);

        Ok(Self {
            inner: Arc::new(SinkInner {
                tx,
                closed: AtomicBool::new(false),
                counters,
                routes,
                drain_timeout: options.drain_timeout,
            }),
        })
    }

    /// Queue a deferred event
    ///
    /// `build` runs later on the worker thread. Anything that must reflect the
    /// call site (timestamp, thread id) has to be captured before this call.
    pub fn submit<F>(&self, build: F)
    where
        F: FnOnce() -> Event + Send + 'static,
    {
        let counters = &self.inner.counters;

        if self.inner.closed.load(Ordering::Acquire) {
            counters.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        counters.submitted.fetch_add(1, Ordering::Relaxed);
        if self.inner.tx.send(Command::Emit(Box::new(build))).is_err() {
            counters.submitted.fetch_sub(1, Ordering::Relaxed);
            counters.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Queue an already-built event
    pub fn submit_event(&self, event: impl Into<Event>) {
        let event = event.into();
        self.submit(move || event);
    }

    /// Wait until every event submitted before this call is written and
    /// every routed publisher has attempted delivery
    pub async fn flush(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.inner
            .tx
            .send(Command::Flush(ack))
            .map_err(|_| Error::SinkClosed)?;
        done.await.map_err(|_| Error::SinkClosed)?;

        for publisher in self.inner.routes.publishers() {
            if let Err(e) = publisher.flush().await {
                tracing::warn!("Broker flush failed: {}", e);
            }
        }

        Ok(())
    }

    /// Stop accepting events, then drain everything already queued
    ///
    /// Bounded by the drain timeout. Calling it again is a no-op.
    pub async fn shutdown(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let timeout = self.inner.drain_timeout;
        let deadline = tokio::time::Instant::now() + timeout;

        let (ack, done) = oneshot::channel();
        if self.inner.tx.send(Command::Shutdown(ack)).is_ok()
            && tokio::time::timeout_at(deadline, done).await.is_err()
        {
            tracing::warn!(
                pending = self.pending(),
                "Log sink did not drain within {:?}",
                timeout
            );
            return Err(Error::DrainTimeout(timeout));
        }

        for publisher in self.inner.routes.publishers() {
            match tokio::time::timeout_at(deadline, publisher.flush()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("Broker flush failed: {}", e),
                Err(_) => {
                    tracing::warn!(
                        "Broker publisher for {} did not drain within {:?}",
                        publisher.topic(),
                        timeout
                    );
                    return Err(Error::DrainTimeout(timeout));
                }
            }
        }

        tracing::info!(
            written = self.inner.counters.written.load(Ordering::Relaxed),
            "Log sink drained"
        );
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn routes(&self) -> &BrokerRoutes {
        &self.inner.routes
    }

    pub fn stats(&self) -> SinkStats {
        let counters = &self.inner.counters;
        SinkStats {
            submitted: counters.submitted.load(Ordering::Relaxed),
            written: counters.written.load(Ordering::Relaxed),
            degraded: counters.degraded.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
        }
    }

    fn pending(&self) -> u64 {
        let stats = self.stats();
        stats
            .submitted
            .saturating_sub(stats.written + stats.degraded)
    }
}

struct Worker {
    stream: Arc<dyn LogStream>,
    formatter: EventFormatter,
    routes: BrokerRoutes,
    counters: Arc<Counters>,
}

impl Worker {
    fn run(self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.blocking_recv() {
            match command {
                Command::Emit(job) => self.emit(job),
                Command::Flush(ack) => {
                    let _ = ack.send(());
                }
                Command::Shutdown(ack) => {
                    rx.close();
                    // Anything that raced past the closed flag is still written
                    while let Ok(command) = rx.try_recv() {
                        match command {
                            Command::Emit(job) => self.emit(job),
                            Command::Flush(ack) | Command::Shutdown(ack) => {
                                let _ = ack.send(());
                            }
                        }
                    }
                    let _ = ack.send(());
                    break;
                }
            }
        }

        tracing::debug!("Log sink worker stopped");
    }

    fn emit(&self, job: Job) {
        let event = match panic::catch_unwind(AssertUnwindSafe(job)) {
            Ok(event) => event,
            Err(payload) => {
                return self.degrade(&format!(
                    "event builder panicked: {}",
                    panic_message(payload.as_ref())
                ))
            }
        };

        let line = match self.formatter.format(&event) {
            Ok(line) => line,
            Err(e) => return self.degrade(&e.to_string()),
        };

        let level = event.level();
        if panic::catch_unwind(AssertUnwindSafe(|| self.stream.write(level, &line))).is_err() {
            return self.degrade("log stream panicked while writing");
        }
        self.counters.written.fetch_add(1, Ordering::Relaxed);

        if let Some(publisher) = self.routes.route(event.kind()) {
            publisher.publish(line);
        }
    }

    fn degrade(&self, reason: &str) {
        self.counters.degraded.fetch_add(1, Ordering::Relaxed);
        let line = self.formatter.placeholder(reason);
        let _ = panic::catch_unwind(AssertUnwindSafe(|| {
            self.stream.write(LogLevel::Error, &line)
        }));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::testing::{quick_settings, CapturedEvents, RecordingTransport};
    use crate::formatter::{AuditEvent, LogEvent};
    use serde_json::Value;

    fn spawn_sink(stream: &MemoryStream) -> OrderedLogSink {
        OrderedLogSink::spawn(
            Arc::new(stream.clone()),
            BrokerRoutes::new(),
            SinkOptions::default(),
        )
        .unwrap()
    }

    fn event(level: LogLevel, message: &str) -> LogEvent {
        LogEvent::new("orders", "OrderHandler", "create", level, message)
    }

    fn message_of(line: &str) -> String {
        let value: Value = serde_json::from_str(line).unwrap();
        value["message"].as_str().unwrap_or_default().to_string()
    }

    #[tokio::test]
    async fn test_lines_follow_submission_order_across_threads() {
        let stream = MemoryStream::new();
        let sink = spawn_sink(&stream);
        let order = Arc::new(Mutex::new(Vec::new()));

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let sink = sink.clone();
                let order = order.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let message = format!("p{}-{}", p, i);
                        // Holding the lock ties the recorded order to queue order
                        let mut guard = order.lock().unwrap();
                        sink.submit_event(event(LogLevel::Info, &message));
                        guard.push(message);
                    }
                })
            })
            .collect();

        for producer in producers {
            producer.join().unwrap();
        }
        sink.flush().await.unwrap();

        let written: Vec<String> = stream.messages().iter().map(|l| message_of(l)).collect();
        assert_eq!(written, *order.lock().unwrap());
        assert_eq!(sink.stats().written, 400);
    }

    #[tokio::test]
    async fn test_slow_builder_does_not_reorder() {
        let stream = MemoryStream::new();
        let sink = spawn_sink(&stream);

        sink.submit(|| {
            std::thread::sleep(Duration::from_millis(30));
            event(LogLevel::Info, "E1").into()
        });
        sink.submit_event(event(LogLevel::Error, "E2"));
        sink.submit_event(event(LogLevel::Info, "E3"));
        sink.flush().await.unwrap();

        let lines = stream.lines();
        let levels: Vec<LogLevel> = lines.iter().map(|(level, _)| *level).collect();
        let messages: Vec<String> = lines.iter().map(|(_, l)| message_of(l)).collect();
        assert_eq!(messages, vec!["E1", "E2", "E3"]);
        assert_eq!(levels, vec![LogLevel::Info, LogLevel::Error, LogLevel::Info]);
    }

    #[tokio::test]
    async fn test_panicking_builder_degrades_to_placeholder() {
        let stream = MemoryStream::new();
        let sink = spawn_sink(&stream);

        sink.submit_event(event(LogLevel::Info, "before"));
        sink.submit(|| panic!("boom"));
        sink.submit_event(event(LogLevel::Info, "after"));
        sink.flush().await.unwrap();

        let lines = stream.lines();
        assert_eq!(lines.len(), 3);
        assert_eq!(message_of(&lines[0].1), "before");
        assert_eq!(lines[1].0, LogLevel::Error);
        assert!(lines[1].1.contains("formatError"));
        assert!(lines[1].1.contains("boom"));
        assert_eq!(message_of(&lines[2].1), "after");

        let stats = sink.stats();
        assert_eq!(stats.written, 2);
        assert_eq!(stats.degraded, 1);
    }

    #[tokio::test]
    async fn test_shutdown_drains_then_rejects() {
        let stream = MemoryStream::new();
        let sink = spawn_sink(&stream);

        for i in 0..200 {
            sink.submit_event(event(LogLevel::Debug, &format!("queued-{}", i)));
        }
        sink.shutdown().await.unwrap();
        assert_eq!(stream.messages().len(), 200);
        assert!(sink.is_closed());

        sink.submit_event(event(LogLevel::Info, "too late"));
        assert_eq!(sink.stats().dropped, 1);
        assert_eq!(stream.messages().len(), 200);

        // Second shutdown is a no-op
        sink.shutdown().await.unwrap();
        assert!(matches!(sink.flush().await, Err(Error::SinkClosed)));
    }

    #[tokio::test]
    async fn test_shutdown_is_bounded_by_drain_timeout() {
        let stream = MemoryStream::new();
        let options = SinkOptions {
            drain_timeout: Duration::from_millis(50),
            ..SinkOptions::default()
        };
        let sink = OrderedLogSink::spawn(Arc::new(stream.clone()), BrokerRoutes::new(), options)
            .unwrap();

        sink.submit(|| {
            std::thread::sleep(Duration::from_millis(500));
            event(LogLevel::Info, "slow").into()
        });

        let result = sink.shutdown().await;
        assert!(matches!(result, Err(Error::DrainTimeout(_))));
    }

    #[tokio::test]
    async fn test_events_are_routed_by_kind() {
        let log_transport = RecordingTransport::new();
        let routes = BrokerRoutes::new().with_log(
            BrokerPublisher::spawn(log_transport.clone(), "app.logs", quick_settings()).unwrap(),
        );
        let stream = MemoryStream::new();
        let sink =
            OrderedLogSink::spawn(Arc::new(stream.clone()), routes, SinkOptions::default()).unwrap();

        sink.submit_event(event(LogLevel::Info, "one"));
        sink.submit_event(AuditEvent {
            timestamp: chrono::Local::now(),
            endpoint_path: "/api/pay".to_string(),
            ref_no: None,
            http_status: 200,
            request: "null".to_string(),
            response: "null".to_string(),
        });
        sink.submit_event(event(LogLevel::Warn, "two"));
        sink.flush().await.unwrap();

        // Audit forwarding is off, so only the two log envelopes are published
        let published = log_transport.values();
        assert_eq!(published.len(), 2);
        assert_eq!(message_of(&published[0]), "one");
        assert_eq!(message_of(&published[1]), "two");
        assert!(log_transport.topics().iter().all(|t| t == "app.logs"));

        // The stream still sees all three
        assert_eq!(stream.messages().len(), 3);
        assert_eq!(published[0], stream.messages()[0]);
    }

    #[tokio::test]
    async fn test_broker_failure_never_reaches_stream() {
        let transport = RecordingTransport::failing();
        let routes = BrokerRoutes::new().with_log(
            BrokerPublisher::spawn(transport.clone(), "app.logs", quick_settings()).unwrap(),
        );
        let stream = MemoryStream::new();
        let sink =
            OrderedLogSink::spawn(Arc::new(stream.clone()), routes, SinkOptions::default()).unwrap();

        sink.submit_event(event(LogLevel::Info, "undeliverable"));
        sink.flush().await.unwrap();

        assert_eq!(stream.messages().len(), 1);
        let publisher = sink.routes().route(EventKind::Log).unwrap();
        assert_eq!(publisher.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_broker_failure_is_logged_at_error_level() {
        let events = CapturedEvents::default();
        let _guard = events.install();

        let routes = BrokerRoutes::new().with_log(
            BrokerPublisher::spawn(RecordingTransport::failing(), "app.logs", quick_settings())
                .unwrap(),
        );
        let stream = MemoryStream::new();
        let sink =
            OrderedLogSink::spawn(Arc::new(stream.clone()), routes, SinkOptions::default()).unwrap();

        // Returns straight away even though every delivery attempt fails
        sink.submit_event(event(LogLevel::Info, "undeliverable"));
        assert!(!events.contains(tracing::Level::ERROR, "Failed to send message"));

        sink.flush().await.unwrap();

        assert_eq!(stream.messages().len(), 1);
        assert!(events.contains(
            tracing::Level::ERROR,
            "Failed to send message with key= to topic=app.logs"
        ));
        assert_eq!(sink.stats().degraded, 0);
    }

    #[test]
    fn test_worker_exits_when_sink_dropped() {
        let stream = MemoryStream::new();
        let sink = spawn_sink(&stream);
        sink.submit_event(event(LogLevel::Info, "last words"));
        drop(sink);

        // The worker drains the queue before noticing the closed channel
        for _ in 0..100 {
            if !stream.messages().is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(stream.messages().len(), 1);
    }
}
