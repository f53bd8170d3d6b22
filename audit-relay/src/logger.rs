//! Logger: thin public API over the ordered sink
//!
//! `Logger` is fire-and-forget. Each call captures the calling thread and
//! the current time, then queues a builder that interpolates the message on
//! the sink worker. Logging never blocks request handling.

use std::sync::Arc;

use chrono::Local;

use crate::formatter::{current_thread_id, interpolate, Event, LogArg, LogEvent, LogLevel};
use crate::sink::OrderedLogSink;

/// Logger for emitting structured log events
///
/// Cheap to clone; every clone shares the same sink.
#[derive(Clone, Debug)]
pub struct Logger {
    sink: OrderedLogSink,
    service_name: Arc<str>,
}

impl Logger {
    pub fn new(sink: OrderedLogSink, service_name: impl Into<String>) -> Self {
        Self {
            sink,
            service_name: Arc::from(service_name.into()),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn sink(&self) -> &OrderedLogSink {
        &self.sink
    }

    /// Queue a log event (fire-and-forget)
    ///
    /// `message` may contain printf-style conversions filled from `args`.
    pub fn log(
        &self,
        level: LogLevel,
        class_name: &str,
        method_name: &str,
        message: &str,
        args: Vec<LogArg>,
    ) {
        let service_name = self.service_name.to_string();
        let class_name = class_name.to_string();
        let method_name = method_name.to_string();
        let message = message.to_string();
        let thread_id = current_thread_id();
        let timestamp = Local::now();

        self.sink.submit(move || {
            Event::Log(LogEvent {
                service_name,
                class_name,
                method_name,
                thread_id,
                level,
                timestamp,
                message: interpolate(&message, &args),
            })
        });
    }

    pub fn trace(&self, class_name: &str, method_name: &str, message: &str, args: Vec<LogArg>) {
        self.log(LogLevel::Trace, class_name, method_name, message, args);
    }

    pub fn debug(&self, class_name: &str, method_name: &str, message: &str, args: Vec<LogArg>) {
        self.log(LogLevel::Debug, class_name, method_name, message, args);
    }

    pub fn info(&self, class_name: &str, method_name: &str, message: &str, args: Vec<LogArg>) {
        self.log(LogLevel::Info, class_name, method_name, message, args);
    }

    pub fn warn(&self, class_name: &str, method_name: &str, message: &str, args: Vec<LogArg>) {
        self.log(LogLevel::Warn, class_name, method_name, message, args);
    }

    pub fn error(&self, class_name: &str, method_name: &str, message: &str, args: Vec<LogArg>) {
        self.log(LogLevel::Error, class_name, method_name, message, args);
    }
}
