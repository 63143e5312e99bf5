//! Process-wide log configuration.
//!
//! The library itself only emits `tracing` events. Applications that want
//! them routed to their own logger register a sink callback once at
//! startup through [`LogConfig::init`]; without a sink events go to stderr.

use crate::error::{ErioError, Result};
use std::fmt::{self, Write};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::level_filters::LevelFilter;
use tracing::{Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

/// Receives every event at or above the configured level, already formatted.
pub type Sink = Arc<dyn Fn(Level, &str) + Send + Sync>;

pub struct LogConfig {
    pub level: LevelFilter,
    pub sink: Option<Sink>,
}

impl LogConfig {
    pub fn new(level: LevelFilter) -> Self {
        LogConfig { level, sink: None }
    }

    pub fn with_sink<F>(mut self, sink: F) -> Self
    where
        F: Fn(Level, &str) + Send + Sync + 'static,
    {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Installs the global subscriber. Fails if one is already installed.
    ///
    /// `RUST_LOG` directives, when present, take precedence over `level`.
    pub fn init(self) -> Result<()> {
        let filter = EnvFilter::builder()
            .with_default_directive(self.level.into())
            .from_env_lossy();
        let registry = Registry::default().with(filter);
        let installed = match self.sink {
            Some(sink) => registry.with(SinkLayer::new(self.level, sink)).try_init(),
            None => registry
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .try_init(),
        };
        installed.map_err(|e| ErioError::Logging(e.to_string()))
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig::new(LevelFilter::INFO)
    }
}

impl fmt::Debug for LogConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogConfig")
            .field("level", &self.level)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

/// Forwards events to a [`Sink`] as `message key=value ...`.
pub struct SinkLayer {
    level: LevelFilter,
    sink: Sink,
}

impl SinkLayer {
    pub fn new(level: LevelFilter, sink: Sink) -> Self {
        SinkLayer { level, sink }
    }
}

impl<S: Subscriber> Layer<S> for SinkLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if self.level < level {
            return;
        }

        let mut line = Line::default();
        event.record(&mut line);
        (self.sink)(level, &line.finish());
    }
}

#[derive(Default)]
struct Line {
    message: String,
    fields: String,
}

impl Line {
    fn finish(mut self) -> String {
        if self.message.is_empty() {
            self.fields.trim_start().to_string()
        } else {
            self.message.push_str(&self.fields);
            self.message
        }
    }
}

impl Visit for Line {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}
