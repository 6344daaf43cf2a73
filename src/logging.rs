// Logging setup: pretty console output, optional JSON file output, and span timing
use eyre::{Result, WrapErr, eyre};
use std::env;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tracing::field::{Field, Visit};
use tracing::{Id, Subscriber, debug, span};
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Context, Layer, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
};

const CRATE_TARGET: &str = "strategy_config_tuner";

static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

pub fn init_logging(bin_name: String) -> Result<()> {
    let console_log_level = env::var("CONSOLE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let file_log_level = env::var("FILE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let log_to_file = env::var("LOG_TO_FILE").map(|v| v == "true").unwrap_or(false);

    // Everything else at warn, this crate at the configured level
    let console_filter = crate_filter(&console_log_level)?;

    let console_layer = fmt::Layer::new()
        .pretty()
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    if log_to_file {
        let log_dir = Path::new("logs");
        fs::create_dir_all(log_dir).wrap_err("Failed to create log directory")?;

        let timestamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
        let file_name = format!("{}_{}.log", bin_name, timestamp);
        let file_appender = tracing_appender::rolling::never(log_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        FILE_GUARD.set(guard).ok(); // keep the writer alive for the whole process

        let file_layer = fmt::Layer::new()
            .json()
            .with_writer(non_blocking)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_filter(crate_filter(&file_log_level)?);

        tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer)
            .with(SpanTimingLayer)
            .try_init()
            .map_err(|e| eyre!("Failed to install subscriber: {}", e))?;
    } else {
        tracing_subscriber::registry()
            .with(console_layer)
            .with(SpanTimingLayer)
            .try_init()
            .map_err(|e| eyre!("Failed to install subscriber: {}", e))?;
    }

    debug!(bin = %bin_name, log_to_file, "Logging initialized");
    Ok(())
}

fn crate_filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(format!("warn,{}={}", CRATE_TARGET, level))
        .wrap_err_with(|| format!("Invalid log level {:?}", level))
}

/// Logs busy / idle / total time when a span created with `on_close = true` closes
struct SpanTimingLayer;

struct SpanTiming {
    started: Instant,
    last: Instant,
    busy: Duration,
    idle: Duration,
}

struct OnCloseVisitor {
    on_close: bool,
}

impl Visit for OnCloseVisitor {
    fn record_bool(&mut self, field: &Field, value: bool) {
        if field.name() == "on_close" {
            self.on_close = value;
        }
    }

    fn record_debug(&mut self, _field: &Field, _value: &dyn std::fmt::Debug) {}
}

impl<S> Layer<S> for SpanTimingLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut visitor = OnCloseVisitor { on_close: false };
        attrs.record(&mut visitor);
        if visitor.on_close {
            let now = Instant::now();
            span.extensions_mut().insert(SpanTiming {
                started: now,
                last: now,
                busy: Duration::ZERO,
                idle: Duration::ZERO,
            });
        }
    }

    fn on_enter(&self, id: &Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            if let Some(timing) = span.extensions_mut().get_mut::<SpanTiming>() {
                let now = Instant::now();
                timing.idle += now - timing.last; // time spent outside the span
                timing.last = now;
            }
        }
    }

    fn on_exit(&self, id: &Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            if let Some(timing) = span.extensions_mut().get_mut::<SpanTiming>() {
                let now = Instant::now();
                timing.busy += now - timing.last;
                timing.last = now;
            }
        }
    }

    fn on_close(&self, id: Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(&id) {
            if let Some(timing) = span.extensions_mut().remove::<SpanTiming>() {
                debug!(
                    span = span.name(),
                    busy_time = ?timing.busy,
                    idle_time = ?timing.idle,
                    total_time = ?timing.started.elapsed(),
                    "span closed"
                );
            }
        }
    }
}
