// Logger setup
//
// stdout in text or JSON, plus an optional daily-rolling file.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

use crate::models::config::{LogFormat, LoggingConfig};

const LOG_FILE_PREFIX: &str = "antigravity-gateway.log";

/// Keeps the file writer alive; drop it to flush.
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// `RUST_LOG` wins over the configured level.
pub fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn stdout_layer(format: LogFormat) -> BoxedLayer {
    match format {
        LogFormat::Text => fmt::layer().with_target(true).with_line_number(true).boxed(),
        LogFormat::Json => fmt::layer().json().with_current_span(false).boxed(),
    }
}

/// Install the global subscriber.
pub fn init_logger(config: &LoggingConfig) -> Result<LogGuard, String> {
    let mut layers: Vec<BoxedLayer> = vec![stdout_layer(config.format)];
    let mut file_guard = None;

    if let Some(dir) = &config.dir {
        std::fs::create_dir_all(dir)
            .map_err(|e| format!("Failed to create log directory {:?}: {}", dir, e))?;
        let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        file_guard = Some(guard);

        let file_layer = fmt::layer().with_writer(writer).with_ansi(false);
        layers.push(match config.format {
            LogFormat::Text => file_layer.boxed(),
            LogFormat::Json => file_layer.json().boxed(),
        });
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(build_filter(&config.level))
        .try_init()
        .map_err(|e| format!("Failed to initialize logger: {}", e))?;

    Ok(LogGuard {
        _file_guard: file_guard,
    })
}
