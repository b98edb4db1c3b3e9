/*!
 * Logging Module
 * Centralized logging configuration and utilities
 */
pub mod config;
pub mod middleware;

use std::io;
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub use config::LogConfig;

/// Initialize the logging system.
///
/// The returned guards flush the background writers and must outlive the server.
pub fn init(config: &LogConfig) -> Vec<WorkerGuard> {
    // Create log directory if it doesn't exist
    std::fs::create_dir_all(&config.directory).ok();

    // File appender for all logs
    let file_appender = rolling::daily(&config.directory, "app.log");
    let (file_writer, file_guard) = non_blocking(file_appender);

    // File appender for errors only
    let error_appender = rolling::daily(&config.directory, "error.log");
    let (error_writer, error_guard) = non_blocking(error_appender);

    // Console writer
    let (console_writer, console_guard) = non_blocking(io::stdout());

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_filter()));

    // Build the subscriber
    let subscriber = tracing_subscriber::registry().with(env_filter);

    fn error_layer<S>(error_writer: non_blocking::NonBlocking) -> impl Layer<S>
    where
        S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    {
        fmt::layer()
            .json()
            .with_writer(error_writer)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_filter(tracing_subscriber::filter::LevelFilter::ERROR)
    }

    let initialized = if config.is_production() {
        // JSON format for production
        let file_layer = fmt::layer()
            .json()
            .with_writer(file_writer)
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true);

        let console_layer = fmt::layer()
            .json()
            .with_writer(console_writer)
            .with_target(false);

        subscriber
            .with(file_layer)
            .with(error_layer(error_writer))
            .with(console_layer)
            .try_init()
    } else {
        // Pretty format for development
        let file_layer = fmt::layer()
            .with_writer(file_writer)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false);

        let console_layer = fmt::layer()
            .with_writer(console_writer)
            .with_target(true)
            .pretty();

        subscriber
            .with(file_layer)
            .with(error_layer(error_writer))
            .with(console_layer)
            .try_init()
    };

    if let Err(e) = initialized {
        eprintln!("Logging already initialized: {}", e);
    }

    tracing::info!(
        environment = %config.environment,
        directory = %config.directory.display(),
        "Logging initialized"
    );

    vec![file_guard, error_guard, console_guard]
}
