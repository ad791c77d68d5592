use std::path::PathBuf;

use log::Dispatch;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt::{Layer, Subscriber},
    layer::SubscriberExt,
};

fn create_filter(verbose: Option<u8>) -> anyhow::Result<EnvFilter> {
    let mut extreme_trace = false;

    let level_filter = match verbose {
        None | Some(0) => LevelFilter::INFO,
        Some(1) => LevelFilter::DEBUG,
        _ => {
            extreme_trace = verbose > Some(2);
            LevelFilter::TRACE
        }
    };

    let mut filter = EnvFilter::from_default_env()
        .add_directive(level_filter.into())
        .add_directive("tokio_postgres=info".parse()?);

    // per-event dispatch logs are very noisy, only show them at the highest verbosity
    if !extreme_trace {
        filter = filter.add_directive("role_persist::event=debug".parse()?);
    }

    Ok(filter)
}

/// Builds the global log dispatcher, writing to stdout and, if `dir` is given,
/// to a daily-rotated log file in that directory.
///
/// The returned guard must be kept alive to flush the file writer.
pub fn generate(verbose: Option<u8>, dir: Option<PathBuf>) -> anyhow::Result<(Dispatch, Option<WorkerGuard>)> {
    let filter = create_filter(verbose)?;

    Ok(match dir {
        None => (
            Dispatch::new(Subscriber::builder().with_env_filter(filter).with_writer(std::io::stdout).finish()),
            None,
        ),
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            let file_logger = Layer::new().with_writer(non_blocking).with_ansi(false);
            let stdout_logger = Layer::new().with_writer(std::io::stdout);

            let collector = tracing_subscriber::registry().with(filter).with(file_logger).with(stdout_logger);

            (Dispatch::new(collector), Some(guard))
        }
    })
}
