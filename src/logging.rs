use once_cell::sync::Lazy;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

// Dropping the guard flushes and stops the background writer, so it lives for the process.
static FILE_GUARD: Lazy<Mutex<Option<WorkerGuard>>> = Lazy::new(|| Mutex::new(None));

/// Initialise logging. In debug mode the default level is `debug` and can be
/// overridden via the `RUST_LOG` environment variable; otherwise `info` is
/// forced.
///
/// When `log_file` is given, output is additionally appended to that file
/// through a non-blocking writer.
pub fn init(debug: bool, log_file: Option<PathBuf>) {
    let level = if debug { "debug" } else { "info" };

    let filter = if debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    } else {
        EnvFilter::new(level)
    };

    let Some(path) = log_file else {
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
        return;
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));
    let file_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "kiosk_overlay.log".into());

    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr.and(writer))
        .with_ansi(false)
        .try_init()
        .is_ok();

    if installed {
        if let Ok(mut slot) = FILE_GUARD.lock() {
            *slot = Some(guard);
        }
    }
}
