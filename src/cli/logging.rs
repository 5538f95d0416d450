//! Handles logging and progress bars for the CLI.
//!
//! On a terminal, events are rendered compactly above the progress bars of
//! running enrichment transactions. Otherwise they are written as JSON lines
//! through a non-blocking writer, and ANSI styling is switched off.

use std::io::IsTerminal;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_indicatif::IndicatifLayer;
use tracing_indicatif::style::ProgressStyle;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, fmt};

use super::LogArgs;

//================================================================================================
// Statics
//================================================================================================

/// A flag to indicate whether ANSI escape codes should be used.
pub static ANSI: AtomicBool = AtomicBool::new(true);

//================================================================================================
// Modules
//================================================================================================

/// Contains ANSI escape codes for styling terminal output.
pub mod ansi {
    /// ANSI escape code for magenta text.
    pub const MAGENTA: &str = "\x1b[35m";
    /// ANSI escape code to reset terminal styling.
    pub const RESET: &str = "\x1b[0m";
}

//================================================================================================
// Macros
//================================================================================================

/// A macro to log a fatal error.
#[macro_export]
macro_rules! fatal {
    ($error:expr) => {{
        use $crate::cli::logging::{ANSI, ansi};
        let ansi = ANSI.load(std::sync::atomic::Ordering::SeqCst);
        tracing::error!(
            fatal = true,
            "{}FATAL{} {}",
            if ansi { ansi::MAGENTA } else { "" },
            if ansi { ansi::RESET } else { "" },
            $error
        );
    }};
}

//================================================================================================
// Functions
//================================================================================================

/// Initializes the global tracing subscriber. The returned guard flushes
/// buffered JSON output when dropped.
pub fn init_global_subscriber(args: LogArgs) -> WorkerGuard {
    let log_level = level_of(args, std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref());

    let env_filter = EnvFilter::from_default_env().add_directive(log_level.into());

    let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stderr());

    let progress_layer = IndicatifLayer::new().with_progress_style(
        ProgressStyle::with_template("{span_child_prefix}{spinner} {span_name} {wide_msg}")
            .unwrap_or(ProgressStyle::default_spinner()),
    );

    let fmt = if std::io::stderr().is_terminal() {
        fmt::layer()
            .without_time()
            .with_writer(progress_layer.get_stderr_writer())
            .with_target(false)
            .compact()
            .boxed()
    } else {
        ANSI.store(false, Ordering::SeqCst);
        fmt::layer()
            .with_ansi(false)
            .json()
            .with_writer(non_blocking)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(fmt)
        .with(env_filter)
        .with(progress_layer)
        .init();

    guard
}

/// The level implied by the flags and the value of `RUST_LOG`. Quiet flags
/// win over everything, a plain level in `RUST_LOG` over verbosity flags.
pub(super) fn level_of(args: LogArgs, rust_log: Option<&str>) -> LevelFilter {
    match args.quiet {
        0 => (),
        1 => return LevelFilter::WARN,
        _ => return LevelFilter::ERROR,
    }

    if let Some(level) = rust_log.and_then(|l| LevelFilter::from_str(l).ok()) {
        return level;
    }

    match args.verbosity {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}
