use cfg_if::cfg_if;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

cfg_if! {
    if #[cfg(target_arch = "wasm32")] {
        pub fn init(config: &LoggingConfig) {
            // Log to browser console via tracing-wasm
            let filter = EnvFilter::try_new(&config.level)
                .unwrap_or_else(|_| EnvFilter::new("info"));

            let wasm_layer = tracing_wasm::WASMLayer::new(tracing_wasm::WASMLayerConfig::default());

            // A second init (e.g. two simulations on one page) keeps the first subscriber.
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(wasm_layer)
                .try_init();

            #[cfg(feature = "console_error_panic_hook")]
            console_error_panic_hook::set_once();
        }
    } else {
        use tracing_appender::non_blocking::WorkerGuard;
        use tracing_subscriber::fmt;
        use std::env;
        use std::io;
        use std::path::{Path, PathBuf};
        use once_cell::sync::OnceCell;

        /// Overrides the log file location.
        pub const LOG_FILE_ENV: &str = "AVATAR_SIM_LOG_FILE";
        pub const DEFAULT_LOG_FILE: &str = "logs/avatar_sim.log";

        pub fn log_file_path() -> PathBuf {
            env::var_os(LOG_FILE_ENV)
                .filter(|v| !v.is_empty())
                .map_or_else(|| PathBuf::from(DEFAULT_LOG_FILE), PathBuf::from)
        }

        static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

        pub fn init(config: &LoggingConfig) {
            // RUST_LOG wins over the configured level
            let filter = EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&config.level))
                .unwrap_or_else(|_| EnvFilter::new("info"));

            let console_layer = fmt::layer()
                .with_writer(io::stderr)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_level(true)
                .compact();

            let file_layer = config.file.then(|| {
                let log_path = log_file_path();
                let path = log_path.as_path();
                let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
                let file_name = path.file_name().unwrap_or(std::ffi::OsStr::new("avatar_sim.log"));
                let (nb_writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, file_name));
                let _ = FILE_GUARD.set(guard);

                fmt::layer()
                    .with_writer(nb_writer)
                    .with_ansi(false)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_level(true)
                    .compact()
            });

            if tracing_subscriber::registry()
                .with(filter)
                .with(console_layer)
                .with(file_layer)
                .try_init()
                .is_err()
            {
                tracing::debug!("tracing subscriber already installed");
                return;
            }

            // Hook panics to log with backtrace
            std::panic::set_hook(Box::new(|info| {
                let mut msg = String::new();
                if let Some(loc) = info.location() {
                    msg.push_str(&format!("panic at {}:{}:{} ", loc.file(), loc.line(), loc.column()));
                }
                if let Some(s) = info.payload().downcast_ref::<&str>() { msg.push_str(s); }
                else if let Some(s) = info.payload().downcast_ref::<String>() { msg.push_str(s); }
                else { msg.push_str("<non-string panic>"); }
                let bt = std::backtrace::Backtrace::force_capture();
                tracing::error!("{}\nBacktrace:\n{:?}", msg, bt);
            }));
        }
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;

    #[test]
    fn log_file_follows_the_environment() {
        std::env::set_var(LOG_FILE_ENV, "/tmp/sim/run.log");
        assert_eq!(log_file_path(), std::path::PathBuf::from("/tmp/sim/run.log"));
        std::env::remove_var(LOG_FILE_ENV);
        assert_eq!(log_file_path(), std::path::PathBuf::from(DEFAULT_LOG_FILE));
    }
}
