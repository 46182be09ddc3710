// src/logger.rs
use slog::Drain;
use std::env;

macro_rules! crate_name {
    () => {
        env!("CARGO_PKG_NAME")
    };
}

macro_rules! crate_version {
    () => {
        env!("CARGO_PKG_VERSION")
    };
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Term,
}

pub fn setup_logger(log_level: String, format: LogFormat) {
    let level = get_log_level(log_level);
    let service = crate_name!();
    let version = crate_version!();

    let log = match format {
        LogFormat::Json => {
            let drain = slog_json::Json::new(std::io::stderr())
                .add_default_keys()
                .build()
                .fuse();
            let drain = slog_async::Async::new(drain)
                .build()
                .filter_level(level)
                .fuse();
            slog::Logger::root(drain, slog::o!("svc" => service, "version" => version))
        }
        LogFormat::Term => {
            let decorator = slog_term::TermDecorator::new().stderr().build();
            let drain = slog_term::FullFormat::new(decorator).build().fuse();
            let drain = slog_async::Async::new(drain)
                .build()
                .filter_level(level)
                .fuse();
            slog::Logger::root(drain, slog::o!("svc" => service, "version" => version))
        }
    };

    let _guard = slog_scope::set_global_logger(log);
    _guard.cancel_reset()
}

// get_log_level from LOG_LVL env else default to INFO
pub fn get_log_level(log_level: String) -> slog::Level {
    let log_level = if !log_level.is_empty() {
        log_level
    } else {
        env::var("LOG_LVL").unwrap_or_else(|_| String::from("INFO"))
    };

    match log_level.to_uppercase().as_str() {
        "INFO" => slog::Level::Info,
        "DEBUG" => slog::Level::Debug,
        "WARNING" => slog::Level::Warning,
        "ERROR" => slog::Level::Error,
        "TRACE" => slog::Level::Trace,
        "CRITICAL" => slog::Level::Critical,
        _ => slog::Level::Info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_names_are_case_insensitive() {
        assert_eq!(get_log_level("debug".into()), slog::Level::Debug);
        assert_eq!(get_log_level("Warning".into()), slog::Level::Warning);
        assert_eq!(get_log_level("CRITICAL".into()), slog::Level::Critical);
    }

    #[test]
    fn unknown_log_level_falls_back_to_info() {
        assert_eq!(get_log_level("verbose".into()), slog::Level::Info);
    }
}
