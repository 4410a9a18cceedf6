//! Logging initialisation via tracing-subscriber.
//!
//! Call [`init`] once at startup, after the effective level is resolved.

use tracing_subscriber::EnvFilter;

use crate::error::AppError;

/// Crates whose per-request chatter drowns the relay's own logs. Capped at
/// `warn` whenever the configured level is a bare level name.
const NOISY_TARGETS: &[&str] = &["hyper", "hyper_util", "reqwest", "rustls", "h2"];

/// Install the global subscriber, writing to stderr.
///
/// `level` is a bare level (`"info"`) or a full directive string such as
/// `"relay_bot=debug,teloxide=info"`. With `prefer_level` set (a `-v` flag was
/// given) `level` beats `RUST_LOG`; otherwise `RUST_LOG` wins when set.
pub fn init(level: &str, prefer_level: bool) -> Result<(), AppError> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(level, prefer_level, rust_log.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| AppError::Logger(format!("failed to set subscriber: {e}")))
}

/// Pick the filter source and parse it. The losing source is only consulted
/// when the winner does not parse.
fn build_filter(
    level: &str,
    prefer_level: bool,
    rust_log: Option<&str>,
) -> Result<EnvFilter, AppError> {
    let rust_log = rust_log.filter(|s| !s.trim().is_empty());

    let (first, second) = match (prefer_level, rust_log) {
        (false, Some(env)) => (env, Some(level)),
        (true, env) => (level, env),
        (false, None) => (level, None),
    };

    match parse_directives(first) {
        Ok(filter) => Ok(filter),
        Err(first_err) => match second {
            Some(fallback) => parse_directives(fallback).map_err(|second_err| {
                AppError::Logger(format!(
                    "invalid log filter '{first}': {first_err}; fallback '{fallback}': {second_err}"
                ))
            }),
            None => Err(AppError::Logger(format!("invalid log filter '{first}': {first_err}"))),
        },
    }
}

fn parse_directives(spec: &str) -> Result<EnvFilter, String> {
    let mut filter = EnvFilter::try_new(spec).map_err(|e| e.to_string())?;
    if is_bare_level(spec) {
        for target in NOISY_TARGETS {
            let directive = format!("{target}=warn").parse().map_err(|e| format!("{e}"))?;
            filter = filter.add_directive(directive);
        }
    }
    Ok(filter)
}

fn is_bare_level(spec: &str) -> bool {
    matches!(
        spec.trim().to_ascii_lowercase().as_str(),
        "error" | "warn" | "info" | "debug" | "trace"
    )
}
