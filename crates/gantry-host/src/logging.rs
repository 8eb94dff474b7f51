//! Boundary bridge onto the `log` facade.
//!
//! Scripts log with dynamic level and logger names, so the calls route
//! through runtime-built records rather than the static macros. Backend
//! configuration stays with the embedder.

use log::Level;
use serde::{Deserialize, Serialize};

use gantry_calls::{CallError, CallRegistry};

pub fn level_from_name(name: &str) -> Option<Level> {
    match name.to_ascii_uppercase().as_str() {
        "TRACE" => Some(Level::Trace),
        "DEBUG" => Some(Level::Debug),
        "INFO" => Some(Level::Info),
        "WARN" => Some(Level::Warn),
        // FATAL is accepted for compatibility and folds into ERROR
        "ERROR" | "FATAL" => Some(Level::Error),
        _ => None,
    }
}

pub fn log_message(level: Level, logger: &str, message: &str) {
    log::logger().log(
        &log::Record::builder()
            .args(format_args!("{message}"))
            .level(level)
            .target(logger)
            .build(),
    );
}

pub fn is_level_enabled(level: Level, logger: &str) -> bool {
    level <= log::max_level()
        && log::logger().enabled(&log::Metadata::builder().level(level).target(logger).build())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct LogArgs {
    level: Option<String>,
    logger: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct IsEnabledArgs {
    level: Option<String>,
    logger: Option<String>,
}

#[derive(Debug, Serialize)]
struct IsEnabledResponse {
    enabled: bool,
}

fn parse_level(name: Option<String>) -> Result<Level, CallError> {
    let name = match name {
        Some(name) if !name.is_empty() => name,
        _ => return Err(CallError::MissingParameter("level")),
    };
    level_from_name(&name).ok_or_else(|| CallError::invalid_parameter("level", name))
}

fn parse_logger(name: Option<String>) -> Result<String, CallError> {
    match name {
        Some(name) if !name.is_empty() => Ok(name),
        _ => Err(CallError::MissingParameter("logger")),
    }
}

pub(crate) fn register(registry: &CallRegistry) -> Result<(), CallError> {
    registry.register("logging_log", |input| {
        let args: LogArgs = serde_json::from_slice(input)?;
        let level = parse_level(args.level)?;
        let logger = parse_logger(args.logger)?;
        let message = args.message.unwrap_or_default();
        log_message(level, &logger, &message);
        Ok(b"{}".to_vec())
    })?;

    registry.register("logging_is_level_enabled", |input| {
        let args: IsEnabledArgs = serde_json::from_slice(input)?;
        let level = parse_level(args.level)?;
        let logger = parse_logger(args.logger)?;
        Ok(serde_json::to_vec(&IsEnabledResponse {
            enabled: is_level_enabled(level, &logger),
        })?)
    })?;

    Ok(())
}
