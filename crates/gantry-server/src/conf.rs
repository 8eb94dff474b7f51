//! Server creation configuration, decoded from the JSON document the
//! embedder passes when creating a server.

use serde::{Deserialize, Serialize};

use crate::error::ServerError;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct ServerConfig {
    pub number_of_threads: u16,
    pub tcp_port: u16,
    pub ip_address: String,
    pub ssl: SslConfig,
    pub document_roots: Vec<DocumentRoot>,
    pub request_payload: RequestPayloadConfig,
    pub logging: LoggingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            number_of_threads: 2,
            tcp_port: 8080,
            ip_address: "0.0.0.0".to_string(),
            ssl: SslConfig::default(),
            document_roots: Vec::new(),
            request_payload: RequestPayloadConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_json(json: &str) -> Result<ServerConfig, ServerError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct SslConfig {
    pub key_file: String,
    pub key_password: String,
    pub verify_file: String,
    pub verify_subject_substr: String,
}

impl SslConfig {
    pub fn is_enabled(&self) -> bool {
        !self.key_file.is_empty()
    }
}

/// Static-content mount: requests under `resource` are served from a
/// directory or zip archive by the wire layer.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct DocumentRoot {
    pub resource: String,
    pub dir_path: String,
    pub zip_path: String,
    pub cache_max_age_seconds: u32,
    pub mime_types: Vec<MimeType>,
}

impl Default for DocumentRoot {
    fn default() -> Self {
        Self {
            resource: String::new(),
            dir_path: String::new(),
            zip_path: String::new(),
            cache_max_age_seconds: 604800,
            mime_types: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct MimeType {
    pub extension: String,
    pub mime: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct RequestPayloadConfig {
    pub tmp_dir_path: String,
    pub tmp_filename_length: u16,
    pub memory_limit_bytes: u32,
}

impl Default for RequestPayloadConfig {
    fn default() -> Self {
        Self {
            tmp_dir_path: String::new(),
            tmp_filename_length: 32,
            memory_limit_bytes: 1 << 20,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct LoggingConfig {
    pub appenders: Vec<AppenderConfig>,
    pub loggers: Vec<LoggerConfig>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct AppenderConfig {
    pub appender_type: String,
    pub layout: String,
    pub file_path: String,
    pub threshold_level: String,
}

impl Default for AppenderConfig {
    fn default() -> Self {
        Self {
            appender_type: "NULL".to_string(),
            layout: "%d{%Y-%m-%d %H:%M:%S,%q} [%-5p %-5.5t %-20.20c] %m%n".to_string(),
            file_path: String::new(),
            threshold_level: "TRACE".to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct LoggerConfig {
    pub name: String,
    pub level: String,
}
