use serde::{Deserialize, Serialize};

use crate::error::CallError;

/// Callback descriptor handed to native code when a module schedules a
/// re-entry into the script engine (cron fires, background threads).
///
/// Only `module` is required; `func`, `args` and `engine` are optional and
/// any other field is rejected before the callback is accepted.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct CallbackScript {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub func: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
}

impl CallbackScript {
    /// Validates a `callbackScript` JSON value before it is scheduled.
    pub fn from_value(value: serde_json::Value) -> Result<Self, CallError> {
        if !value.is_object() {
            return Err(CallError::invalid_parameter("callbackScript", value));
        }
        let script: CallbackScript = serde_json::from_value(value)?;
        match script.module.as_deref() {
            Some(module) if !module.is_empty() => Ok(script),
            _ => Err(CallError::MissingParameter("module")),
        }
    }

    /// Serialized form passed along to the engine collaborator.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// The single narrow interface through which native code re-enters the
/// hosted script engine. Background execution contexts own an
/// `Arc<dyn ScriptEngine>` together with a moved descriptor.
pub trait ScriptEngine: Send + Sync {
    fn run_script(&self, script: &CallbackScript) -> Result<Vec<u8>, CallError>;
}
