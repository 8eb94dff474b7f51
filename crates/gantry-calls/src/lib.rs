//! Call boundary shared by the script engine and native modules: a
//! name-indexed dispatch registry exchanging byte payloads, the error
//! taxonomy every boundary operation reports through, and the callback
//! descriptor used when native code re-enters the engine.

mod error;
mod registry;
mod script;

pub use error::CallError;
pub use registry::{CallHandler, CallRegistry};
pub use script::{CallbackScript, ScriptEngine};
