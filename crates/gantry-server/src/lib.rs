//! HTTP serving layer of the runtime: the commit-once request lifecycle,
//! request/response metadata, and the server facade that drives a gateway
//! callback for every wire-level request.
//!
//! The wire protocol itself is out of scope: requests and connections reach
//! this crate through the [`WireRequest`] and [`ResponseChannel`] traits, and
//! template rendering is delegated to a [`TemplateRenderer`] collaborator.

pub mod conf;
mod error;
mod meta;
mod request;
mod server;

pub use error::ServerError;
pub use meta::{RequestMetadata, ResponseMetadata, fold_headers, merge_queries};
pub use request::{Request, ResponseChannel, ResponseWriter, TemplateRenderer, WireRequest};
pub use server::{HttpPath, Server};
