//! Processing services and runnable entry points for the depgraph pipeline.
//!
//! The `services` module holds the domain logic: enumerating a package's
//! versions and distributions, extracting requirements from distribution
//! metadata, correlating requirements with candidate versions, and draining
//! the CDC event log. The `workers` module wires each service to its broker
//! queue; `loaders` covers the one-shot commands that seed the queues.

pub mod bootstrap;
pub mod error;
pub mod loaders;
pub mod services;
pub mod workers;

pub use error::{PipelineError, Result};
