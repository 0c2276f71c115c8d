//! Thin HTTP facade over the PyPI endpoints the pipeline crawls.
//!
//! Four surfaces, nothing more: the legacy per-package JSON API, the Simple
//! index line stream, the per-distribution metadata sidecar, and the
//! popular-packages list. Everything returns domain-shaped responses; the
//! caller decides what to persist.

pub mod client;
pub mod error;
pub mod metadata;
pub mod simple;
pub mod types;

pub use client::PypiClient;
pub use error::{PypiError, Result};
pub use metadata::CoreMetadata;
pub use simple::SimpleIndexScanner;
pub use types::{DistributionFile, PackageDistributionsResponse, PopularPackage};
