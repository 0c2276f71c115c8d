//! Core domain types for the depgraph ingestion pipeline.
//!
//! This crate holds everything the other crates agree on: the record types
//! that travel through the message broker and the database, the PEP 440
//! version decomposition used to populate the parsed columns of the
//! `versions` table, PEP 503 name canonicalization, and the environment
//! configuration surface shared by every worker process.

pub mod canonical;
pub mod config;
pub mod error;
pub mod models;
pub mod parsing;

pub use canonical::canonicalize_name;
pub use error::{ConfigError, Result};

/// Database schema that owns every pipeline table.
pub const SCHEMA: &str = "pypi_packages";
