pub mod candidates;
pub mod cdc;
pub mod distributions;
pub mod package_names;
pub mod reprocess;
