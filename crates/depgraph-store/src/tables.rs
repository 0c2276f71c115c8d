//! Qualified table names for the pipeline schema.

pub const PACKAGE_NAMES: &str = "pypi_packages.package_names";
pub const VERSIONS: &str = "pypi_packages.versions";
pub const DISTRIBUTIONS: &str = "pypi_packages.distributions";
pub const REQUIREMENTS: &str = "pypi_packages.requirements";
pub const CANDIDATES: &str = "pypi_packages.candidates";
pub const CDC_EVENT_LOG: &str = "pypi_packages.cdc_event_log";
pub const CDC_OFFSETS: &str = "pypi_packages.cdc_offsets";

/// Bare event-log table name, the key under which its offset is stored.
pub const CDC_EVENT_LOG_TABLE: &str = "cdc_event_log";

#[cfg(test)]
mod tests {
    use depgraph_core::SCHEMA;

    #[test]
    fn test_tables_live_in_the_pipeline_schema() {
        for table in [
            super::PACKAGE_NAMES,
            super::VERSIONS,
            super::DISTRIBUTIONS,
            super::REQUIREMENTS,
            super::CANDIDATES,
            super::CDC_EVENT_LOG,
            super::CDC_OFFSETS,
        ] {
            assert!(table.starts_with(&format!("{SCHEMA}.")));
        }
    }
}
