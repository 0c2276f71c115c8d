//! Deterministic routing keys for every message kind.

use depgraph_core::models::EventLogEntry;
use uuid::Uuid;

pub fn package_name_key(package_name: &str) -> String {
    format!("package_name.{package_name}")
}

pub fn distribution_key(distribution_id: Uuid) -> String {
    format!("distribution.{distribution_id}")
}

pub fn requirement_reprocess_key(distribution_id: Uuid) -> String {
    format!("requirement.reprocess.of.{distribution_id}")
}

pub fn requirement_correlate_key(requirement_id: Uuid) -> String {
    format!("requirement.correlate.{requirement_id}")
}

pub fn cdc_event_key(event: &EventLogEntry) -> String {
    format!("cdc.{}.{}.{}", event.schema, event.table, event.event_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use depgraph_core::models::CdcOperation;

    #[test]
    fn test_package_name_key() {
        assert_eq!(package_name_key("flask"), "package_name.flask");
    }

    #[test]
    fn test_distribution_key() {
        let id = Uuid::parse_str("6f1c7a3e-58a5-4a4c-9c5b-8a54be3fe6a1").unwrap();
        assert_eq!(
            distribution_key(id),
            "distribution.6f1c7a3e-58a5-4a4c-9c5b-8a54be3fe6a1"
        );
    }

    #[test]
    fn test_requirement_keys() {
        let id = Uuid::nil();
        assert_eq!(
            requirement_reprocess_key(id),
            "requirement.reprocess.of.00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(
            requirement_correlate_key(id),
            "requirement.correlate.00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_cdc_event_key_carries_schema_table_and_id() {
        let event = EventLogEntry {
            event_id: 43,
            operation: CdcOperation::Insert,
            schema: "pypi_packages".into(),
            table: "requirements".into(),
            before: None,
            after: None,
            timestamp: Utc::now(),
        };
        assert_eq!(cdc_event_key(&event), "cdc.pypi_packages.requirements.43");
    }
}
