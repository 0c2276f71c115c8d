//! Metadata document to requirement rows, end to end: the scan of the
//! RFC-822 sidecar feeding the PEP 508 conversion, including the fallback
//! path for entries the parser rejects.

use depgraph_core::models::Requirement;
use depgraph_pipeline::services::distributions::{convert_requirement, fallback_requirement};
use depgraph_pypi::metadata::parse_core_metadata;
use uuid::Uuid;

fn extract(distribution_id: Uuid, raw_metadata: &str) -> Vec<Requirement> {
    parse_core_metadata(raw_metadata)
        .requires_dist
        .iter()
        .map(|raw| {
            convert_requirement(distribution_id, raw)
                .unwrap_or_else(|| fallback_requirement(distribution_id, raw))
        })
        .collect()
}

#[test]
fn test_wheel_metadata_becomes_requirement_rows() {
    let distribution_id = Uuid::new_v4();
    let metadata = "Metadata-Version: 2.1\n\
                    Name: foo\n\
                    Version: 1.0\n\
                    Requires-Dist: bar>=1,<2; python_version<\"3.12\"\n\
                    \n\
                    The description body is ignored.\n";

    let requirements = extract(distribution_id, metadata);
    assert_eq!(requirements.len(), 1);

    let requirement = &requirements[0];
    assert!(requirement.parsable);
    assert_eq!(requirement.distribution_id, distribution_id);
    assert_eq!(requirement.dependency_name, "bar");
    assert_eq!(
        requirement
            .version_constraint
            .as_deref()
            .unwrap()
            .replace(' ', ""),
        ">=1,<2"
    );
    let marker = requirement.extras.as_deref().unwrap();
    assert!(marker.contains("python_version"));
    assert!(marker.contains("3.12"));
}

#[test]
fn test_malformed_entry_survives_as_unparsable_row() {
    let distribution_id = Uuid::new_v4();
    let metadata = "Name: foo\n\
                    Requires-Dist: good-dep>=2\n\
                    Requires-Dist: !!!\n\
                    Requires-Dist: another[extra]==1.0\n";

    let requirements = extract(distribution_id, metadata);
    assert_eq!(requirements.len(), 3);

    let parsable: Vec<_> = requirements.iter().filter(|r| r.parsable).collect();
    assert_eq!(parsable.len(), 2);
    assert_eq!(parsable[0].dependency_name, "good-dep");
    assert_eq!(parsable[1].dependency_name, "another");
    assert_eq!(
        parsable[1].dependency_extras_arr,
        Some(vec!["extra".to_string()])
    );

    let fallback: Vec<_> = requirements.iter().filter(|r| !r.parsable).collect();
    assert_eq!(fallback.len(), 1);
    assert_eq!(fallback[0].dependency_name, "!!!");
    assert_eq!(fallback[0].version_constraint.as_deref(), Some(""));
}

#[test]
fn test_empty_requires_dist_entry_is_never_a_dependency() {
    // A blank Requires-Dist header parses to an empty value; the fallback
    // row keeps it, and correlation later skips blank names.
    let distribution_id = Uuid::new_v4();
    let metadata = "Name: foo\nRequires-Dist:\n";

    let requirements = extract(distribution_id, metadata);
    assert_eq!(requirements.len(), 1);
    assert!(!requirements[0].parsable);
    assert!(requirements[0].dependency_name.trim().is_empty());
}
