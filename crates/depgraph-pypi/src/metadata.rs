//! Minimal scan of a wheel's RFC-822 metadata sidecar.
//!
//! The pipeline only cares about `Requires-Dist` headers. The header block is
//! scanned line by line up to the first blank line, with folded continuation
//! lines (leading whitespace) appended to the header they extend.

/// The parts of a distribution's core metadata the pipeline extracts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoreMetadata {
    /// Raw `Requires-Dist` values, one per header occurrence, unparsed.
    pub requires_dist: Vec<String>,
}

/// Scan an RFC-822 metadata document for `Requires-Dist` headers.
///
/// Header names are matched case-insensitively. The body after the first
/// blank line (the package description) is ignored.
pub fn parse_core_metadata(raw: &str) -> CoreMetadata {
    let mut requires_dist = Vec::new();
    let mut current: Option<(String, String)> = None;

    let mut flush = |header: Option<(String, String)>| {
        if let Some((name, value)) = header
            && name == "requires-dist"
        {
            requires_dist.push(value);
        }
    };

    for line in raw.lines() {
        let line = line.trim_end_matches('\r');

        if line.is_empty() {
            break;
        }

        if line.starts_with(' ') || line.starts_with('\t') {
            // Folded continuation of the previous header.
            if let Some((_, value)) = current.as_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }

        flush(current.take());
        current = line
            .split_once(':')
            .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()));
    }

    flush(current.take());
    CoreMetadata { requires_dist }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collects_requires_dist_headers() {
        let raw = "Metadata-Version: 2.1\n\
                   Name: foo\n\
                   Requires-Dist: bar>=1,<2; python_version<\"3.12\"\n\
                   Requires-Dist: baz[extra1]==3.0\n\
                   \n\
                   Long description follows.\n\
                   Requires-Dist: not-a-header-anymore\n";

        let metadata = parse_core_metadata(raw);
        assert_eq!(
            metadata.requires_dist,
            vec![
                "bar>=1,<2; python_version<\"3.12\"".to_string(),
                "baz[extra1]==3.0".to_string(),
            ]
        );
    }

    #[test]
    fn test_header_names_match_case_insensitively() {
        let metadata = parse_core_metadata("requires-DIST: bar\n");
        assert_eq!(metadata.requires_dist, vec!["bar".to_string()]);
    }

    #[test]
    fn test_folded_header_lines_are_joined() {
        let raw = "Requires-Dist: bar>=1,\n    <2\nName: foo\n";
        let metadata = parse_core_metadata(raw);
        assert_eq!(metadata.requires_dist, vec!["bar>=1, <2".to_string()]);
    }

    #[test]
    fn test_crlf_line_endings() {
        let raw = "Name: foo\r\nRequires-Dist: bar\r\n\r\nbody\r\n";
        let metadata = parse_core_metadata(raw);
        assert_eq!(metadata.requires_dist, vec!["bar".to_string()]);
    }

    #[test]
    fn test_no_requirements() {
        let metadata = parse_core_metadata("Name: foo\nVersion: 1.0\n");
        assert!(metadata.requires_dist.is_empty());
    }
}
