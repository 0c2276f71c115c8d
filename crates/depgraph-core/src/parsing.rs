//! PEP 440 version decomposition for the parsed columns of the `versions`
//! table.

use std::str::FromStr;

use pep440_rs::{PrereleaseKind, Version};

/// Largest integer a parsed version term may hold and still fit the storage
/// bigint. A handful of packages ship versions with terms in the quintillions
/// and beyond; those keep their raw `package_version` string and null parsed
/// fields rather than forcing a wider column type on everyone.
pub const RELEASE_TERM_MAX: u64 = i64::MAX as u64;

/// Structured decomposition of a version string.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedVersion {
    pub epoch: Option<i64>,
    pub release: Option<Vec<i64>>,
    pub pre: Option<(String, i64)>,
    pub post: Option<i64>,
    pub dev: Option<i64>,
    pub local: Option<String>,
    pub is_prerelease: bool,
    pub is_postrelease: bool,
    pub is_devrelease: bool,
}

/// Parse a version string, extracting the version's release information.
///
/// Returns `None` when the string is not a valid PEP 440 version. Each
/// integer field that exceeds [`RELEASE_TERM_MAX`] is clamped to `None`; one
/// oversized release term nulls the whole release array.
pub fn parse_version(version: &str) -> Option<ParsedVersion> {
    let parsed = Version::from_str(version).ok()?;

    let release = parsed
        .release()
        .iter()
        .map(|&term| i64::try_from(term).ok())
        .collect::<Option<Vec<i64>>>();

    let pre = parsed.pre().and_then(|pre| {
        let number = i64::try_from(pre.number).ok()?;
        let kind = match pre.kind {
            PrereleaseKind::Alpha => "a",
            PrereleaseKind::Beta => "b",
            PrereleaseKind::Rc => "rc",
        };
        Some((kind.to_string(), number))
    });

    Some(ParsedVersion {
        epoch: i64::try_from(parsed.epoch()).ok(),
        release,
        pre,
        post: parsed.post().and_then(|post| i64::try_from(post).ok()),
        dev: parsed.dev().and_then(|dev| i64::try_from(dev).ok()),
        local: local_segment(&parsed),
        is_prerelease: parsed.any_prerelease(),
        is_postrelease: parsed.is_post(),
        is_devrelease: parsed.is_dev(),
    })
}

/// The local segment of the normalized rendering, if any.
fn local_segment(version: &Version) -> Option<String> {
    let rendered = version.to_string();
    rendered
        .split_once('+')
        .map(|(_, local)| local.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_release() {
        let parsed = parse_version("1.2.3").unwrap();
        assert_eq!(parsed.epoch, Some(0));
        assert_eq!(parsed.release, Some(vec![1, 2, 3]));
        assert_eq!(parsed.pre, None);
        assert_eq!(parsed.post, None);
        assert_eq!(parsed.dev, None);
        assert_eq!(parsed.local, None);
        assert!(!parsed.is_prerelease);
        assert!(!parsed.is_postrelease);
        assert!(!parsed.is_devrelease);
    }

    #[test]
    fn test_parse_dev_release() {
        let parsed = parse_version("2.0.dev1").unwrap();
        assert_eq!(parsed.dev, Some(1));
        assert!(parsed.is_devrelease);
        assert!(parsed.is_prerelease);
        assert!(!parsed.is_postrelease);
    }

    #[test]
    fn test_parse_full_decomposition() {
        let parsed = parse_version("4!1.2rc3.post4.dev5+ubuntu.6").unwrap();
        assert_eq!(parsed.epoch, Some(4));
        assert_eq!(parsed.release, Some(vec![1, 2]));
        assert_eq!(parsed.pre, Some(("rc".to_string(), 3)));
        assert_eq!(parsed.post, Some(4));
        assert_eq!(parsed.dev, Some(5));
        assert_eq!(parsed.local.as_deref(), Some("ubuntu.6"));
        assert!(parsed.is_prerelease);
        assert!(parsed.is_postrelease);
    }

    #[test]
    fn test_parse_alpha_and_beta_markers() {
        assert_eq!(
            parse_version("1.0a2").unwrap().pre,
            Some(("a".to_string(), 2))
        );
        assert_eq!(
            parse_version("1.0b7").unwrap().pre,
            Some(("b".to_string(), 7))
        );
    }

    #[test]
    fn test_oversized_release_term_nulls_whole_array() {
        // 2^63 exactly, one past the bigint ceiling.
        let parsed = parse_version("1.9223372036854775808").unwrap();
        assert_eq!(parsed.release, None);
        assert_eq!(parsed.epoch, Some(0));
    }

    #[test]
    fn test_release_term_at_ceiling_survives() {
        let parsed = parse_version("1.9223372036854775807").unwrap();
        assert_eq!(parsed.release, Some(vec![1, i64::MAX]));
    }

    #[test]
    fn test_oversized_dev_term_clamps_only_dev() {
        let parsed = parse_version("1.0.dev9223372036854775808").unwrap();
        assert_eq!(parsed.dev, None);
        assert_eq!(parsed.release, Some(vec![1, 0]));
        assert!(parsed.is_devrelease);
    }

    #[test]
    fn test_unparsable_version_returns_none() {
        assert!(parse_version("not-a-version").is_none());
        assert!(parse_version("").is_none());
    }
}
