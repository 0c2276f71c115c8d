//! Package-name canonicalization per PEP 503.

/// Reduce a package name to its PEP 503 canonical form: lowercased, with
/// every run of `-`, `_`, and `.` separators folded into a single hyphen.
/// Leading and trailing separators are dropped entirely.
///
/// # Examples
///
/// ```
/// # use depgraph_core::canonicalize_name;
/// assert_eq!(canonicalize_name("Typing_Extensions"), "typing-extensions");
/// assert_eq!(canonicalize_name("ruamel.yaml"), "ruamel-yaml");
/// assert_eq!(canonicalize_name("Foo..--__Bar"), "foo-bar");
/// ```
pub fn canonicalize_name(name: &str) -> String {
    let mut canonical = String::with_capacity(name.len());
    for ch in name.chars() {
        match ch {
            '-' | '_' | '.' => {
                if !canonical.is_empty() && !canonical.ends_with('-') {
                    canonical.push('-');
                }
            }
            _ => canonical.extend(ch.to_lowercase()),
        }
    }
    if canonical.ends_with('-') {
        canonical.pop();
    }
    canonical
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_mixed_case() {
        assert_eq!(canonicalize_name("Foo"), "foo");
        assert_eq!(canonicalize_name("Django"), "django");
    }

    #[test]
    fn test_canonicalize_separator_runs() {
        assert_eq!(canonicalize_name("a.-_b"), "a-b");
        assert_eq!(canonicalize_name("zope.interface"), "zope-interface");
        assert_eq!(canonicalize_name("my__package"), "my-package");
    }

    #[test]
    fn test_canonicalize_edge_separators() {
        assert_eq!(canonicalize_name("-foo-"), "foo");
        assert_eq!(canonicalize_name("..bar"), "bar");
        assert_eq!(canonicalize_name("---"), "");
    }

    #[test]
    fn test_canonicalize_idempotent() {
        let once = canonicalize_name("Back_Ports.ssl-Match_hostname");
        assert_eq!(canonicalize_name(&once), once);
    }
}
