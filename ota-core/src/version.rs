/// Firmware version parsing and ordering
use core::fmt;

/// Version string reported by builds that embedded no version.
pub const UNKNOWN_VERSION: &str = "unknown";

/// Semantic version triple. Field order gives the major/minor/patch ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionTriple {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl VersionTriple {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    /// Lenient parse: splits on the first two dots, anything missing or
    /// malformed becomes 0. Never fails, so "abc" is 0.0.0.
    pub fn parse(text: &str) -> Self {
        let mut parts = text.trim().splitn(3, '.');
        let major = parse_component(parts.next());
        let minor = parse_component(parts.next());
        let patch = parse_component(parts.next());
        Self { major, minor, patch }
    }
}

/// Parses the leading digits of a segment, like `atoi`.
/// "3-beta" is 3, "x1" is 0.
fn parse_component(segment: Option<&str>) -> u32 {
    let Some(segment) = segment else {
        return 0;
    };
    let segment = segment.trim();
    let digits_end = segment
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(segment.len());
    segment[..digits_end].parse().unwrap_or(0)
}

impl fmt::Display for VersionTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// True when `remote` sorts strictly after `current`.
/// A `current` of "unknown" makes every remote version newer.
pub fn is_newer(remote: &str, current: &str) -> bool {
    if current.trim() == UNKNOWN_VERSION {
        return true;
    }
    VersionTriple::parse(remote) > VersionTriple::parse(current)
}

/// Strips one leading `v`/`V` from a release tag ("v1.4.0" -> "1.4.0").
pub fn strip_tag_prefix(tag: &str) -> &str {
    let tag = tag.trim();
    tag.strip_prefix('v')
        .or_else(|| tag.strip_prefix('V'))
        .unwrap_or(tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_parse_full_triple() {
        assert_eq!(VersionTriple::parse("1.2.3"), VersionTriple::new(1, 2, 3));
    }

    #[test]
    fn test_parse_missing_components_default_to_zero() {
        assert_eq!(VersionTriple::parse("2"), VersionTriple::new(2, 0, 0));
        assert_eq!(VersionTriple::parse("2.7"), VersionTriple::new(2, 7, 0));
        assert_eq!(VersionTriple::parse(""), VersionTriple::new(0, 0, 0));
    }

    #[test]
    fn test_parse_malformed_is_zero() {
        assert_eq!(VersionTriple::parse("abc"), VersionTriple::new(0, 0, 0));
        assert_eq!(VersionTriple::parse("1.x.3"), VersionTriple::new(1, 0, 3));
        assert_eq!(VersionTriple::parse("-1.2.3"), VersionTriple::new(0, 2, 3));
    }

    #[test]
    fn test_parse_keeps_everything_after_second_dot_in_patch() {
        // "1.2.3.4": patch segment is "3.4", leading digits give 3
        assert_eq!(VersionTriple::parse("1.2.3.4"), VersionTriple::new(1, 2, 3));
        assert_eq!(VersionTriple::parse("1.2.3-rc1"), VersionTriple::new(1, 2, 3));
    }

    #[test]
    fn test_is_newer_basic() {
        assert!(is_newer("1.2.4", "1.2.3"));
        assert!(is_newer("1.3.0", "1.2.9"));
        assert!(is_newer("2.0.0", "1.99.99"));
        assert!(!is_newer("1.2.3", "1.2.3"));
        assert!(!is_newer("1.2.2", "1.2.3"));
    }

    #[test]
    fn test_unknown_current_is_always_older() {
        assert!(is_newer("1.0.0", "unknown"));
        assert!(is_newer("0.0.0", "unknown"));
    }

    #[test]
    fn test_strip_tag_prefix() {
        assert_eq!(strip_tag_prefix("v1.4.0"), "1.4.0");
        assert_eq!(strip_tag_prefix("1.4.0"), "1.4.0");
        assert_eq!(strip_tag_prefix("vv2"), "v2");
    }

    #[test]
    fn test_display() {
        assert_eq!(VersionTriple::new(4, 56, 0).to_string(), "4.56.0");
    }

    #[quickcheck]
    fn prop_is_newer_irreflexive(a: u32, b: u32, c: u32) -> bool {
        let v = format!("{}.{}.{}", a, b, c);
        !is_newer(&v, &v)
    }

    #[quickcheck]
    fn prop_display_parse_roundtrip(a: u32, b: u32, c: u32) -> bool {
        let v = VersionTriple::new(a, b, c);
        VersionTriple::parse(&v.to_string()) == v
    }

    proptest! {
        #[test]
        fn is_newer_matches_lexicographic_order(
            a in 0u32..50, b in 0u32..50, c in 0u32..50,
            d in 0u32..50, e in 0u32..50, f in 0u32..50,
        ) {
            let remote = format!("{}.{}.{}", a, b, c);
            let current = format!("{}.{}.{}", d, e, f);
            prop_assert_eq!(is_newer(&remote, &current), (a, b, c) > (d, e, f));
        }

        #[test]
        fn is_newer_is_asymmetric(
            a in 0u32..20, b in 0u32..20, c in 0u32..20,
            d in 0u32..20, e in 0u32..20, f in 0u32..20,
        ) {
            let x = format!("{}.{}.{}", a, b, c);
            let y = format!("{}.{}.{}", d, e, f);
            prop_assert!(!(is_newer(&x, &y) && is_newer(&y, &x)));
        }
    }
}
