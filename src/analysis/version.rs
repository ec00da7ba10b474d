//! Version ordering and NuGet interval-notation ranges.
//!
//! The ordering here is deliberately loose: versions are split on `.` and `-`
//! and each segment is read as an integer (its leading digits, or `0`). This is
//! not semver precedence; `1.0.0-alpha` and `1.0.0-alpha.1` compare by their
//! numeric tokens only. Conflict thresholds depend on exactly this behavior.

use regex::Regex;
use std::cmp::Ordering;
use std::sync::LazyLock;

static RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([\[(])\s*([^,\s]*)\s*,\s*([^,\s\])]*)\s*([\])])$").expect("valid range regex")
});

static EXACT_SINGLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[\s*([^,\s\]]+)\s*\]$").expect("valid exact regex"));

static EXACT_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[\s*([^,\s]+)\s*,\s*([^,\s\]]+)\s*\]$").expect("valid exact pair regex")
});

static VERSION_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d+(?:\.\d+)*(?:-[0-9A-Za-z][0-9A-Za-z.-]*)?").expect("valid version regex")
});

/// Compares two version strings segment by segment.
///
/// Never fails: malformed segments count as `0` and the shorter version is
/// padded with zeros, so `"1.0"` equals `"1.0.0"`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left = segments(a);
    let right = segments(b);
    let len = left.len().max(right.len());

    for i in 0..len {
        let x = left.get(i).copied().unwrap_or(0);
        let y = right.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }

    Ordering::Equal
}

fn segments(version: &str) -> Vec<u64> {
    version
        .trim()
        .split(['.', '-'])
        .map(|segment| {
            let digits: String = segment.chars().take_while(char::is_ascii_digit).collect();
            digits.parse().unwrap_or(0)
        })
        .collect()
}

/// Returns `true` when `version` falls inside an interval range such as
/// `"(, 2.0.0)"` or `"[1.0.0,2.0.0]"`.
///
/// Anything that is not a bracketed `lower,upper` pair, including a bare
/// version, yields `false`.
pub fn in_range(version: &str, range: &str) -> bool {
    let Some(caps) = RANGE.captures(range.trim()) else {
        return false;
    };

    let lower_inclusive = &caps[1] == "[";
    let lower = &caps[2];
    let upper = &caps[3];
    let upper_inclusive = &caps[4] == "]";

    if !lower.is_empty() {
        match compare_versions(version, lower) {
            Ordering::Less => return false,
            Ordering::Equal if !lower_inclusive => return false,
            _ => {}
        }
    }

    if !upper.is_empty() {
        match compare_versions(version, upper) {
            Ordering::Greater => return false,
            Ordering::Equal if !upper_inclusive => return false,
            _ => {}
        }
    }

    true
}

/// The requirement a dependency edge places on a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRequirement {
    pub version: String,
    pub is_exact: bool,
}

/// Parses a dependency range as written in a lock file.
///
/// `[X]` and `[X, X]` pin an exact version. Any other form is read as a
/// minimum: the first version-looking token wins. Returns `None` when the
/// string contains no version at all (e.g. `"*"`).
pub fn parse_version_range(range: &str) -> Option<VersionRequirement> {
    let range = range.trim();

    if let Some(caps) = EXACT_SINGLE.captures(range) {
        return Some(VersionRequirement {
            version: caps[1].to_string(),
            is_exact: true,
        });
    }

    if let Some(caps) = EXACT_PAIR.captures(range) {
        if caps[1] == caps[2] {
            return Some(VersionRequirement {
                version: caps[1].to_string(),
                is_exact: true,
            });
        }
    }

    VERSION_TOKEN.find(range).map(|m| VersionRequirement {
        version: m.as_str().to_string(),
        is_exact: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_segment_comparison() {
        assert_eq!(compare_versions("1.10.0", "1.9.0"), Ordering::Greater);
        assert_eq!(compare_versions("1.9.0", "1.10.0"), Ordering::Less);
        assert_eq!(compare_versions("10.0.2", "9.0.10"), Ordering::Greater);
    }

    #[test]
    fn test_equal_and_padded() {
        assert_eq!(compare_versions("2.14.1", "2.14.1"), Ordering::Equal);
        assert_eq!(compare_versions("1.0", "1.0.0"), Ordering::Equal);
        assert_eq!(compare_versions("1.0.0.1", "1.0"), Ordering::Greater);
    }

    #[test]
    fn test_malformed_segments_degrade_to_zero() {
        assert_eq!(compare_versions("abc", "0.0"), Ordering::Equal);
        assert_eq!(compare_versions("", "0"), Ordering::Equal);
        assert_eq!(compare_versions("1.x.3", "1.0.3"), Ordering::Equal);
        // leading digits of a mixed segment still count
        assert_eq!(compare_versions("1.0.0-rc2", "1.0.0-rc1"), Ordering::Equal);
        assert_eq!(compare_versions("1.0.0-2beta", "1.0.0-1beta"), Ordering::Greater);
    }

    #[test]
    fn test_comparison_is_antisymmetric_and_transitive() {
        let versions = [
            "0.9", "1.0.0", "1.0.1", "1.2", "1.10.0", "2.0.0-preview.1", "2.0.0", "10.0.2",
        ];
        for a in versions {
            assert_eq!(compare_versions(a, a), Ordering::Equal);
            for b in versions {
                assert_eq!(compare_versions(a, b), compare_versions(b, a).reverse());
                for c in versions {
                    if compare_versions(a, b) == Ordering::Less
                        && compare_versions(b, c) == Ordering::Less
                    {
                        assert_eq!(compare_versions(a, c), Ordering::Less, "{a} < {b} < {c}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_in_range_exclusive_upper() {
        assert!(!in_range("2.0.0", "(, 2.0.0)"));
        assert!(in_range("1.9.9", "(, 2.0.0)"));
    }

    #[test]
    fn test_in_range_inclusive_bounds() {
        assert!(in_range("2.0.0", "[1.0.0,2.0.0]"));
        assert!(!in_range("2.0.0", "[1.0.0,2.0.0)"));
        assert!(in_range("1.0.0", "[1.0.0,2.0.0)"));
        assert!(!in_range("1.0.0", "(1.0.0,2.0.0)"));
        assert!(!in_range("0.9.0", "[1.0.0,2.0.0]"));
    }

    #[test]
    fn test_in_range_open_bounds() {
        assert!(in_range("99.0.0", "[1.0.0, )"));
        assert!(in_range("0.0.1", "(,)"));
        assert!(!in_range("0.9.0", "[1.0.0, )"));
    }

    #[test]
    fn test_in_range_rejects_malformed() {
        assert!(!in_range("1.0.0", "1.0.0"));
        assert!(!in_range("1.0.0", "[1.0.0]"));
        assert!(!in_range("1.0.0", ""));
        assert!(!in_range("1.0.0", "[1.0.0, 2.0.0"));
        assert!(!in_range("1.0.0", "{1.0.0, 2.0.0}"));
    }

    #[test]
    fn test_parse_exact_forms() {
        let expected = Some(VersionRequirement {
            version: "2.14.1".to_string(),
            is_exact: true,
        });
        assert_eq!(parse_version_range("[2.14.1]"), expected);
        assert_eq!(parse_version_range("[2.14.1, 2.14.1]"), expected);
        assert_eq!(parse_version_range("  [2.14.1]  "), expected);
    }

    #[test]
    fn test_parse_minimum_forms() {
        let bare = parse_version_range("2.14.1").unwrap();
        assert_eq!(bare.version, "2.14.1");
        assert!(!bare.is_exact);

        let open = parse_version_range("[2.14.1, )").unwrap();
        assert_eq!(open.version, "2.14.1");
        assert!(!open.is_exact);

        let span = parse_version_range("[1.0.0, 2.0.0]").unwrap();
        assert_eq!(span.version, "1.0.0");
        assert!(!span.is_exact);

        let upper_only = parse_version_range("(, 3.0.0)").unwrap();
        assert_eq!(upper_only.version, "3.0.0");
        assert!(!upper_only.is_exact);
    }

    #[test]
    fn test_parse_prerelease_and_garbage() {
        let pre = parse_version_range("[8.0.0-rc.2.23479.6]").unwrap();
        assert_eq!(pre.version, "8.0.0-rc.2.23479.6");
        assert!(pre.is_exact);

        assert_eq!(parse_version_range("*"), None);
        assert_eq!(parse_version_range(""), None);
    }
}
