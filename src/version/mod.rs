//! Application version compatibility matching.
//!
//! Catalogs declare which application versions they serve with `<version>`
//! entries such as `2024.1.*`. A constraint is a dot-separated pattern:
//!
//! - every literal segment must equal the application's segment at the same position
//! - `*` matches any single segment
//! - a constraint shorter than the application version leaves the trailing
//!   segments unconstrained (`2024` matches `2024.1.3`)
//! - a constraint longer than the application version never matches
//!
//! Malformed constraints (empty, empty segments, whitespace) never match.
//!
//! # Examples
//!
//! ```rust,no_run
//! use pkgcat::version::matches;
//!
//! assert!(matches("2024.1.3", "2024.1.*"));
//! assert!(matches("2024.1.3", "2024"));
//! assert!(!matches("2023.9.0", "2024.*"));
//! ```

/// One segment of a [`VersionConstraint`].
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Wildcard,
    Literal(String),
}

/// A parsed wildcard version constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    segments: Vec<Segment>,
}

impl VersionConstraint {
    /// Parses a constraint, returning `None` for malformed input.
    #[must_use]
    pub fn parse(constraint: &str) -> Option<Self> {
        if constraint.is_empty() {
            return None;
        }

        let mut segments = Vec::new();
        for part in constraint.split('.') {
            if part.is_empty() || part.chars().any(char::is_whitespace) {
                return None;
            }
            segments.push(if part == "*" {
                Segment::Wildcard
            } else {
                Segment::Literal(part.to_string())
            });
        }

        Some(Self {
            segments,
        })
    }

    /// Returns true if `app_version` satisfies this constraint.
    #[must_use]
    pub fn matches(&self, app_version: &str) -> bool {
        let app: Vec<&str> = app_version.split('.').collect();
        if app.iter().any(|s| s.is_empty()) || self.segments.len() > app.len() {
            return false;
        }

        self.segments.iter().zip(app).all(|(segment, actual)| match segment {
            Segment::Wildcard => true,
            Segment::Literal(expected) => expected == actual,
        })
    }
}

/// Returns true if `app_version` satisfies the wildcard `constraint`.
#[must_use]
pub fn matches(app_version: &str, constraint: &str) -> bool {
    VersionConstraint::parse(constraint).is_some_and(|c| c.matches(app_version))
}

/// Returns true if `app_version` satisfies at least one of `constraints`.
pub fn matches_any<I, S>(app_version: &str, constraints: I) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    constraints.into_iter().any(|c| matches(app_version, c.as_ref()))
}
