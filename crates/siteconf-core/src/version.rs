//! Semantic version labels
//!
//! Labels have the form `major.minor.patch[-tag]`. Parsing is lenient: a
//! missing or unparseable numeric segment reads as `0` and never fails; an
//! all-digit segment too large for `u64` reads as `u64::MAX`.
//! Comparison is numeric per field, so `1.9.0 < 1.10.0`.

use std::cmp::Ordering;
use std::convert::Infallible;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Requested size of a change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeClass {
    /// Breaking change: `major += 1`, `minor = patch = 0`
    Major,
    /// Feature change: `minor += 1`, `patch = 0`
    #[default]
    Minor,
    /// Fix: `patch += 1`
    Patch,
}

impl ChangeClass {
    /// Lowercase name
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Major => "major",
            Self::Minor => "minor",
            Self::Patch => "patch",
        }
    }
}

impl Display for ChangeClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeClass {
    type Err = UnknownChangeClass;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "major" => Ok(Self::Major),
            "minor" => Ok(Self::Minor),
            "patch" => Ok(Self::Patch),
            _ => Err(UnknownChangeClass(s.to_string())),
        }
    }
}

/// Change class name other than major/minor/patch
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown change class {0:?} (expected major, minor or patch)")]
pub struct UnknownChangeClass(pub String);

/// Bumping would overflow a numeric field
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot apply a {class} bump to {version}: field is at its maximum")]
pub struct VersionOverflow {
    pub version: String,
    pub class: ChangeClass,
}

/// Parsed version label
///
/// `tag` marks derived labels such as rollback copies
/// (`1.2.0-rollback.01J9...`). Ordering is numeric first; for equal numbers
/// the untagged label sorts first, then tags compare as strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub tag: Option<String>,
}

impl Version {
    /// Untagged version
    #[inline]
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            tag: None,
        }
    }

    /// Parse a label leniently
    ///
    /// # Examples
    /// ```
    /// # use siteconf_core::Version;
    /// assert_eq!(Version::parse("1.10.2"), Version::new(1, 10, 2));
    /// assert_eq!(Version::parse("2.x"), Version::new(2, 0, 0));
    /// assert_eq!(Version::parse("1.2.0-rollback.7").tag.as_deref(), Some("rollback.7"));
    /// ```
    #[must_use]
    pub fn parse(label: &str) -> Self {
        let label = label.trim();
        let (numbers, tag) = match label.split_once('-') {
            Some((numbers, tag)) if !tag.is_empty() => (numbers, Some(tag.to_string())),
            Some((numbers, _)) => (numbers, None),
            None => (label, None),
        };

        let mut fields = numbers.split('.').map(parse_field);

        Self {
            major: fields.next().unwrap_or(0),
            minor: fields.next().unwrap_or(0),
            patch: fields.next().unwrap_or(0),
            tag,
        }
    }

    /// Same numbers with a derivation tag
    #[inline]
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Next version for `class`; the tag is dropped
    ///
    /// # Errors
    ///
    /// [`VersionOverflow`] when the bumped field is already `u64::MAX`.
    pub fn bump(&self, class: ChangeClass) -> Result<Self, VersionOverflow> {
        let next = match class {
            ChangeClass::Major => self.major.checked_add(1).map(|major| Self::new(major, 0, 0)),
            ChangeClass::Minor => self
                .minor
                .checked_add(1)
                .map(|minor| Self::new(self.major, minor, 0)),
            ChangeClass::Patch => self
                .patch
                .checked_add(1)
                .map(|patch| Self::new(self.major, self.minor, patch)),
        };
        next.ok_or_else(|| VersionOverflow {
            version: self.to_string(),
            class,
        })
    }

    /// `(major, minor, patch)`
    #[inline]
    #[must_use]
    pub fn numbers(&self) -> (u64, u64, u64) {
        (self.major, self.minor, self.patch)
    }
}

fn parse_field(field: &str) -> u64 {
    let field = field.trim();
    match field.parse::<u64>() {
        Ok(value) => value,
        Err(_) if !field.is_empty() && field.bytes().all(|b| b.is_ascii_digit()) => u64::MAX,
        Err(_) => 0,
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(tag) = &self.tag {
            write!(f, "-{tag}")?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.numbers()
            .cmp(&other.numbers())
            .then_with(|| self.tag.cmp(&other.tag))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compare two labels numerically
#[must_use]
pub fn compare(v1: &str, v2: &str) -> Ordering {
    Version::parse(v1).cmp(&Version::parse(v2))
}

/// [`compare`] as `-1 | 0 | 1`
#[inline]
#[must_use]
pub fn compare_sign(v1: &str, v2: &str) -> i8 {
    compare(v1, v2) as i8
}

/// Bump a label by `class`
///
/// # Examples
/// ```
/// # use siteconf_core::{increment, ChangeClass};
/// assert_eq!(increment("1.2.3", ChangeClass::Minor).unwrap(), "1.3.0");
/// ```
///
/// # Errors
///
/// [`VersionOverflow`] when the bumped field cannot grow.
pub fn increment(label: &str, class: ChangeClass) -> Result<String, VersionOverflow> {
    Version::parse(label).bump(class).map(|next| next.to_string())
}

/// Label that follows the highest of `labels`, or `Ok(None)` when empty
///
/// # Errors
///
/// [`VersionOverflow`] when the highest label cannot be bumped.
pub fn next_after<'a>(
    labels: impl IntoIterator<Item = &'a str>,
    class: ChangeClass,
) -> Result<Option<Version>, VersionOverflow> {
    labels
        .into_iter()
        .map(Version::parse)
        .max()
        .map(|latest| latest.bump(class))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_label() {
        assert_eq!(Version::parse("1.2.3"), Version::new(1, 2, 3));
    }

    #[test]
    fn parse_is_lenient() {
        assert_eq!(Version::parse(""), Version::new(0, 0, 0));
        assert_eq!(Version::parse("3"), Version::new(3, 0, 0));
        assert_eq!(Version::parse("1.b.7"), Version::new(1, 0, 7));
        assert_eq!(Version::parse("v1.2.3"), Version::new(0, 2, 3));
        assert_eq!(Version::parse("1.2.3.4"), Version::new(1, 2, 3));
        assert_eq!(Version::parse(" 4.5.6 "), Version::new(4, 5, 6));
    }

    #[test]
    fn parse_keeps_tag() {
        let version = Version::parse("1.2.0-rollback.abc");
        assert_eq!(version.numbers(), (1, 2, 0));
        assert_eq!(version.tag.as_deref(), Some("rollback.abc"));
        assert_eq!(version.to_string(), "1.2.0-rollback.abc");
    }

    #[test]
    fn display_round_trips() {
        assert_eq!(Version::new(10, 0, 1).to_string(), "10.0.1");
        let parsed: Version = "2.3.4".parse().unwrap();
        assert_eq!(parsed.to_string(), "2.3.4");
    }

    #[test]
    fn bump_resets_lower_fields() {
        let v = Version::new(1, 2, 3);
        assert_eq!(v.bump(ChangeClass::Major).unwrap(), Version::new(2, 0, 0));
        assert_eq!(v.bump(ChangeClass::Minor).unwrap(), Version::new(1, 3, 0));
        assert_eq!(v.bump(ChangeClass::Patch).unwrap(), Version::new(1, 2, 4));
    }

    #[test]
    fn bump_drops_tag() {
        let v = Version::parse("1.2.0-rollback.x");
        assert_eq!(v.bump(ChangeClass::Patch).unwrap().to_string(), "1.2.1");
    }

    #[test]
    fn increment_minor() {
        assert_eq!(increment("1.2.3", ChangeClass::Minor).unwrap(), "1.3.0");
    }

    #[test]
    fn oversized_field_saturates_when_parsed() {
        let huge = "99999999999999999999.0.0";
        assert_eq!(Version::parse(huge).major, u64::MAX);
        assert_eq!(compare(huge, "1.0.0"), Ordering::Greater);
        assert_eq!(Version::parse("1.99999999999999999999").minor, u64::MAX);
    }

    #[test]
    fn bump_at_field_maximum_is_an_error() {
        let max = u64::MAX;
        let err = increment(&format!("{max}.5.0"), ChangeClass::Major).unwrap_err();
        assert_eq!(err.class, ChangeClass::Major);
        assert_eq!(err.version, format!("{max}.5.0"));

        assert!(increment(&format!("1.{max}.3"), ChangeClass::Minor).is_err());
        assert!(increment(&format!("1.2.{max}"), ChangeClass::Patch).is_err());
        assert_eq!(
            increment(&format!("1.{max}.3"), ChangeClass::Major).unwrap(),
            "2.0.0"
        );
    }

    #[test]
    fn compare_is_numeric() {
        assert_eq!(compare("1.9.0", "1.10.0"), Ordering::Less);
        assert_eq!(compare_sign("1.9.0", "1.10.0"), -1);
        assert_eq!(compare_sign("2.0.0", "1.99.99"), 1);
        assert_eq!(compare_sign("1.0", "1.0.0"), 0);
    }

    #[test]
    fn tagged_sorts_after_untagged() {
        assert_eq!(compare("1.2.0-rollback.a", "1.2.0"), Ordering::Greater);
        assert_eq!(compare("1.2.0-rollback.a", "1.2.1"), Ordering::Less);
    }

    #[test]
    fn next_after_uses_highest_label() {
        let labels = ["1.0.0", "1.10.0", "1.9.0", "1.2.0-rollback.z"];
        let next = next_after(labels, ChangeClass::Minor).unwrap().unwrap();
        assert_eq!(next.to_string(), "1.11.0");
        assert!(next_after(std::iter::empty(), ChangeClass::Minor).unwrap().is_none());
    }

    #[test]
    fn change_class_parses_case_insensitively() {
        assert_eq!("MAJOR".parse::<ChangeClass>().unwrap(), ChangeClass::Major);
        assert_eq!(" patch ".parse::<ChangeClass>().unwrap(), ChangeClass::Patch);
        assert!("huge".parse::<ChangeClass>().is_err());
    }

    #[test]
    fn change_class_serde_is_lowercase() {
        assert_eq!(serde_json::to_string(&ChangeClass::Minor).unwrap(), r#""minor""#);
    }
}
