//! Entity tags: short random identifiers and partial matching against them.

use regex::Regex;
use uuid::Uuid;

use crate::Result;

/// Width of a generated tag in hex characters.
pub const TAG_WIDTH: usize = 8;

/// Generate a new random tag.
///
/// Format: 8 lowercase hex characters taken from a v4 UUID.
/// Uniqueness is not guaranteed; registries reject collisions on insert.
pub fn generate() -> String {
    let bits = Uuid::new_v4().as_u128() as u32;
    format!("{:0width$x}", bits, width = TAG_WIDTH)
}

/// A set of partial tag patterns.
///
/// Each pattern is an independent regular expression searched within the
/// full tag string; a tag matches the set when any pattern matches.
#[derive(Debug, Clone)]
pub struct TagMatcher {
    patterns: Vec<Regex>,
}

impl TagMatcher {
    /// Compile the given patterns.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p.as_ref()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Matcher for a single pattern.
    pub fn single(pattern: &str) -> Result<Self> {
        Self::new(&[pattern])
    }

    /// Check whether `tag` matches at least one pattern.
    pub fn matches(&self, tag: &str) -> bool {
        self.patterns.iter().any(|rx| rx.is_match(tag))
    }

    /// True when no patterns were given.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_format() {
        let tag = generate();
        assert_eq!(tag.len(), TAG_WIDTH);
        assert!(tag.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_generate_differs() {
        let tags: std::collections::HashSet<_> = (0..32).map(|_| generate()).collect();
        assert!(tags.len() > 1);
    }

    #[test]
    fn test_matcher_partial() {
        let matcher = TagMatcher::single("b3c").unwrap();
        assert!(matcher.matches("a1b3c4d5"));
        assert!(!matcher.matches("a1b2c3d4"));
    }

    #[test]
    fn test_matcher_any_pattern() {
        let matcher = TagMatcher::new(&["^aa", "ff$"]).unwrap();
        assert!(matcher.matches("aa000000"));
        assert!(matcher.matches("000000ff"));
        assert!(!matcher.matches("0aa00f00"));
    }

    #[test]
    fn test_matcher_invalid_pattern() {
        let err = TagMatcher::single("(").unwrap_err();
        assert!(matches!(err, crate::Error::Regex(_)));
    }

    #[test]
    fn test_matcher_empty() {
        let matcher = TagMatcher::new::<&str>(&[]).unwrap();
        assert!(matcher.is_empty());
        assert!(!matcher.matches("01234567"));
    }
}
