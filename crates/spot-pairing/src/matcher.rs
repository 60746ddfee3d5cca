//! Controller name matching over a discovery snapshot.
//!
//! Matching is pure: given the same candidate list it always
//! picks the same device, and it never talks to the adapter.

use regex::{Regex, RegexBuilder};
use spot_types::DeviceRecord;

/// Names advertised by the supported PlayStation controller generations.
pub const DEFAULT_CONTROLLER_NAMES: &[&str] = &["Wireless Controller", "DualSense"];

#[derive(Debug, Clone)]
enum Pattern {
    /// Lower-cased substring.
    Literal(String),
    Regex(Regex),
}

impl Pattern {
    fn matches(&self, name: &str) -> bool {
        match self {
            Pattern::Literal(needle) => name.to_lowercase().contains(needle.as_str()),
            Pattern::Regex(re) => re.is_match(name),
        }
    }
}

/// Accepts a device when its display name matches any of its patterns.
#[derive(Debug, Clone)]
pub struct DeviceMatcher {
    patterns: Vec<Pattern>,
}

impl DeviceMatcher {
    /// Build a matcher from case-insensitive regular expressions.
    ///
    /// # Errors
    ///
    /// Returns the first pattern that fails to compile.
    pub fn new<I, S>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                RegexBuilder::new(p.as_ref())
                    .case_insensitive(true)
                    .build()
                    .map(Pattern::Regex)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Build a matcher from plain names, matched as case-insensitive
    /// substrings.
    pub fn literal<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: names
                .into_iter()
                .map(|n| Pattern::Literal(n.as_ref().to_lowercase()))
                .collect(),
        }
    }

    /// Matcher for [`DEFAULT_CONTROLLER_NAMES`].
    pub fn controllers() -> Self {
        Self::literal(DEFAULT_CONTROLLER_NAMES)
    }

    pub fn matches(&self, display_name: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(display_name))
    }
}

impl Default for DeviceMatcher {
    fn default() -> Self {
        Self::controllers()
    }
}

/// Return the matching candidate with the lowest discovery order.
///
/// When several devices match, the earliest-discovered one wins. The adapter
/// gives no stronger signal (RSSI, pairing-mode flag) to break the tie.
pub fn match_first<'a>(candidates: &'a [DeviceRecord], matcher: &DeviceMatcher) -> Option<&'a DeviceRecord> {
    candidates
        .iter()
        .filter(|d| matcher.matches(&d.display_name))
        .min_by_key(|d| d.discovery_order)
}
