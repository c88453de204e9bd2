/*!
 * Regex rules turning raw monitor content into a safe/unsafe verdict.
 */
use regex::{Regex, RegexBuilder};
use tracing::warn;

/// Pattern used when a rule has no pattern or an invalid one
pub const DEFAULT_SAFE_PATTERN: &str = "true|1";

/// A case-insensitive regular expression, optionally negated.
///
/// Rules never fail to build: an empty or invalid pattern falls back to
/// [`DEFAULT_SAFE_PATTERN`].
#[derive(Debug, Clone)]
pub struct SafetyMatchingRule {
    pattern: String,
    invert: bool,
    regex: Regex,
}

impl SafetyMatchingRule {
    /// Compile a rule
    pub fn new(pattern: impl Into<String>, invert: bool) -> Self {
        let pattern = pattern.into();
        let regex = match compile(&pattern) {
            Some(regex) => regex,
            None => {
                if !pattern.is_empty() {
                    warn!(pattern = %pattern, "Invalid safety pattern, using default");
                }
                default_regex()
            }
        };

        Self { pattern, invert, regex }
    }

    /// The pattern as configured
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Whether the match result is negated
    pub fn invert(&self) -> bool {
        self.invert
    }

    /// Decide whether `content` means safe
    pub fn evaluate(&self, content: &str) -> bool {
        self.regex.is_match(content) != self.invert
    }
}

impl Default for SafetyMatchingRule {
    fn default() -> Self {
        Self::new("", false)
    }
}

fn compile(pattern: &str) -> Option<Regex> {
    if pattern.is_empty() {
        return None;
    }
    RegexBuilder::new(pattern).case_insensitive(true).build().ok()
}

fn default_regex() -> Regex {
    // The default pattern is a literal alternation and always compiles.
    RegexBuilder::new(DEFAULT_SAFE_PATTERN)
        .case_insensitive(true)
        .build()
        .unwrap_or_else(|_| unreachable!("default safety pattern must compile"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rule_matches_true_and_one() {
        let rule = SafetyMatchingRule::default();
        assert!(rule.evaluate("TRUE"));
        assert!(rule.evaluate("status: 1"));
        assert!(!rule.evaluate("false"));
        assert!(!rule.evaluate(""));
    }

    #[test]
    fn test_pattern_is_case_insensitive() {
        let rule = SafetyMatchingRule::new("^open$", false);
        assert!(rule.evaluate("OPEN"));
        assert!(!rule.evaluate("closed"));
    }

    #[test]
    fn test_invert_negates_match() {
        let rule = SafetyMatchingRule::new("rain", true);
        assert!(!rule.evaluate("Rain detected"));
        assert!(rule.evaluate("dry"));
        assert!(rule.invert());
    }

    #[test]
    fn test_invalid_pattern_falls_back() {
        let rule = SafetyMatchingRule::new("(unclosed", false);
        assert_eq!(rule.pattern(), "(unclosed");
        assert!(rule.evaluate("true"));
        assert!(!rule.evaluate("(unclosed"));
    }

    #[test]
    fn test_invert_applies_to_fallback() {
        let rule = SafetyMatchingRule::new("", true);
        assert!(!rule.evaluate("1"));
        assert!(rule.evaluate("0"));
    }
}
