use super::{ClassificationRule, SensitivityLevel, default_rules, highest};
use serde::Serialize;
use std::borrow::Cow;

const CONTEXT_SEPARATOR: &str = "\n\n";

/// Outcome of classifying a piece of text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationResult {
    pub level: SensitivityLevel,
    /// Reason of every matched rule, in rule definition order
    pub reasons: Vec<String>,
    /// Raw pattern source of every matched rule
    pub patterns_matched: Vec<String>,
}

impl ClassificationResult {
    pub fn unclassified() -> Self {
        Self {
            level: SensitivityLevel::Unclassified,
            reasons: Vec::new(),
            patterns_matched: Vec::new(),
        }
    }
}

/// Evaluates every rule against the combined text; never short-circuits
#[derive(Debug, Clone)]
pub struct ClassificationEngine {
    rules: Cow<'static, [ClassificationRule]>,
}

impl Default for ClassificationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassificationEngine {
    /// Engine backed by the built-in rule catalog
    pub fn new() -> Self {
        Self {
            rules: Cow::Borrowed(default_rules()),
        }
    }

    pub fn with_rules(rules: Vec<ClassificationRule>) -> Self {
        Self {
            rules: Cow::Owned(rules),
        }
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    pub fn classify(&self, content: &str, context: Option<&str>) -> ClassificationResult {
        let combined: Cow<'_, str> = match context {
            Some(ctx) if !ctx.is_empty() => {
                Cow::Owned(format!("{}{}{}", content, CONTEXT_SEPARATOR, ctx))
            }
            _ => Cow::Borrowed(content),
        };

        let matched: Vec<&ClassificationRule> = self
            .rules
            .iter()
            .filter(|rule| rule.is_match(&combined))
            .collect();

        if matched.is_empty() {
            return ClassificationResult::unclassified();
        }

        ClassificationResult {
            level: highest(matched.iter().map(|r| r.level())),
            reasons: matched.iter().map(|r| r.reason().to_string()).collect(),
            patterns_matched: matched.iter().map(|r| r.source().to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(text: &str) -> ClassificationResult {
        ClassificationEngine::new().classify(text, None)
    }

    #[test]
    fn test_plain_text_is_unclassified() {
        let result = classify("Here is a normal proposal with no sensitive markings");
        assert_eq!(result.level, SensitivityLevel::Unclassified);
        assert!(result.reasons.is_empty());
        assert!(result.patterns_matched.is_empty());
    }

    #[test]
    fn test_markings_map_to_expected_levels() {
        let cases = [
            ("This document contains CUI", SensitivityLevel::Cui),
            ("Marked FOUO per policy", SensitivityLevel::Cui),
            ("This is SBU material", SensitivityLevel::Cui),
            ("Employee SSN: 123-45-6789", SensitivityLevel::Cui),
            ("CUI//SP-PROPIN pricing volume", SensitivityLevel::CuiRestricted),
            ("This is PROPRIETARY data", SensitivityLevel::CuiRestricted),
            ("Contains a trade secret", SensitivityLevel::CuiRestricted),
            ("Our wrap rate is 1.85", SensitivityLevel::CuiRestricted),
            ("See the BOE for details", SensitivityLevel::CuiRestricted),
            ("Map each LCAT to a rate", SensitivityLevel::CuiRestricted),
            ("Follow OPSEC guidance", SensitivityLevel::Opsec),
            ("Requires TS/SCI access", SensitivityLevel::Opsec),
        ];

        for (text, expected) in cases {
            assert_eq!(classify(text).level, expected, "text: {}", text);
        }
    }

    #[test]
    fn test_maximum_level_wins_and_all_reasons_kept() {
        let result = classify("CUI document discussing OPSEC procedures");
        assert_eq!(result.level, SensitivityLevel::Opsec);
        assert!(result.reasons.contains(&"Explicit CUI marking".to_string()));
        assert!(
            result
                .reasons
                .contains(&"Operations security marking".to_string())
        );
        assert_eq!(result.reasons.len(), result.patterns_matched.len());
    }

    #[test]
    fn test_context_is_scanned() {
        let engine = ClassificationEngine::new();
        let result = engine.classify("Summarize this", Some("Our fringe rate is 32%"));
        assert_eq!(result.level, SensitivityLevel::CuiRestricted);
    }

    #[test]
    fn test_custom_rules() {
        let rule =
            ClassificationRule::new(r"(?i)\bproject x\b", SensitivityLevel::Opsec, "Codename")
                .unwrap();
        let engine = ClassificationEngine::with_rules(vec![rule]);
        assert_eq!(
            engine.classify("status of Project X", None).level,
            SensitivityLevel::Opsec
        );
        assert_eq!(
            engine.classify("contains CUI", None).level,
            SensitivityLevel::Unclassified
        );
    }
}
