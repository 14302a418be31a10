//! Built-in classification rule catalog

use super::SensitivityLevel;
use regex::Regex;
use std::sync::LazyLock;

/// A pattern paired with the level it implies and an audit-friendly reason
#[derive(Debug, Clone)]
pub struct ClassificationRule {
    pattern: Regex,
    level: SensitivityLevel,
    reason: String,
}

impl ClassificationRule {
    /// Compile a rule from a regex source
    pub fn new(
        pattern: &str,
        level: SensitivityLevel,
        reason: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            level,
            reason: reason.into(),
        })
    }

    pub fn level(&self) -> SensitivityLevel {
        self.level
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Raw pattern source, recorded for audit replay
    pub fn source(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

// (pattern, level, reason). `\bBOE\b` is deliberately case-sensitive: the
// lowercase word "boe" and mixed-case names would otherwise trip it.
const CATALOG: &[(&str, SensitivityLevel, &str)] = &[
    (
        r"(?i)\bCUI\b",
        SensitivityLevel::Cui,
        "Explicit CUI marking",
    ),
    (
        r"(?i)\bcontrolled unclassified information\b",
        SensitivityLevel::Cui,
        "Controlled unclassified information reference",
    ),
    (
        r"(?i)\b(for official use only|FOUO)\b",
        SensitivityLevel::Cui,
        "For Official Use Only marking",
    ),
    (
        r"(?i)\b(sensitive but unclassified|SBU)\b",
        SensitivityLevel::Cui,
        "Sensitive But Unclassified marking",
    ),
    (
        r"\b\d{3}-\d{2}-\d{4}\b",
        SensitivityLevel::Cui,
        "Possible SSN detected",
    ),
    (
        r"(?i)CUI//SP-PROPIN",
        SensitivityLevel::CuiRestricted,
        "CUI proprietary information marking",
    ),
    (
        r"(?i)\bproprietary\b",
        SensitivityLevel::CuiRestricted,
        "Proprietary information reference",
    ),
    (
        r"(?i)\btrade secrets?\b",
        SensitivityLevel::CuiRestricted,
        "Trade secret reference",
    ),
    (
        r"(?i)\bwrap rates?\b",
        SensitivityLevel::CuiRestricted,
        "Wrap rate pricing data",
    ),
    (
        r"(?i)\b(overhead|fringe|indirect|g&a) rates?\b",
        SensitivityLevel::CuiRestricted,
        "Indirect rate pricing data",
    ),
    (
        r"(?i)\bbasis of estimate\b",
        SensitivityLevel::CuiRestricted,
        "Basis of estimate reference",
    ),
    (
        r"\bBOE\b",
        SensitivityLevel::CuiRestricted,
        "Basis of estimate (BOE) reference",
    ),
    (
        r"(?i)\bLCATs?\b|\blabor categor(y|ies)\b",
        SensitivityLevel::CuiRestricted,
        "Labor category pricing data",
    ),
    (
        r"(?i)\bOPSEC\b",
        SensitivityLevel::Opsec,
        "Operations security marking",
    ),
    (
        r"(?i)\b(TS/SCI|top secret|secret clearance)\b",
        SensitivityLevel::Opsec,
        "Clearance-level reference",
    ),
    (
        r"(?i)\bsecurity clearance\b",
        SensitivityLevel::Opsec,
        "Security clearance reference",
    ),
];

static DEFAULT_RULES: LazyLock<Vec<ClassificationRule>> = LazyLock::new(|| {
    CATALOG
        .iter()
        .filter_map(|(pattern, level, reason)| {
            match ClassificationRule::new(pattern, *level, *reason) {
                Ok(rule) => Some(rule),
                Err(e) => {
                    tracing::error!(pattern = %pattern, error = %e, "Skipping invalid classification rule");
                    None
                }
            }
        })
        .collect()
});

/// The built-in rule catalog, in definition order
pub fn default_rules() -> &'static [ClassificationRule] {
    &DEFAULT_RULES
}
