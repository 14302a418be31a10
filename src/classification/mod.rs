//! Content classification
//!
//! Scans outgoing prompt text for sensitivity markers and assigns a
//! [`SensitivityLevel`]. Anything above `Unclassified` restricts routing to
//! compliance-authorized backends.

mod engine;
mod rules;

pub use engine::{ClassificationEngine, ClassificationResult};
pub use rules::{ClassificationRule, default_rules};

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Sensitivity tier, ordered from least to most restrictive
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum SensitivityLevel {
    #[default]
    #[serde(rename = "UNCLASSIFIED")]
    Unclassified,
    #[serde(rename = "CUI")]
    Cui,
    #[serde(rename = "CUI-RESTRICTED")]
    CuiRestricted,
    #[serde(rename = "OPSEC")]
    Opsec,
}

impl SensitivityLevel {
    pub const ALL: [SensitivityLevel; 4] = [
        Self::Unclassified,
        Self::Cui,
        Self::CuiRestricted,
        Self::Opsec,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unclassified => "UNCLASSIFIED",
            Self::Cui => "CUI",
            Self::CuiRestricted => "CUI-RESTRICTED",
            Self::Opsec => "OPSEC",
        }
    }

    /// Numeric priority used for conflict resolution (OPSEC = 3)
    pub fn priority(&self) -> u8 {
        match self {
            Self::Unclassified => 0,
            Self::Cui => 1,
            Self::CuiRestricted => 2,
            Self::Opsec => 3,
        }
    }

    /// True for every level that must stay on compliance-authorized backends
    pub fn is_sensitive(&self) -> bool {
        *self != Self::Unclassified
    }
}

impl std::fmt::Display for SensitivityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensitivityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "UNCLASSIFIED" => Ok(Self::Unclassified),
            "CUI" => Ok(Self::Cui),
            "CUI-RESTRICTED" | "CUI_RESTRICTED" => Ok(Self::CuiRestricted),
            "OPSEC" => Ok(Self::Opsec),
            other => Err(format!(
                "Unknown sensitivity level '{}'. Expected one of: UNCLASSIFIED, CUI, CUI-RESTRICTED, OPSEC",
                other
            )),
        }
    }
}

/// Most restrictive level among `levels`, or `Unclassified` if empty
pub fn highest<I>(levels: I) -> SensitivityLevel
where
    I: IntoIterator<Item = SensitivityLevel>,
{
    levels
        .into_iter()
        .max_by_key(SensitivityLevel::priority)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_totally_ordered() {
        assert!(SensitivityLevel::Unclassified < SensitivityLevel::Cui);
        assert!(SensitivityLevel::Cui < SensitivityLevel::CuiRestricted);
        assert!(SensitivityLevel::CuiRestricted < SensitivityLevel::Opsec);
    }

    #[test]
    fn test_highest() {
        use SensitivityLevel::*;
        assert_eq!(highest([Cui, CuiRestricted]), CuiRestricted);
        assert_eq!(highest([CuiRestricted, Cui]), CuiRestricted);
        assert_eq!(highest([Opsec]), Opsec);
        assert_eq!(highest(Vec::new()), Unclassified);
    }

    #[test]
    fn test_serde_uses_marking_names() {
        let json = serde_json::to_string(&SensitivityLevel::CuiRestricted).unwrap();
        assert_eq!(json, "\"CUI-RESTRICTED\"");
        let parsed: SensitivityLevel = serde_json::from_str("\"OPSEC\"").unwrap();
        assert_eq!(parsed, SensitivityLevel::Opsec);
    }

    #[test]
    fn test_from_str() {
        assert_eq!(
            "cui-restricted".parse::<SensitivityLevel>().unwrap(),
            SensitivityLevel::CuiRestricted
        );
        assert!("SECRET".parse::<SensitivityLevel>().is_err());
    }
}
