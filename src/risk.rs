use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Deserialize};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
}

impl RiskLevel {
    /// Tier for an unrounded 0-100 risk score. Boundary values go to the
    /// lower-severity tier: below 30 is low, 30 through 60 is moderate, above 60 is high.
    pub fn from_risk(risk: f64) -> Self {
        if risk < 30.0 {
            RiskLevel::Low
        } else if risk <= 60.0 {
            RiskLevel::Moderate
        } else {
            RiskLevel::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Moderate => "moderate",
            RiskLevel::High => "high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "moderate" => Ok(RiskLevel::Moderate),
            "high" => Ok(RiskLevel::High),
            other => Err(format!("unknown risk level '{}'", other)),
        }
    }
}

/// Presentation-ready tier shown to the user.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RiskTier {
    pub level: RiskLevel,
    pub label: String,
    pub needs_follow_up: bool,
    pub guidance: String,
}

/// Who the tier is being presented to; the wording differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    SelfAssessment,
    Clinician,
}

/// Maps a risk level straight to its tier. The level is authoritative; nothing is
/// re-derived here.
pub fn classify(level: RiskLevel, audience: Audience) -> RiskTier {
    let label = match level {
        RiskLevel::Low => "Low Risk",
        RiskLevel::Moderate => "Moderate Risk",
        RiskLevel::High => "High Risk",
    };

    let guidance = match (audience, level) {
        (Audience::SelfAssessment, RiskLevel::Low) => {
            "Your assessment indicates normal cognitive function. Continue maintaining healthy lifestyle habits and consider annual screenings."
        }
        (Audience::SelfAssessment, RiskLevel::Moderate) => {
            "Your results suggest some areas that may benefit from attention. We recommend consulting with a healthcare professional for a clinical evaluation."
        }
        (Audience::SelfAssessment, RiskLevel::High) => {
            "Your assessment indicates concerning patterns. We strongly recommend scheduling a clinical evaluation with a healthcare professional as soon as possible."
        }
        (Audience::Clinician, RiskLevel::Low) => {
            "No significant indicators of neurodegeneration. Routine follow-up as clinically indicated."
        }
        (Audience::Clinician, RiskLevel::Moderate) => {
            "Findings warrant clinical correlation with cognitive testing and specialist review."
        }
        (Audience::Clinician, RiskLevel::High) => {
            "Findings suggest significant pathology. Prompt specialist referral recommended."
        }
    };

    RiskTier {
        level,
        label: label.to_string(),
        needs_follow_up: level != RiskLevel::Low,
        guidance: guidance.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries_resolve_to_lower_severity() {
        assert_eq!(RiskLevel::from_risk(0.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_risk(29.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_risk(30.0), RiskLevel::Moderate);
        assert_eq!(RiskLevel::from_risk(60.0), RiskLevel::Moderate);
        assert_eq!(RiskLevel::from_risk(61.0), RiskLevel::High);
        assert_eq!(RiskLevel::from_risk(100.0), RiskLevel::High);
    }

    #[test]
    fn fractional_scores_use_the_same_boundaries() {
        assert_eq!(RiskLevel::from_risk(29.6), RiskLevel::Low);
        assert_eq!(RiskLevel::from_risk(29.999), RiskLevel::Low);
        assert_eq!(RiskLevel::from_risk(59.96), RiskLevel::Moderate);
        assert_eq!(RiskLevel::from_risk(60.4), RiskLevel::High);
    }

    #[test]
    fn parses_levels_case_insensitively() {
        assert_eq!("Moderate".parse::<RiskLevel>(), Ok(RiskLevel::Moderate));
        assert_eq!(" high ".parse::<RiskLevel>(), Ok(RiskLevel::High));
        assert!("severe".parse::<RiskLevel>().is_err());
    }

    #[test]
    fn classification_keeps_the_level() {
        for level in [RiskLevel::Low, RiskLevel::Moderate, RiskLevel::High] {
            let tier = classify(level, Audience::Clinician);
            assert_eq!(tier.level, level);
            assert_eq!(tier.needs_follow_up, level != RiskLevel::Low);
        }
        assert_eq!(classify(RiskLevel::Moderate, Audience::SelfAssessment).label, "Moderate Risk");
    }
}
