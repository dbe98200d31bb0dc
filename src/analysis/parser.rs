use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use super::types::Verdict;
use crate::error::ParseError;
use crate::risk::RiskLevel;

static FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?[ \t]*\r?\n?(.*?)\r?\n?```").unwrap()
});

pub const FALLBACK_CONFIDENCE: f64 = 85.0;

const FALLBACK_FINDINGS: [&str; 4] = [
    "AI analysis completed but response format needs review",
    "Please consult with a qualified neurologist",
    "Manual review of scan recommended",
    "Further clinical correlation suggested",
];

const FALLBACK_RECOMMENDATIONS: [&str; 4] = [
    "Comprehensive neurological examination recommended",
    "Consider follow-up imaging in 6-12 months",
    "Correlate with cognitive assessment results",
    "Consult with specialist for detailed interpretation",
];

/// The safe verdict used whenever the model output can't be trusted.
pub fn fallback_verdict() -> Verdict {
    Verdict {
        risk_level: RiskLevel::Moderate,
        confidence: FALLBACK_CONFIDENCE,
        findings: FALLBACK_FINDINGS.iter().map(|s| s.to_string()).collect(),
        recommendations: FALLBACK_RECOMMENDATIONS.iter().map(|s| s.to_string()).collect(),
    }
}

/// Extraction strategies, tried in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStrategy {
    FencedBlock,
    BraceRegion,
    WholeBody,
}

impl ParseStrategy {
    pub const ORDER: [ParseStrategy; 3] = [
        ParseStrategy::FencedBlock,
        ParseStrategy::BraceRegion,
        ParseStrategy::WholeBody,
    ];

    fn candidate<'a>(&self, text: &'a str) -> Option<&'a str> {
        match self {
            ParseStrategy::FencedBlock => FENCED_BLOCK
                .captures(text)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str()),
            ParseStrategy::BraceRegion => first_brace_region(text),
            ParseStrategy::WholeBody => Some(text),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseAttempt {
    Parsed { strategy: ParseStrategy, verdict: Verdict },
    Fallback { verdict: Verdict, errors: Vec<(ParseStrategy, ParseError)> },
}

impl ParseAttempt {
    pub fn verdict(&self) -> &Verdict {
        match self {
            ParseAttempt::Parsed { verdict, .. } | ParseAttempt::Fallback { verdict, .. } => verdict,
        }
    }

    pub fn into_verdict(self) -> Verdict {
        match self {
            ParseAttempt::Parsed { verdict, .. } | ParseAttempt::Fallback { verdict, .. } => verdict,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, ParseAttempt::Fallback { .. })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVerdict {
    risk_level: String,
    confidence: f64,
    findings: Vec<String>,
    recommendations: Vec<String>,
}

impl TryFrom<RawVerdict> for Verdict {
    type Error = ParseError;

    fn try_from(raw: RawVerdict) -> Result<Self, Self::Error> {
        let risk_level = raw
            .risk_level
            .parse::<RiskLevel>()
            .map_err(ParseError::OutOfContract)?;

        let confidence = raw.confidence;
        if !confidence.is_finite() || !(0.0..=100.0).contains(&confidence) {
            return Err(ParseError::OutOfContract(format!(
                "confidence {} outside 0-100",
                confidence
            )));
        }

        Ok(Verdict {
            risk_level,
            confidence,
            findings: clean_items(raw.findings),
            recommendations: clean_items(raw.recommendations),
        })
    }
}

fn clean_items(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// First balanced `{ ... }` region, ignoring braces inside JSON strings.
fn first_brace_region(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn try_strategy(strategy: ParseStrategy, text: &str) -> Result<Verdict, ParseError> {
    let candidate = strategy.candidate(text).ok_or(ParseError::NoCandidate)?;
    let raw: RawVerdict = serde_json::from_str(candidate.trim())
        .map_err(|e| ParseError::Malformed(e.to_string()))?;
    Verdict::try_from(raw)
}

/// Reduces model output to a verdict. Never fails: when no strategy yields a
/// conforming value the fixed fallback is returned.
pub fn parse_verdict(text: &str) -> ParseAttempt {
    let mut errors = Vec::new();

    for strategy in ParseStrategy::ORDER {
        match try_strategy(strategy, text) {
            Ok(verdict) => {
                debug!("Parsed analysis verdict with {:?}", strategy);
                return ParseAttempt::Parsed { strategy, verdict };
            }
            Err(e) => errors.push((strategy, e)),
        }
    }

    warn!("⚠️ Failed to parse analysis response, using fallback verdict: {:?}", errors);
    ParseAttempt::Fallback { verdict: fallback_verdict(), errors }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_json_gives_exact_verdict() {
        let text = "Here is my assessment:\n```json\n{\"riskLevel\": \"high\", \"confidence\": 92, \"findings\": [\"Hippocampal atrophy\"], \"recommendations\": [\"Neurology referral\"]}\n```\nLet me know.";
        let attempt = parse_verdict(text);
        assert_eq!(
            attempt,
            ParseAttempt::Parsed {
                strategy: ParseStrategy::FencedBlock,
                verdict: Verdict {
                    risk_level: RiskLevel::High,
                    confidence: 92.0,
                    findings: vec!["Hippocampal atrophy".into()],
                    recommendations: vec!["Neurology referral".into()],
                },
            }
        );
    }

    #[test]
    fn unparseable_prose_gives_fixed_fallback() {
        let attempt = parse_verdict("The scan looks broadly unremarkable to me.");
        assert!(attempt.is_fallback());
        assert_eq!(attempt.into_verdict(), fallback_verdict());

        let fallback = fallback_verdict();
        assert_eq!(fallback.risk_level, RiskLevel::Moderate);
        assert_eq!(fallback.confidence, 85.0);
        assert_eq!(fallback.findings.len(), 4);
        assert_eq!(fallback.recommendations[1], "Consider follow-up imaging in 6-12 months");
    }

    #[test]
    fn brace_region_skips_braces_inside_strings() {
        let text = r#"Result: {"riskLevel": "low", "confidence": 90, "findings": ["no {focal} lesions"], "recommendations": []} trailing }"#;
        match parse_verdict(text) {
            ParseAttempt::Parsed { strategy, verdict } => {
                assert_eq!(strategy, ParseStrategy::BraceRegion);
                assert_eq!(verdict.findings, vec!["no {focal} lesions".to_string()]);
            }
            other => panic!("expected parsed verdict, got {:?}", other),
        }
    }

    #[test]
    fn bare_fence_and_mixed_case_level_are_accepted() {
        let text = "```\n{\"riskLevel\": \"Moderate\", \"confidence\": 88, \"findings\": [\" Mild atrophy \"], \"recommendations\": [\"Repeat MRI\"]}\n```";
        match parse_verdict(text) {
            ParseAttempt::Parsed { strategy, verdict } => {
                assert_eq!(strategy, ParseStrategy::FencedBlock);
                assert_eq!(verdict.risk_level, RiskLevel::Moderate);
                assert_eq!(verdict.confidence, 88.0);
                assert_eq!(verdict.findings, vec!["Mild atrophy".to_string()]);
            }
            other => panic!("expected parsed verdict, got {:?}", other),
        }
    }

    #[test]
    fn out_of_contract_values_fall_back() {
        for text in [
            r#"{"riskLevel": "severe", "confidence": 90, "findings": [], "recommendations": []}"#,
            r#"{"riskLevel": "low", "confidence": 140, "findings": [], "recommendations": []}"#,
            r#"{"riskLevel": "low", "confidence": null, "findings": [], "recommendations": []}"#,
            r#"{"riskLevel": "high", "confidence": "97%", "findings": ["Atrophy"], "recommendations": ["Refer"]}"#,
            r#"{"riskLevel": "high", "confidence": 97, "recommendations": ["Refer"]}"#,
            r#"{"riskLevel": "high", "confidence": 97, "findings": ["Atrophy"]}"#,
            r#"{"riskLevel": "high", "confidence": 97}"#,
            r#"{"confidence": 90, "findings": [], "recommendations": []}"#,
        ] {
            let attempt = parse_verdict(text);
            assert!(attempt.is_fallback(), "expected fallback for {}", text);
        }
    }

    #[test]
    fn fallback_records_every_strategy_error() {
        match parse_verdict("{ not json") {
            ParseAttempt::Fallback { errors, .. } => {
                let strategies: Vec<_> = errors.iter().map(|(s, _)| *s).collect();
                assert_eq!(strategies, ParseStrategy::ORDER.to_vec());
                assert_eq!(errors[0].1, ParseError::NoCandidate);
            }
            other => panic!("expected fallback, got {:?}", other),
        }
    }
}
