//! Pattern-based PHI screening for transcribed text.
//!
//! A fixed registry of `(category, pattern, confidence)` rules is scanned
//! against each transcript; clinical vocabulary nearby boosts the
//! context-sensitive categories (a phone number next to "patient" is more
//! suspicious than one in a syllabus). Findings never carry the matched
//! substring, only category, offset, length and confidence, so the screener
//! cannot itself leak the content it guards against.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::warn;

/// Minimum confidence at which a scan rejects the content.
pub const REJECTION_THRESHOLD: f32 = 0.7;

/// Additive confidence boost applied to context-sensitive categories when
/// clinical vocabulary is present, capped at 1.0.
const CONTEXT_BOOST: f32 = 0.2;

/// Content classes the screener recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhiCategory {
    SocialSecurityNumber,
    MedicalRecordNumber,
    PhoneNumber,
    EmailAddress,
    DateOfBirth,
    StreetAddress,
    CreditCard,
}

impl PhiCategory {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PhiCategory::SocialSecurityNumber => "social_security_number",
            PhiCategory::MedicalRecordNumber => "medical_record_number",
            PhiCategory::PhoneNumber => "phone_number",
            PhiCategory::EmailAddress => "email_address",
            PhiCategory::DateOfBirth => "date_of_birth",
            PhiCategory::StreetAddress => "street_address",
            PhiCategory::CreditCard => "credit_card",
        }
    }
}

/// One matched rule. Carries the span, never the text.
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub category: PhiCategory,
    pub offset: usize,
    pub length: usize,
    pub confidence: f32,
}

/// Aggregate scan outcome.
///
/// Invariant: `flagged == (confidence_score >= REJECTION_THRESHOLD)`.
#[derive(Debug, Clone, Serialize)]
pub struct ScreeningResult {
    pub flagged: bool,
    pub confidence_score: f32,
    pub findings: Vec<Finding>,
    pub recommendation: String,
}

struct Rule {
    category: PhiCategory,
    pattern: Regex,
    confidence: f32,
    context_sensitive: bool,
}

impl Rule {
    fn new(category: PhiCategory, pattern: &str, confidence: f32, context_sensitive: bool) -> Self {
        Self {
            category,
            pattern: Regex::new(pattern).expect("screening rule pattern compiles"),
            confidence,
            context_sensitive,
        }
    }
}

static RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    use PhiCategory::{
        CreditCard, DateOfBirth, EmailAddress, MedicalRecordNumber, PhoneNumber,
        SocialSecurityNumber, StreetAddress,
    };

    vec![
        Rule::new(
            SocialSecurityNumber,
            r"(?i)\bSSN[:\s]+\d{3}[-\s]?\d{2}[-\s]?\d{4}\b",
            0.95,
            false,
        ),
        Rule::new(
            SocialSecurityNumber,
            r"(?i)\bsocial\s+security\s+(?:number\s*)?[:\s]+\d{3}[-\s]?\d{2}[-\s]?\d{4}\b",
            0.95,
            false,
        ),
        Rule::new(
            SocialSecurityNumber,
            r"\b\d{3}[-\s]?\d{2}[-\s]?\d{4}\b",
            0.9,
            false,
        ),
        Rule::new(
            MedicalRecordNumber,
            r"(?i)\bMRN[:\s#]+[A-Z0-9]{6,12}\b",
            0.9,
            false,
        ),
        Rule::new(
            MedicalRecordNumber,
            r"(?i)\bmedical\s+record\s+number[:\s#]+[A-Z0-9]{6,12}\b",
            0.9,
            false,
        ),
        Rule::new(
            MedicalRecordNumber,
            r"(?i)\bpatient\s+(?:ID|number)[:\s#]+[A-Z0-9]{6,12}\b",
            0.85,
            false,
        ),
        Rule::new(
            PhoneNumber,
            r"\b(?:\+?1[-\s]?)?\(?\d{3}\)?[-\s]?\d{3}[-\s]?\d{4}\b",
            0.6,
            true,
        ),
        Rule::new(
            PhoneNumber,
            r"(?i)\bcall\s+(?:me|him|her|them)\s+at\s+\(?\d{3}\)?[-\s]?\d{3}[-\s]?\d{4}\b",
            0.85,
            true,
        ),
        Rule::new(
            EmailAddress,
            r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
            0.5,
            true,
        ),
        Rule::new(
            DateOfBirth,
            r"(?i)\bborn\s+(?:on\s+)?\d{1,2}[-/]\d{1,2}[-/]\d{2,4}\b",
            0.9,
            false,
        ),
        Rule::new(
            DateOfBirth,
            r"(?i)\bDOB[:\s]+\d{1,2}[-/]\d{1,2}[-/]\d{2,4}\b",
            0.95,
            false,
        ),
        Rule::new(
            DateOfBirth,
            r"(?i)\bdate\s+of\s+birth[:\s]+\d{1,2}[-/]\d{1,2}[-/]\d{2,4}\b",
            0.95,
            false,
        ),
        Rule::new(
            DateOfBirth,
            r"(?i)\bbirthday[:\s]+\d{1,2}[-/]\d{1,2}[-/]\d{2,4}\b",
            0.8,
            false,
        ),
        Rule::new(
            StreetAddress,
            r"(?i)\b\d+\s+[a-z]+\s+(?:Street|St|Avenue|Ave|Road|Rd|Boulevard|Blvd|Drive|Dr|Lane|Ln)\b",
            0.7,
            false,
        ),
        Rule::new(CreditCard, r"\b(?:\d{4}[-\s]?){3}\d{4}\b", 0.8, false),
    ]
});

/// Vocabulary that marks a transcript as clinical in nature.
const CLINICAL_CONTEXT_KEYWORDS: &[&str] = &[
    "patient",
    "diagnosis",
    "treatment",
    "prescription",
    "medication",
    "hospital",
    "clinic",
    "doctor",
    "physician",
    "nurse",
    "medical history",
    "condition",
    "symptoms",
    "procedure",
    "admitted",
    "discharged",
    "surgery",
    "operation",
];

/// Scans produced text against the PHI rule registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhiScreener;

impl PhiScreener {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    #[must_use]
    pub fn scan(&self, text: &str) -> ScreeningResult {
        let lower = text.to_lowercase();
        let clinical_context = CLINICAL_CONTEXT_KEYWORDS
            .iter()
            .any(|keyword| lower.contains(keyword));

        let mut findings = Vec::new();
        for rule in RULES.iter() {
            for matched in rule.pattern.find_iter(text) {
                let confidence = if clinical_context && rule.context_sensitive {
                    (rule.confidence + CONTEXT_BOOST).min(1.0)
                } else {
                    rule.confidence
                };
                findings.push(Finding {
                    category: rule.category,
                    offset: matched.start(),
                    length: matched.len(),
                    confidence,
                });
            }
        }

        let confidence_score = findings
            .iter()
            .map(|finding| finding.confidence)
            .fold(0.0_f32, f32::max);
        let flagged = confidence_score >= REJECTION_THRESHOLD;
        let recommendation = recommendation(flagged, &findings, confidence_score);

        if flagged {
            // Audit trail records what kind of content tripped the gate, never
            // the content itself.
            let categories: Vec<&str> = findings
                .iter()
                .map(|finding| finding.category.as_str())
                .collect();
            warn!(
                matches = findings.len(),
                max_confidence = confidence_score,
                text_length = text.len(),
                categories = ?categories,
                "phi screening rejected content"
            );
        }

        ScreeningResult {
            flagged,
            confidence_score,
            findings,
            recommendation,
        }
    }
}

fn recommendation(flagged: bool, findings: &[Finding], confidence: f32) -> String {
    if !flagged {
        if findings.is_empty() {
            return "No PHI detected. Safe to process.".to_string();
        }
        return format!(
            "Low-confidence PHI indicators detected ({:.0}%). Proceeding with caution.",
            confidence * 100.0
        );
    }

    let mut categories: Vec<&str> = findings
        .iter()
        .filter(|finding| finding.confidence >= REJECTION_THRESHOLD)
        .map(|finding| finding.category.as_str())
        .collect();
    categories.sort_unstable();
    categories.dedup();

    format!(
        "Rejected: potential PHI detected ({:.0}% confidence; categories: {}). \
         This service is for educational recordings only; do not upload live \
         patient encounters or real patient data. If this is a false \
         positive, contact support.",
        confidence * 100.0,
        categories.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn ssn_is_flagged_above_threshold() {
        let result = PhiScreener::new().scan("The SSN: 123-45-6789 was read aloud.");
        assert!(result.flagged);
        assert!(result.confidence_score >= REJECTION_THRESHOLD);
        assert!(
            result
                .findings
                .iter()
                .any(|f| f.category == PhiCategory::SocialSecurityNumber)
        );
    }

    #[test]
    fn clean_prose_is_not_flagged() {
        let result = PhiScreener::new().scan("The heart has four chambers.");
        assert!(!result.flagged);
        assert_eq!(result.confidence_score, 0.0);
        assert!(result.findings.is_empty());
        assert_eq!(result.recommendation, "No PHI detected. Safe to process.");
    }

    #[test]
    fn phone_number_alone_stays_below_threshold() {
        let result = PhiScreener::new().scan("The front office opens at nine, call 555-867-5309.");
        assert!(!result.flagged);
        assert!(result.confidence_score < REJECTION_THRESHOLD);
        assert!(result.recommendation.contains("Low-confidence"));
    }

    #[test]
    fn clinical_context_boosts_phone_number_over_threshold() {
        let result =
            PhiScreener::new().scan("The patient was discharged; reach the family at 555-867-5309.");
        assert!(result.flagged);
        let phone = result
            .findings
            .iter()
            .find(|f| f.category == PhiCategory::PhoneNumber)
            .expect("phone finding");
        assert!(phone.confidence >= REJECTION_THRESHOLD);
    }

    #[test]
    fn bare_ssn_without_separators_is_flagged() {
        let result = PhiScreener::new().scan("Her number was read out as 123456789.");
        assert!(result.flagged);
        assert!(
            result
                .findings
                .iter()
                .any(|f| f.category == PhiCategory::SocialSecurityNumber)
        );
    }

    #[test]
    fn bare_credit_card_without_separators_is_flagged() {
        let result = PhiScreener::new().scan("Billing used card 4111111111111111 on file.");
        assert!(result.flagged);
        assert!(
            result
                .findings
                .iter()
                .any(|f| f.category == PhiCategory::CreditCard)
        );
    }

    #[test]
    fn street_addresses_match_case_insensitively() {
        let result = PhiScreener::new().scan("send the forms to 42 maple street by friday");
        assert!(result.flagged);
        let finding = result
            .findings
            .iter()
            .find(|f| f.category == PhiCategory::StreetAddress)
            .expect("street address finding");
        assert!(finding.confidence >= REJECTION_THRESHOLD);
    }

    #[rstest]
    #[case("MRN: ABC12345 was noted in the chart.", PhiCategory::MedicalRecordNumber)]
    #[case("She was born on 04/12/1987 in Ohio.", PhiCategory::DateOfBirth)]
    #[case("Ship it to 42 Maple Street before noon.", PhiCategory::StreetAddress)]
    #[case("Card 4111-1111-1111-1111 was on file.", PhiCategory::CreditCard)]
    fn categories_are_detected(#[case] text: &str, #[case] expected: PhiCategory) {
        let result = PhiScreener::new().scan(text);
        assert!(
            result.findings.iter().any(|f| f.category == expected),
            "expected {expected:?} in {:?}",
            result.findings
        );
    }

    #[test]
    fn findings_carry_span_not_text() {
        let text = "Reference SSN: 123-45-6789 today.";
        let result = PhiScreener::new().scan(text);
        let finding = result
            .findings
            .iter()
            .find(|f| f.category == PhiCategory::SocialSecurityNumber)
            .expect("ssn finding");

        assert!(finding.offset < text.len());
        assert!(finding.length > 0);

        let serialized = serde_json::to_string(&result).expect("serializes");
        assert!(!serialized.contains("123-45-6789"));
    }

    #[test]
    fn flagged_matches_threshold_comparison() {
        for text in [
            "Plain lecture content about anatomy.",
            "Call 555-867-5309 for details.",
            "SSN: 123-45-6789",
        ] {
            let result = PhiScreener::new().scan(text);
            assert_eq!(
                result.flagged,
                result.confidence_score >= REJECTION_THRESHOLD
            );
        }
    }
}
