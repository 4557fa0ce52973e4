use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const MIN_LENGTH_WORDS: u32 = 200;
pub const MAX_LENGTH_WORDS: u32 = 2000;
pub const DEFAULT_LENGTH_WORDS: u32 = 750;

pub const MISSING_CONTEXT_WARNING: &str =
    "Please provide business context before generating a report";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReportType {
    #[default]
    #[serde(rename = "Business Analysis")]
    BusinessAnalysis,
    #[serde(rename = "SWOT Analysis")]
    SwotAnalysis,
    #[serde(rename = "Market Research")]
    MarketResearch,
    #[serde(rename = "Competitive Landscape")]
    CompetitiveLandscape,
    #[serde(rename = "Financial Projection")]
    FinancialProjection,
    #[serde(rename = "Risk Assessment")]
    RiskAssessment,
}

impl ReportType {
    pub const ALL: [Self; 6] = [
        Self::BusinessAnalysis,
        Self::SwotAnalysis,
        Self::MarketResearch,
        Self::CompetitiveLandscape,
        Self::FinancialProjection,
        Self::RiskAssessment,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::BusinessAnalysis => "Business Analysis",
            Self::SwotAnalysis => "SWOT Analysis",
            Self::MarketResearch => "Market Research",
            Self::CompetitiveLandscape => "Competitive Landscape",
            Self::FinancialProjection => "Financial Projection",
            Self::RiskAssessment => "Risk Assessment",
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Tone {
    #[default]
    Professional,
    #[serde(rename = "Executive Summary")]
    ExecutiveSummary,
    Technical,
    Persuasive,
    Concise,
    #[serde(rename = "Data-Driven")]
    DataDriven,
}

impl Tone {
    pub const ALL: [Self; 6] = [
        Self::Professional,
        Self::ExecutiveSummary,
        Self::Technical,
        Self::Persuasive,
        Self::Concise,
        Self::DataDriven,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Professional => "Professional",
            Self::ExecutiveSummary => "Executive Summary",
            Self::Technical => "Technical",
            Self::Persuasive => "Persuasive",
            Self::Concise => "Concise",
            Self::DataDriven => "Data-Driven",
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Form state for one report. Empty `company`/`industry` mean "not specified".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportRequest {
    pub company: String,
    pub industry: String,
    pub context: String,
    pub report_type: ReportType,
    pub tone: Tone,
    pub target_length_words: u32,
    pub include_tables: bool,
    pub include_recommendations: bool,
    pub include_visualizations: bool,
}

impl Default for ReportRequest {
    fn default() -> Self {
        Self {
            company: String::new(),
            industry: String::new(),
            context: String::new(),
            report_type: ReportType::default(),
            tone: Tone::default(),
            target_length_words: DEFAULT_LENGTH_WORDS,
            include_tables: true,
            include_recommendations: true,
            include_visualizations: true,
        }
    }
}

impl ReportRequest {
    /// Checks what the form surface enforces on every edit.
    pub fn validate_fields(&self) -> Result<(), AppError> {
        if !(MIN_LENGTH_WORDS..=MAX_LENGTH_WORDS).contains(&self.target_length_words) {
            return Err(AppError::Validation(format!(
                "target_length_words must be between {MIN_LENGTH_WORDS} and {MAX_LENGTH_WORDS}, got {}",
                self.target_length_words
            )));
        }
        Ok(())
    }

    /// Checks everything required before a generation request may be issued.
    pub fn validate_for_generation(&self) -> Result<(), AppError> {
        self.validate_fields()?;
        if self.context.trim().is_empty() {
            return Err(AppError::Validation(MISSING_CONTEXT_WARNING.to_string()));
        }
        Ok(())
    }

    /// Heading shown above a rendered report.
    pub fn title(&self) -> String {
        format!("{} Report: {}", self.report_type, self.company)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_form_initial_state() {
        let req = ReportRequest::default();
        assert_eq!(req.report_type, ReportType::ALL[0]);
        assert_eq!(req.tone, Tone::ALL[0]);
        assert_eq!(req.target_length_words, 750);
        assert!(req.include_tables);
        assert!(req.include_recommendations);
        assert!(req.include_visualizations);
        assert!(req.context.is_empty());
    }

    #[test]
    fn test_labels_round_trip_through_serde() {
        for report_type in ReportType::ALL {
            let json = serde_json::to_value(report_type).unwrap();
            assert_eq!(json, report_type.label());
        }
        for tone in Tone::ALL {
            let json = serde_json::to_value(tone).unwrap();
            assert_eq!(json, tone.label());
        }
        let parsed: ReportType = serde_json::from_str(r#""Competitive Landscape""#).unwrap();
        assert_eq!(parsed, ReportType::CompetitiveLandscape);
    }

    #[test]
    fn test_partial_form_uses_defaults() {
        let req: ReportRequest =
            serde_json::from_str(r#"{"company": "Acme", "tone": "Data-Driven"}"#).unwrap();
        assert_eq!(req.company, "Acme");
        assert_eq!(req.tone, Tone::DataDriven);
        assert_eq!(req.target_length_words, DEFAULT_LENGTH_WORDS);
        assert!(req.include_visualizations);
    }

    #[test]
    fn test_unknown_report_type_rejected() {
        let result = serde_json::from_str::<ReportRequest>(r#"{"report_type": "Horoscope"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_length_bounds() {
        let mut req = ReportRequest::default();
        for ok in [MIN_LENGTH_WORDS, 750, MAX_LENGTH_WORDS] {
            req.target_length_words = ok;
            assert!(req.validate_fields().is_ok(), "{ok} should be accepted");
        }
        for bad in [0, MIN_LENGTH_WORDS - 1, MAX_LENGTH_WORDS + 1] {
            req.target_length_words = bad;
            assert!(
                matches!(req.validate_fields(), Err(AppError::Validation(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_empty_context_blocks_generation() {
        let mut req = ReportRequest::default();
        match req.validate_for_generation() {
            Err(AppError::Validation(msg)) => assert_eq!(msg, MISSING_CONTEXT_WARNING),
            other => panic!("expected validation error, got {other:?}"),
        }

        req.context = "  \n\t".to_string();
        assert!(req.validate_for_generation().is_err());

        req.context = "Launching a loyalty app".to_string();
        assert!(req.validate_for_generation().is_ok());
    }

    #[test]
    fn test_title() {
        let req = ReportRequest {
            company: "Acme".to_string(),
            report_type: ReportType::RiskAssessment,
            ..Default::default()
        };
        assert_eq!(req.title(), "Risk Assessment Report: Acme");
    }
}
