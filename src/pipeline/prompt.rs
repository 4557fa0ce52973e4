use serde::Serialize;

use super::request::ReportRequest;

pub const COMPANY_PLACEHOLDER: &str = "[Company Name]";
pub const INDUSTRY_PLACEHOLDER: &str = "[Industry/Sector]";
const NOT_SPECIFIED: &str = "Not specified";

const TABLES_ON: &str = "Include relevant data tables";
const TABLES_OFF: &str = "No tables needed";
const RECOMMENDATIONS_ON: &str = "Provide actionable strategic recommendations";
const RECOMMENDATIONS_OFF: &str = "Omit recommendations";
const VISUALS_ON: &str = "Suggest data visualization types";
const VISUALS_OFF: &str = "No visualization suggestions";

fn or_placeholder<'a>(value: &'a str, placeholder: &'a str) -> &'a str {
    if value.is_empty() { placeholder } else { value }
}

fn pick(flag: bool, on: &'static str, off: &'static str) -> &'static str {
    if flag { on } else { off }
}

/// Renders the instruction sent to the generation service. Pure: the same
/// request always yields the same string, and the context is embedded verbatim.
#[tracing::instrument(
    name = "pipeline_stage prompt",
    skip(request),
    fields(
        pipeline.stage = "prompt",
        report.type = %request.report_type,
        prompt.chars,
    )
)]
pub fn build_prompt(request: &ReportRequest) -> String {
    let prompt = format!(
        "**Act as:** Chief Business Analyst with 15+ years at McKinsey & Company\n\
         **Task:** Generate a comprehensive {report_type} report\n\
         **Company:** {company}\n\
         **Industry:** {industry}\n\
         \n\
         **Business Context:**\n\
         {context}\n\
         \n\
         **Report Requirements:**\n\
         1. Tone: {tone} with professional business terminology\n\
         2. Length: Approximately {length} words\n\
         3. Structure: Clear sections with headings, subheadings, and bullet points\n\
         4. Data: {tables}\n\
         5. Recommendations: {recommendations}\n\
         6. Visuals: {visuals}\n\
         7. Include: Market position, growth opportunities, challenges, strategic outlook\n\
         8. Format: Executive summary, detailed analysis, conclusion\n",
        report_type = request.report_type,
        company = or_placeholder(&request.company, COMPANY_PLACEHOLDER),
        industry = or_placeholder(&request.industry, INDUSTRY_PLACEHOLDER),
        context = request.context,
        tone = request.tone,
        length = request.target_length_words,
        tables = pick(request.include_tables, TABLES_ON, TABLES_OFF),
        recommendations = pick(
            request.include_recommendations,
            RECOMMENDATIONS_ON,
            RECOMMENDATIONS_OFF
        ),
        visuals = pick(request.include_visualizations, VISUALS_ON, VISUALS_OFF),
    );

    tracing::Span::current().record("prompt.chars", prompt.chars().count());

    prompt
}

/// What the form shows next to the inputs before anything is submitted.
#[derive(Debug, Clone, Serialize)]
pub struct PromptPreview {
    pub report_type: String,
    pub company: String,
    pub industry: String,
    pub prompt: String,
}

impl PromptPreview {
    pub fn new(request: &ReportRequest) -> Self {
        Self {
            report_type: request.report_type.to_string(),
            company: or_placeholder(&request.company, NOT_SPECIFIED).to_string(),
            industry: or_placeholder(&request.industry, NOT_SPECIFIED).to_string(),
            prompt: build_prompt(request),
        }
    }
}
