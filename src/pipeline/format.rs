use chrono::{DateTime, Utc};
use serde::Serialize;

use super::request::ReportRequest;

const BULLET: char = '•';
const BULLET_MARKER: &str = "  *";
const QUOTE_MARKER: &str = "> ";

/// Renders generated text as a quoted markdown block: bullet glyphs become
/// indented list markers and every line, blank ones included, gets a `> ` prefix.
/// Empty input has zero lines and yields an empty string.
pub fn to_markdown(raw: &str) -> String {
    let text = raw.replace(BULLET, BULLET_MARKER);

    let mut out = String::with_capacity(text.len() + text.len() / 16 + QUOTE_MARKER.len());
    for line in lines_inclusive(&text) {
        out.push_str(QUOTE_MARKER);
        out.push_str(line);
    }
    out
}

/// Unicode line boundaries: `\n`, `\r`, `\r\n`, VT, FF, the file/group/record
/// separators, NEL, U+2028 and U+2029.
fn is_line_break(c: char) -> bool {
    matches!(
        c,
        '\n' | '\r' | '\x0b' | '\x0c' | '\x1c' | '\x1d' | '\x1e' | '\u{85}' | '\u{2028}' | '\u{2029}'
    )
}

/// Splits `text` into lines, each keeping its terminator. `\r\n` is one break.
fn lines_inclusive(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let end = match rest.char_indices().find(|&(_, c)| is_line_break(c)) {
            Some((i, '\r')) if rest[i + 1..].starts_with('\n') => i + 2,
            Some((i, c)) => i + c.len_utf8(),
            None => rest.len(),
        };
        let (line, tail) = rest.split_at(end);
        rest = tail;
        Some(line)
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedReport {
    pub title: String,
    pub raw_text: String,
    pub formatted_text: String,
    pub request: ReportRequest,
    pub model: String,
    pub generated_at: DateTime<Utc>,
}

impl GeneratedReport {
    pub fn export(&self) -> ExportArtifact {
        ExportArtifact {
            filename: export_filename(&self.request),
            content_type: "text/plain",
            bytes: self.raw_text.clone().into_bytes(),
        }
    }
}

#[tracing::instrument(
    name = "pipeline_stage format",
    skip(request, raw_text),
    fields(
        pipeline.stage = "format",
        report.title,
        report.lines,
    )
)]
pub fn format_report(request: &ReportRequest, raw_text: String, model: &str) -> GeneratedReport {
    let formatted_text = to_markdown(&raw_text);
    let title = request.title();

    let span = tracing::Span::current();
    span.record("report.title", title.as_str());
    span.record("report.lines", lines_inclusive(&raw_text).count());

    GeneratedReport {
        title,
        raw_text,
        formatted_text,
        request: request.clone(),
        model: model.to_string(),
        generated_at: Utc::now(),
    }
}

/// Downloadable copy of a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

impl ExportArtifact {
    /// `attachment` header value with characters that could break the header
    /// or escape a download directory replaced by `_`.
    pub fn content_disposition(&self) -> String {
        let safe: String = self
            .filename
            .chars()
            .map(|c| match c {
                '"' | '/' | '\\' => '_',
                c if c.is_control() => '_',
                c => c,
            })
            .collect();
        format!("attachment; filename=\"{safe}\"")
    }
}

pub fn export_filename(request: &ReportRequest) -> String {
    format!(
        "{}_{}.txt",
        request.company,
        request.report_type.label().replace(' ', "_")
    )
}
