use axum::Json;
use serde::Serialize;

use crate::pipeline::request::{MAX_LENGTH_WORDS, MIN_LENGTH_WORDS};
use crate::pipeline::{ReportRequest, ReportType, Tone};

#[derive(Debug, Serialize)]
pub struct LengthBounds {
    pub min: u32,
    pub max: u32,
}

/// Everything a form needs to render its controls.
#[derive(Debug, Serialize)]
pub struct FormOptions {
    pub report_types: Vec<ReportType>,
    pub tones: Vec<Tone>,
    pub length_words: LengthBounds,
    pub defaults: ReportRequest,
}

pub async fn form_options() -> Json<FormOptions> {
    Json(FormOptions {
        report_types: ReportType::ALL.to_vec(),
        tones: Tone::ALL.to_vec(),
        length_words: LengthBounds {
            min: MIN_LENGTH_WORDS,
            max: MAX_LENGTH_WORDS,
        },
        defaults: ReportRequest::default(),
    })
}
