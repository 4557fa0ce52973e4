pub mod format;
pub mod orchestrator;
pub mod prompt;
pub mod request;

pub use format::{ExportArtifact, GeneratedReport, format_report, to_markdown};
pub use orchestrator::{generate_report, trigger_generation};
pub use prompt::{PromptPreview, build_prompt};
pub use request::{ReportRequest, ReportType, Tone};
