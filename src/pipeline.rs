//! The interactive watermarking sequence
//!
//! A run walks through fixed steps: pick the input, pick the font, enter the
//! text, pick the output, process, and report. Whatever collects the user's
//! answers implements [`Frontend`]; declining any prompt cancels the run.

use std::fmt;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::Error;
use crate::font::FontResource;
use crate::process::{Outcome, Watermarker};

/// One step of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    SelectInput,
    SelectFont,
    EnterText,
    SelectOutput,
    Process,
    Report,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::SelectInput => "input selection",
            Step::SelectFont => "font selection",
            Step::EnterText => "text entry",
            Step::SelectOutput => "output selection",
            Step::Process => "processing",
            Step::Report => "report",
        };
        f.write_str(name)
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    Completed(Outcome),
    /// The user declined the prompt of this step
    Cancelled(Step),
    Failed(String),
}

impl Report {
    pub fn is_completed(&self) -> bool {
        matches!(self, Report::Completed(_))
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Report::Completed(outcome) => write!(f, "{}", outcome),
            Report::Cancelled(step) => write!(f, "Cancelled during {}", step),
            Report::Failed(message) => write!(f, "Failed: {}", message),
        }
    }
}

/// Source of the user's choices and sink for the final report
pub trait Frontend {
    /// Path of the image or PDF to watermark
    fn select_input(&mut self) -> Option<PathBuf>;

    /// Path of the TrueType font to draw with
    fn select_font(&mut self) -> Option<PathBuf>;

    /// Watermark text; surrounding whitespace is trimmed
    fn enter_text(&mut self) -> Option<String>;

    /// Where to write the result for `input`
    fn select_output(&mut self, input: &Path) -> Option<PathBuf>;

    /// Adjust the watermarker (output mode, PDF anchor) before processing
    fn configure(&mut self, watermarker: Watermarker) -> Watermarker {
        watermarker
    }

    fn report(&mut self, report: &Report);
}

/// Run every step against `frontend` and hand it the final report
pub fn run(frontend: &mut dyn Frontend) -> Report {
    let report = execute(frontend);
    debug!("Step: {} ({})", Step::Report, report);
    frontend.report(&report);
    report
}

fn execute(frontend: &mut dyn Frontend) -> Report {
    debug!("Step: {}", Step::SelectInput);
    let Some(input) = frontend.select_input() else {
        return Report::Cancelled(Step::SelectInput);
    };

    // A missing or unreadable font ends the run before anything is written
    debug!("Step: {}", Step::SelectFont);
    let Some(font_path) = frontend.select_font() else {
        return Report::Cancelled(Step::SelectFont);
    };
    let font = match FontResource::load(&font_path) {
        Ok(font) => font,
        Err(e) => return Report::Failed(e.to_string()),
    };

    debug!("Step: {}", Step::EnterText);
    let Some(text) = frontend.enter_text() else {
        return Report::Cancelled(Step::EnterText);
    };
    let text = text.trim();
    if text.is_empty() {
        return Report::Failed(Error::EmptyText.to_string());
    }

    debug!("Step: {}", Step::SelectOutput);
    let Some(output) = frontend.select_output(&input) else {
        return Report::Cancelled(Step::SelectOutput);
    };

    debug!("Step: {}", Step::Process);
    let watermarker = frontend.configure(Watermarker::new(font));
    match watermarker.process(&input, text, &output) {
        Ok(outcome) => Report::Completed(outcome),
        Err(e) => Report::Failed(e.to_string()),
    }
}
