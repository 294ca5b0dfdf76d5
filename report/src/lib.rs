//! Renders a [SuiteRun] for people to read.
//!
//! JSON is the lossless form of the record. HTML and text are views over the stored fields: they
//! format what was recorded and never recompute a verdict or a margin.

use anyhow::Context;
use drill_summary_model::SuiteRun;

mod format;
mod html;
mod text;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Json,
    Html,
    Text,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Json => "json",
            ReportFormat::Html => "html",
            ReportFormat::Text => "txt",
        }
    }
}

impl std::fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportFormat::Json => write!(f, "json"),
            ReportFormat::Html => write!(f, "html"),
            ReportFormat::Text => write!(f, "text"),
        }
    }
}

/// Render a suite run. Rendering has no side effects.
pub fn render(suite_run: &SuiteRun, format: ReportFormat) -> anyhow::Result<Vec<u8>> {
    log::debug!("Rendering suite {} as {format}", suite_run.id());

    match format {
        ReportFormat::Json => {
            let mut out = serde_json::to_vec_pretty(suite_run)
                .with_context(|| format!("Failed to serialize suite run {}", suite_run.id()))?;
            out.push(b'\n');
            Ok(out)
        }
        ReportFormat::Html => Ok(html::render(suite_run)
            .context("Failed to render HTML report")?
            .into_bytes()),
        ReportFormat::Text => Ok(text::render(suite_run)
            .context("Failed to render text report")?
            .into_bytes()),
    }
}

/// Default file name for a rendered suite, e.g. `full-20260101T000000000Z-abc.html`.
pub fn report_file_name(suite_run: &SuiteRun, format: ReportFormat) -> String {
    format!("{}.{}", suite_run.id(), format.extension())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_is_lossless() {
        let suite_run = SuiteRun::assemble(
            "quick-20260101T000000000Z-abcdefgh",
            "quick",
            true,
            1_767_225_600_000,
            1_767_225_601_000,
            false,
            Vec::new(),
            vec!["cancelled before scenario health-probe started".to_string()],
        );

        let rendered = render(&suite_run, ReportFormat::Json).unwrap();
        let parsed: SuiteRun = serde_json::from_slice(&rendered).unwrap();

        pretty_assertions::assert_eq!(suite_run, parsed);
    }

    #[test]
    fn file_name_uses_suite_id() {
        let suite_run =
            SuiteRun::assemble("full-1-x", "full", false, 0, 0, false, Vec::new(), Vec::new());

        assert_eq!("full-1-x.html", report_file_name(&suite_run, ReportFormat::Html));
        assert_eq!("full-1-x.txt", report_file_name(&suite_run, ReportFormat::Text));
    }
}
