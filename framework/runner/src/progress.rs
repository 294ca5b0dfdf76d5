use indicatif::{ProgressBar, ProgressStyle};

/// Progress over the steps of a suite, cleanup steps included.
pub(crate) fn step_progress(total_steps: u64, enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(total_steps);
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{wide_bar:.cyan/blue}] {pos}/{len} steps [{elapsed_precise}]",
    )
    .map(|style| style.progress_chars("#>-"))
    .unwrap_or_else(|e| {
        log::debug!("Falling back to default progress style: {e}");
        ProgressStyle::default_bar()
    });
    pb.set_style(style);

    pb
}
