/*!
 * Terminal progress rendering for patch operations
 */

use crossbeam_channel::Receiver;
use indicatif::{ProgressBar, ProgressStyle};

use crate::core::pipe::ProgressReport;

/// Drain a patch progress channel into a terminal bar
///
/// Blocks until the report channel closes; intended to run on its own
/// thread next to the pipe drain.
pub fn render_patch_progress(total_bytes: u64, reports: Receiver<ProgressReport>, show: bool) {
    if !show {
        for _ in reports.iter() {}
        return;
    }

    let bar = ProgressBar::new(total_bytes);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")
            .unwrap()
            .progress_chars("#>-"),
    );

    for report in reports.iter() {
        bar.set_position(report.received);
    }
    bar.finish();
}
