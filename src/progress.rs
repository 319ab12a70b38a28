//! Progress bars for the per-record loops

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Bar over `len` records; hidden when `visible` is false
pub fn record_bar(len: usize, stage: &str, visible: bool) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if !visible {
        pb.set_draw_target(ProgressDrawTarget::hidden());
        return pb;
    }

    let style = ProgressStyle::default_bar()
        .template("{msg:>12.cyan} [{bar:40.cyan/blue}] {pos}/{len} | ETA: {eta}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");
    pb.set_style(style);
    pb.set_message(stage.to_string());
    pb
}
