//! Terminal progress indicators for comment downloads.
//!
//! Both bars draw to stderr so stdout only carries the completion message.

use indicatif::{ProgressBar, ProgressStyle};
use std::ops::Deref;
use std::time::Duration;

/// Clears the wrapped bar when dropped, so an early `?` return leaves no
/// half-drawn bar behind.
pub struct ClearOnDrop(ProgressBar);

impl ClearOnDrop {
    pub fn new(pb: ProgressBar) -> Self {
        Self(pb)
    }
}

impl Deref for ClearOnDrop {
    type Target = ProgressBar;

    fn deref(&self) -> &ProgressBar {
        &self.0
    }
}

impl Drop for ClearOnDrop {
    fn drop(&mut self) {
        self.0.finish_and_clear();
    }
}

/// Spinner with a running count, for sources whose total is unknown.
pub fn make_spinner(label: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.green} {msg} {pos} comments  elapsed: {elapsed_precise}  it/s: {per_sec}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(label.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Count-style progress bar (items fetched out of `total`).
pub fn make_count_progress(total: u64, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::with_template(
        "{spinner:.green} {msg} {pos}/{len} [{bar:.cyan/blue}] {percent:>3}%  \
         it/s: {per_sec}  elapsed: {elapsed_precise}  eta: {eta_precise}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("█▉▊▋▌▍▎▏  ");
    pb.set_style(style);
    if !label.is_empty() {
        pb.set_message(label.to_string());
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
