//! Progress display for file transfers.

use indicatif::{ProgressBar, ProgressStyle};

/// Byte progress for a single transfer. Uploads know the total size and get
/// a determinate bar; downloads learn the size only when FIN arrives, so
/// they get a running byte counter.
pub struct TransferProgress {
    bar: Option<ProgressBar>,
}

impl TransferProgress {
    /// A tracker that displays nothing.
    pub fn hidden() -> Self {
        TransferProgress { bar: None }
    }

    /// A visible tracker; pass the total size when it is known up front.
    pub fn new(total_bytes: Option<u64>) -> Self {
        let bar = match total_bytes {
            Some(total) => {
                let pb = ProgressBar::new(total);
                pb.set_style(
                    ProgressStyle::default_bar()
                        .template("{msg:12} {bytes:>10}/{total_bytes:>10} {percent:>4}% {bytes_per_sec:>12}")
                        .unwrap()
                        .progress_chars("█▉▊▋▌▍▎▏ "),
                );
                pb
            }
            None => {
                let pb = ProgressBar::new_spinner();
                pb.set_style(
                    ProgressStyle::default_spinner()
                        .template("{msg:12} {bytes:>10} {bytes_per_sec:>12}")
                        .unwrap(),
                );
                pb
            }
        };
        bar.set_message("Transferring");
        TransferProgress { bar: Some(bar) }
    }

    /// Advance the byte count.
    pub fn update(&self, bytes: u64) {
        if let Some(ref pb) = self.bar {
            pb.inc(bytes);
        }
    }

    /// Remove the display.
    pub fn finish(&self) {
        if let Some(ref pb) = self.bar {
            pb.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_progress_is_inert() {
        let progress = TransferProgress::hidden();
        progress.update(1024);
        progress.finish();
    }

    #[test]
    fn test_bounded_progress_counts() {
        let progress = TransferProgress::new(Some(2048));
        progress.update(1024);
        progress.update(1024);
        if let Some(ref pb) = progress.bar {
            assert_eq!(pb.position(), 2048);
        }
        progress.finish();
    }

    #[test]
    fn test_unbounded_progress_counts() {
        let progress = TransferProgress::new(None);
        progress.update(500);
        if let Some(ref pb) = progress.bar {
            assert_eq!(pb.position(), 500);
        }
        progress.finish();
    }
}
