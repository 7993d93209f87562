use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use treesync_core::progress::{ProgressEvent, TransferProgress};

pub(crate) fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    if bytes == 0 {
        return "0 B".to_owned();
    }
    let mut value = bytes as f64;
    let mut unit = 0usize;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[unit])
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}

/// Byte counter rendered as a spinner while the bridge runs.
///
/// Returns the sink to hand to the engine and the render task; the task
/// ends once every sender clone has been dropped.
pub(crate) fn spawn_progress_monitor(
    enabled: bool,
    label: String,
) -> (Option<TransferProgress>, Option<JoinHandle<()>>) {
    if !enabled {
        return (None, None);
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<ProgressEvent>();
    let progress = TransferProgress::new(tx);
    let join = tokio::spawn(async move {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
            pb.set_style(style.tick_strings(&["-", "\\", "|", "/"]));
        }
        pb.enable_steady_tick(Duration::from_millis(120));
        pb.set_message(format!("{label}: waiting for data"));

        let start = Instant::now();
        let mut total = 0u64;
        while let Some(event) = rx.recv().await {
            match event {
                ProgressEvent::Transferred { total: sum, .. } => {
                    total = sum;
                    let elapsed = start.elapsed().as_secs_f64().max(1e-6);
                    let rate = (total as f64 / elapsed) as u64;
                    pb.set_message(format!(
                        "{label}: {} \u{2022} {}/s",
                        format_bytes(total),
                        format_bytes(rate)
                    ));
                }
                ProgressEvent::Finished { total: sum } => {
                    total = sum;
                }
            }
        }

        pb.finish_and_clear();
        let elapsed = start.elapsed().as_secs_f64().max(1e-6);
        eprintln!(
            "[progress] {label}: {} in {:.1}s",
            format_bytes(total),
            elapsed
        );
    });

    (Some(progress), Some(join))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_binary_units() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.50 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MiB");
    }

    #[tokio::test]
    async fn monitor_stops_when_senders_drop() {
        let (progress, join) = spawn_progress_monitor(true, "test".to_string());
        let progress = progress.expect("enabled monitor yields a sink");
        progress.report_transferred(10, 10);
        progress.report_finished(10);
        drop(progress);
        join.expect("render task").await.expect("monitor exits");
    }

    #[test]
    fn disabled_monitor_is_inert() {
        let (progress, join) = spawn_progress_monitor(false, "test".to_string());
        assert!(progress.is_none());
        assert!(join.is_none());
    }
}
