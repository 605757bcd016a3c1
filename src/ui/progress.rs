use crate::session::Statistics;
use std::io::{self, Write};

/// Single-line ANSI progress bar for the CLI, redrawn in place from the
/// engine's statistics snapshots.
pub struct ProgressBar {
    width: usize,
}

impl ProgressBar {
    /// width = number of bar character slots (not including the brackets)
    pub fn new(width: usize) -> Self {
        Self { width }
    }

    /// Render the bar for `percent` (0.0..=100.0) with the snapshot's speed
    /// and bad-sector figures alongside.
    pub fn render(&mut self, percent: f64, stats: &Statistics) {
        let line = self.compose(percent, stats);
        print!("\r\x1b[2K{}", line);
        io::stdout().flush().ok();
    }

    /// Finish the in-place line so subsequent output starts fresh.
    pub fn finish(&mut self) {
        println!();
    }

    fn compose(&self, percent: f64, stats: &Statistics) -> String {
        let pct = if percent.is_nan() {
            0.0
        } else {
            percent.clamp(0.0, 100.0)
        };

        let filled = ((pct / 100.0) * self.width as f64).round() as usize;
        let empty = self.width.saturating_sub(filled);

        let green = "\x1b[38;5;82m";
        let gray = "\x1b[38;5;240m";
        let bold = "\x1b[1m";
        let reset = "\x1b[0m";

        let bar = format!(
            "{}{}{}{}{}{}",
            bold,
            green,
            "█".repeat(filled),
            reset,
            gray,
            "░".repeat(empty)
        ) + reset;

        format!(
            "[{}] {}{:>5.1}%{}  {}/s  pass {}/{}  bad {}  {}",
            bar,
            bold,
            pct,
            reset,
            human_bytes(stats.avg_speed_mbs * 1024.0 * 1024.0),
            stats.current_pass,
            stats.total_passes,
            stats.bad_sector_count,
            stats.elapsed_display(),
        )
    }
}

/// Convert bytes/sec to readable string
pub fn human_bytes(bps: f64) -> String {
    let units = ["B", "KB", "MB", "GB", "TB"];
    if bps <= 0.0 {
        return "0B".to_string();
    }
    let mut val = bps;
    let mut i = 0usize;
    while val >= 1024.0 && i + 1 < units.len() {
        val /= 1024.0;
        i += 1;
    }
    format!("{:.2}{}", val, units[i])
}

/// Format seconds to H:MM:SS or M:SS
pub fn format_duration(secs: u64) -> String {
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_bytes_picks_sane_units() {
        assert_eq!(human_bytes(0.0), "0B");
        assert_eq!(human_bytes(512.0), "512.00B");
        assert_eq!(human_bytes(2.0 * 1024.0 * 1024.0), "2.00MB");
    }

    #[test]
    fn format_duration_switches_formats() {
        assert_eq!(format_duration(59), "0:59");
        assert_eq!(format_duration(61), "1:01");
        assert_eq!(format_duration(3661), "1:01:01");
    }

    #[test]
    fn compose_clamps_percent() {
        let mut stats = Statistics::idle();
        stats.total_passes = 1;
        let bar = ProgressBar::new(10);
        let line = bar.compose(250.0, &stats);
        assert!(line.contains("100.0%"));
        let line = bar.compose(f64::NAN, &stats);
        assert!(line.contains("0.0%"));
    }
}
