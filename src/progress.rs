use std::io::{self, Write};
use std::time::{Duration, Instant};

/// Timestamped status lines on stderr. A disabled instance prints nothing.
pub struct ConsoleProgress {
    enabled: bool,
    t0: Instant,
}

impl ConsoleProgress {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            t0: Instant::now(),
        }
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        self.line("", msg.as_ref());
    }

    pub fn warn(&self, msg: impl AsRef<str>) {
        self.line("warning: ", msg.as_ref());
    }

    pub fn progress(&self, label: &str, current: usize, total: usize) {
        if !self.enabled {
            return;
        }
        let total = total.max(1);
        let current = current.min(total);
        let pct = (current as f64 / total as f64) * 100.0;
        self.line("", &format!("{label} {current}/{total} ({pct:5.1}%)"));
    }

    fn line(&self, prefix: &str, msg: &str) {
        if !self.enabled {
            return;
        }
        let ts = fmt_elapsed(self.t0.elapsed().as_secs_f64());
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "[{ts}] {prefix}{msg}");
    }
}

fn fmt_elapsed(seconds: f64) -> String {
    let seconds = seconds.max(0.0) as u64;
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    if h > 0 {
        format!("{h:02}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}

pub fn completion_message(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!(
        "Translation completed in {} hours, {} minutes, and {} seconds.",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{completion_message, fmt_elapsed};

    #[test]
    fn elapsed_stamp() {
        assert_eq!(fmt_elapsed(65.9), "01:05");
        assert_eq!(fmt_elapsed(3725.0), "01:02:05");
        assert_eq!(fmt_elapsed(-1.0), "00:00");
    }

    #[test]
    fn completion_sentence() {
        assert_eq!(
            completion_message(Duration::from_secs(3725)),
            "Translation completed in 1 hours, 2 minutes, and 5 seconds."
        );
        assert_eq!(
            completion_message(Duration::from_millis(999)),
            "Translation completed in 0 hours, 0 minutes, and 0 seconds."
        );
    }
}
