//! Progress sinks for the fetch loop.
//!
//! The fetcher reports `(completed_windows, total_windows)` after every
//! sub-window. Which sink is used is decided when the fetch is set up.

use std::io::{self, Write};

/// Receives fetch progress.
pub trait ProgressSink {
    fn report(&mut self, current: usize, total: usize);
}

/// Discards all progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _current: usize, _total: usize) {}
}

impl<P: ProgressSink + ?Sized> ProgressSink for &mut P {
    fn report(&mut self, current: usize, total: usize) {
        (**self).report(current, total)
    }
}

impl<P: ProgressSink + ?Sized> ProgressSink for Box<P> {
    fn report(&mut self, current: usize, total: usize) {
        (**self).report(current, total)
    }
}

/// Prints a percentage line each time progress crosses another `step_percent`.
pub struct TextProgress<W: Write = io::Stderr> {
    label: String,
    step_percent: usize,
    /// Step bucket of the last printed line and whether it was the final one.
    last_printed: Option<(usize, bool)>,
    out: W,
}

impl TextProgress<io::Stderr> {
    pub fn new(label: impl Into<String>) -> Self {
        Self::with_writer(label, io::stderr())
    }
}

impl<W: Write> TextProgress<W> {
    pub fn with_writer(label: impl Into<String>, out: W) -> Self {
        Self {
            label: label.into(),
            step_percent: 10,
            last_printed: None,
            out,
        }
    }

    pub fn step_percent(mut self, step: usize) -> Self {
        self.step_percent = step.clamp(1, 100);
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ProgressSink for TextProgress<W> {
    fn report(&mut self, current: usize, total: usize) {
        if total == 0 {
            return;
        }
        let percent = current.min(total) * 100 / total;
        let bucket = percent / self.step_percent;
        let done = current >= total;
        let due = match self.last_printed {
            None => true,
            Some((last_bucket, was_done)) => bucket > last_bucket || (done && !was_done),
        };
        if due {
            self.last_printed = Some((bucket, done));
            let _ = writeln!(self.out, "{}: {percent}% ({current}/{total})", self.label);
        }
    }
}

#[cfg(feature = "rich-progress")]
pub use rich::RichProgress;

#[cfg(feature = "rich-progress")]
mod rich {
    use super::ProgressSink;
    use crossterm::{
        cursor::MoveToColumn,
        queue,
        style::{Color, Print, ResetColor, SetForegroundColor},
        terminal::{Clear, ClearType},
    };
    use std::io::{self, Write};

    /// Single-line terminal bar redrawn in place on stderr.
    pub struct RichProgress {
        label: String,
        width: usize,
        finished: bool,
    }

    impl RichProgress {
        pub fn new(label: impl Into<String>) -> Self {
            Self {
                label: label.into(),
                width: 30,
                finished: false,
            }
        }

        pub fn width(mut self, width: usize) -> Self {
            self.width = width.max(1);
            self
        }

        fn draw(&self, current: usize, total: usize) -> io::Result<()> {
            let filled = current.min(total) * self.width / total;
            let percent = current.min(total) * 100 / total;
            let mut err = io::stderr();
            queue!(
                err,
                MoveToColumn(0),
                Clear(ClearType::CurrentLine),
                Print(format!("{} ", self.label)),
                SetForegroundColor(Color::Green),
                Print("█".repeat(filled)),
                SetForegroundColor(Color::DarkGrey),
                Print("░".repeat(self.width - filled)),
                ResetColor,
                Print(format!(" {percent:>3}% ({current}/{total})")),
            )?;
            if current >= total {
                queue!(err, Print("\n"))?;
            }
            err.flush()
        }
    }

    impl ProgressSink for RichProgress {
        fn report(&mut self, current: usize, total: usize) {
            if total == 0 || self.finished {
                return;
            }
            if self.draw(current, total).is_err() {
                // stderr is gone; stop drawing
                self.finished = true;
                return;
            }
            self.finished = current >= total;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn printed(sink: TextProgress<Vec<u8>>) -> Vec<String> {
        String::from_utf8(sink.into_inner())
            .unwrap()
            .lines()
            .map(String::from)
            .collect()
    }

    #[test]
    fn text_progress_prints_each_step_once() {
        let mut sink = TextProgress::with_writer("BTC-USD 1h", Vec::new()).step_percent(25);
        for i in 1..=8 {
            sink.report(i, 8);
        }
        let lines = printed(sink);
        assert_eq!(
            lines,
            vec![
                "BTC-USD 1h: 12% (1/8)",
                "BTC-USD 1h: 25% (2/8)",
                "BTC-USD 1h: 50% (4/8)",
                "BTC-USD 1h: 75% (6/8)",
                "BTC-USD 1h: 100% (8/8)",
            ]
        );
    }

    #[test]
    fn text_progress_ignores_empty_totals() {
        let mut sink = TextProgress::with_writer("x", Vec::new());
        sink.report(0, 0);
        assert!(printed(sink).is_empty());
    }

    #[test]
    fn boxed_sinks_forward() {
        let mut sink: Box<dyn ProgressSink> = Box::new(NoProgress);
        sink.report(1, 2);
    }
}
