use anyhow::Result;
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{Clear, ClearType},
};
use std::io::{self, Write};
use std::sync::Mutex;

use arbor_core::ProgressSink;

/// Color scheme for terminal output.
struct Colors;

impl Colors {
    const HEADER: Color = Color::Magenta;
    const OK: Color = Color::Green;
    const WARN: Color = Color::Yellow;
    const ERROR: Color = Color::Red;
    const DIM: Color = Color::DarkGrey;
}

/// Status output on stderr; stdout is left for extracted text.
pub struct Terminal {
    quiet: bool,
}

impl Terminal {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }

    pub fn print_header(&self, msg: &str) -> Result<()> {
        self.colored(Colors::HEADER, msg)
    }

    pub fn print_ok(&self, msg: &str) -> Result<()> {
        self.colored(Colors::OK, msg)
    }

    pub fn print_warning(&self, msg: &str) -> Result<()> {
        self.colored(Colors::WARN, &format!("Warning: {}", msg))
    }

    pub fn print_error(&self, msg: &str) -> Result<()> {
        self.colored(Colors::ERROR, &format!("Error: {}", msg))
    }

    pub fn print_info(&self, msg: &str) -> Result<()> {
        self.colored(Colors::DIM, msg)
    }

    /// A sink that redraws one progress line, or `None` when quiet.
    pub fn progress(&self) -> Option<ProgressLine> {
        (!self.quiet).then(ProgressLine::default)
    }

    fn colored(&self, color: Color, msg: &str) -> Result<()> {
        let mut stderr = io::stderr();
        execute!(stderr, SetForegroundColor(color), Print(format!("{}\n", msg)), ResetColor)?;
        stderr.flush()?;
        Ok(())
    }
}

/// Redraws `[ 42%] status` in place; diagnostics go on their own lines.
#[derive(Default)]
pub struct ProgressLine {
    last: Mutex<Option<String>>,
}

impl ProgressLine {
    /// Move past the progress line so later output starts clean.
    pub fn finish(&self) {
        if let Ok(mut last) = self.last.lock() {
            if last.take().is_some() {
                let mut stderr = io::stderr();
                execute!(stderr, Print("\n")).ok();
            }
        }
    }
}

pub fn progress_line(fraction: f32, status: &str) -> String {
    let status: String = status.chars().take(72).collect();
    format!("[{:>3}%] {}", (fraction * 100.0).round() as u32, status)
}

impl ProgressSink for ProgressLine {
    fn progress(&self, fraction: f32, status: &str) {
        let line = progress_line(fraction, status);
        let Ok(mut last) = self.last.lock() else {
            return;
        };
        if last.as_deref() == Some(line.as_str()) {
            return;
        }
        let mut stderr = io::stderr();
        execute!(
            stderr,
            Print("\r"),
            Clear(ClearType::CurrentLine),
            SetForegroundColor(Colors::DIM),
            Print(&line),
            ResetColor,
        )
        .ok();
        stderr.flush().ok();
        *last = Some(line);
    }

    fn diagnostic(&self, message: &str) {
        let Ok(last) = self.last.lock() else {
            return;
        };
        let mut stderr = io::stderr();
        execute!(
            stderr,
            Print("\r"),
            Clear(ClearType::CurrentLine),
            SetForegroundColor(Colors::WARN),
            Print(format!("{}\n", message)),
            ResetColor,
        )
        .ok();
        // Redraw the bar under the diagnostic.
        if let Some(line) = last.as_deref() {
            execute!(stderr, SetForegroundColor(Colors::DIM), Print(line), ResetColor).ok();
        }
        stderr.flush().ok();
    }
}
