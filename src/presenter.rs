//! Presentation surface. The sync core only talks to `Presenter`; which
//! backend renders the text is the binary's choice.

use std::io::{self, Write};

use anyhow::Result;
use crossterm::cursor::MoveUp;
use crossterm::execute;
use crossterm::terminal::{Clear, ClearType};

use crate::util::try_enable_ansi_on_windows;

pub trait Presenter {
    /// Show `text` followed by a newline.
    fn print(&mut self, text: &str);

    /// Transient single-line status that the next output overwrites.
    fn status(&mut self, text: &str) {
        self.print(text);
    }

    /// Erase the last `count` printed lines; 0 erases everything printed
    /// since the previous clear.
    fn clear_lines(&mut self, count: usize);

    /// Prepare the surface before the first output.
    fn build(&mut self) -> Result<()> {
        Ok(())
    }

    /// Hand control to the surface, which drives `job` to completion.
    fn run<F>(&mut self, job: F) -> Result<i32>
    where
        Self: Sized,
        F: FnOnce(&mut Self) -> Result<i32>,
    {
        job(self)
    }
}

/// Plain stdout rendering with ANSI line clearing.
#[derive(Default)]
pub struct TerminalPresenter {
    line_count: usize,
    pending_status: bool,
}

impl TerminalPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    fn end_status(&mut self) {
        if self.pending_status {
            let _ = execute!(io::stdout(), Clear(ClearType::CurrentLine));
            self.pending_status = false;
        }
    }
}

impl Presenter for TerminalPresenter {
    fn print(&mut self, text: &str) {
        self.end_status();
        println!("{}", text);
        self.line_count += text.matches('\n').count() + 1;
    }

    fn status(&mut self, text: &str) {
        self.end_status();
        let mut out = io::stdout();
        let _ = write!(out, "{}\r", text);
        let _ = out.flush();
        self.pending_status = true;
    }

    fn clear_lines(&mut self, count: usize) {
        self.end_status();
        let n = if count == 0 { self.line_count } else { count };
        if n > 0 {
            let rows = u16::try_from(n).unwrap_or(u16::MAX);
            let _ = execute!(io::stdout(), MoveUp(rows), Clear(ClearType::FromCursorDown));
        }
        self.line_count = self.line_count.saturating_sub(n);
    }

    fn build(&mut self) -> Result<()> {
        let _ = try_enable_ansi_on_windows();
        Ok(())
    }
}

/// Keeps everything in memory. Used for headless runs and tests.
#[derive(Default, Debug)]
pub struct CapturePresenter {
    pub lines: Vec<String>,
    pub statuses: Vec<String>,
    pub clears: usize,
}

impl CapturePresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

impl Presenter for CapturePresenter {
    fn print(&mut self, text: &str) {
        self.lines.push(text.to_string());
    }

    fn status(&mut self, text: &str) {
        self.statuses.push(text.to_string());
    }

    fn clear_lines(&mut self, _count: usize) {
        self.clears += 1;
    }
}
