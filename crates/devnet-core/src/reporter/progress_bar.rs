//! Interactive single-line progress display.

use std::io::{self, Write};

use crossterm::{cursor, queue, terminal};

use super::Reporter;
use crate::progress::{ExecutionStep, ValidationStep};

const DEFAULT_WIDTH: usize = 80;
const BAR_WIDTH: usize = 30;
const ELLIPSIS: &str = "...";

/// Shorten `text` to at most `max` characters, marking the cut with `...`.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    if max <= ELLIPSIS.len() {
        return text.chars().take(max).collect();
    }
    let mut out: String = text.chars().take(max - ELLIPSIS.len()).collect();
    out.push_str(ELLIPSIS);
    out
}

/// Render `[====>     ] done/total`. Unknown totals render as a bare count.
pub fn render_bar(done: i64, total: u32, width: usize) -> String {
    let done = done.max(0) as u64;
    if total == 0 {
        return format!("[{}] {done}", " ".repeat(width));
    }
    let total = u64::from(total);
    let filled = ((done.min(total) * width as u64) / total) as usize;
    let mut bar = "=".repeat(filled);
    if filled < width {
        bar.push('>');
        bar.push_str(&" ".repeat(width - filled - 1));
    }
    format!("[{bar}] {done}/{total}")
}

/// Reporter drawing a progress bar on one terminal line.
///
/// Info and warning messages are printed above the bar. Instruction results
/// are only printed when `verbose` is set.
pub struct ProgressBarReporter<W: Write + Send = io::Stdout> {
    out: W,
    verbose: bool,
    width: Option<usize>,
    total_steps: u32,
}

impl ProgressBarReporter<io::Stdout> {
    /// Reporter drawing on stdout.
    pub fn stdout(verbose: bool) -> Self {
        Self::new(io::stdout(), verbose)
    }
}

impl<W: Write + Send> ProgressBarReporter<W> {
    pub fn new(out: W, verbose: bool) -> Self {
        Self {
            out,
            verbose,
            width: None,
            total_steps: 0,
        }
    }

    /// Use a fixed line width instead of querying the terminal.
    pub fn with_width(mut self, width: usize) -> Self {
        self.width = Some(width);
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn width(&self) -> usize {
        self.width.unwrap_or_else(|| {
            terminal::size()
                .map(|(columns, _)| usize::from(columns))
                .unwrap_or(DEFAULT_WIDTH)
        })
    }

    fn clear_line(&mut self) -> io::Result<()> {
        queue!(
            self.out,
            cursor::MoveToColumn(0),
            terminal::Clear(terminal::ClearType::CurrentLine)
        )
    }

    fn draw(&mut self, done: i64, detail: &str) -> io::Result<()> {
        let bar = render_bar(done, self.total_steps, BAR_WIDTH);
        let room = self.width().saturating_sub(bar.chars().count() + 1);
        let line = format!("{bar} {}", truncate(detail, room));
        self.clear_line()?;
        write!(self.out, "{line}")?;
        self.out.flush()
    }

    fn print_above(&mut self, message: &str) -> io::Result<()> {
        self.clear_line()?;
        writeln!(self.out, "{message}")?;
        self.out.flush()
    }
}

impl<W: Write + Send> Reporter for ProgressBarReporter<W> {
    fn report_interpretation_start(&mut self) -> io::Result<()> {
        self.total_steps = 0;
        self.draw(0, "Interpreting plan...")
    }

    fn report_validation_start(&mut self, total_steps: u32) -> io::Result<()> {
        self.total_steps = total_steps;
        self.draw(0, "Validating plan...")
    }

    fn report_validation_step(&mut self, step: ValidationStep) -> io::Result<()> {
        let detail = if step.details.is_empty() {
            step.description
        } else {
            step.details.join(", ")
        };
        self.draw(i64::from(step.current_step), &detail)
    }

    fn report_execution_start(&mut self, total_steps: u32) -> io::Result<()> {
        self.total_steps = total_steps;
        self.draw(0, "Starting execution...")
    }

    fn report_execution_step(&mut self, step: ExecutionStep) -> io::Result<()> {
        if let (true, Some(result)) = (self.verbose, step.result.as_deref()) {
            self.print_above(result.trim_end())?;
        }
        let detail = step.instruction.as_deref().unwrap_or(&step.description);
        // a reported result means the step itself is done
        let done = step.current_step + i64::from(step.result.is_some());
        self.draw(done, detail)
    }

    fn report_info(&mut self, message: &str) -> io::Result<()> {
        self.print_above(message)
    }

    fn report_warning(&mut self, message: &str) -> io::Result<()> {
        self.print_above(&format!("WARNING: {message}"))
    }

    fn report_run_finished(&mut self, success: bool, output: &str) -> io::Result<()> {
        if success {
            self.print_above("Run finished successfully with output:")?;
        } else {
            self.print_above("Run failed with output:")?;
        }
        self.print_above(output.trim_end())
    }
}
