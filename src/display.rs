//! Display surface and key-wait collaborator.
//!
//! The key wait is the loop's only cancellation point. Still-image sources
//! wait with `KeyWait::Blocking`; streaming sources use a short timeout.

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::frame::Frame;
use crate::render::OverlayPlan;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyWait {
    Blocking,
    Timeout(Duration),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyCommand {
    Quit,
    /// Block until any further key arrives.
    Pause,
    /// Write the current annotated frame to the capture path.
    Capture,
}

impl KeyCommand {
    pub fn from_key(key: char) -> Option<Self> {
        match key {
            'q' | 'Q' => Some(KeyCommand::Quit),
            's' | 'S' => Some(KeyCommand::Pause),
            'p' | 'P' => Some(KeyCommand::Capture),
            _ => None,
        }
    }
}

pub trait Display {
    fn show(&mut self, frame: &Frame, plan: &OverlayPlan) -> Result<()>;

    /// `Ok(None)` means a key was pressed that maps to no command, or the
    /// timeout elapsed.
    fn wait_key(&mut self, wait: KeyWait) -> Result<Option<KeyCommand>>;
}

/// Install a Ctrl-C handler that raises the returned flag.
///
/// Call at most once per process.
pub fn install_interrupt_handler() -> Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&flag);
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    })
    .context("error setting Ctrl-C handler")?;
    Ok(flag)
}

/// Display with no window: logs each frame's overlay and never blocks.
pub struct HeadlessDisplay {
    interrupted: Arc<AtomicBool>,
}

impl HeadlessDisplay {
    pub fn new(interrupted: Arc<AtomicBool>) -> Self {
        Self { interrupted }
    }
}

impl Display for HeadlessDisplay {
    fn show(&mut self, frame: &Frame, plan: &OverlayPlan) -> Result<()> {
        log::debug!(
            "{}: {} ({} boxes drawn)",
            frame.export_name(),
            plan.status_lines.join(", "),
            plan.boxes.len()
        );
        Ok(())
    }

    fn wait_key(&mut self, wait: KeyWait) -> Result<Option<KeyCommand>> {
        if let KeyWait::Timeout(timeout) = wait {
            std::thread::sleep(timeout);
        }
        if self.interrupted.load(Ordering::SeqCst) {
            return Ok(Some(KeyCommand::Quit));
        }
        Ok(None)
    }
}

/// Display that reads one key per line from a reader on blocking waits.
///
/// Timed waits only observe the interrupt flag. End of input counts as a
/// key press with no command.
pub struct LineDisplay<R> {
    input: R,
    interrupted: Arc<AtomicBool>,
}

impl<R: BufRead> LineDisplay<R> {
    pub fn new(input: R, interrupted: Arc<AtomicBool>) -> Self {
        Self { input, interrupted }
    }
}

pub type StdinDisplay = LineDisplay<std::io::StdinLock<'static>>;

impl StdinDisplay {
    pub fn stdin(interrupted: Arc<AtomicBool>) -> Self {
        LineDisplay::new(std::io::stdin().lock(), interrupted)
    }
}

impl<R: BufRead> Display for LineDisplay<R> {
    fn show(&mut self, frame: &Frame, plan: &OverlayPlan) -> Result<()> {
        eprintln!("[{}]", frame.export_name());
        for overlay in &plan.boxes {
            eprintln!(
                "  {} at ({}, {})-({}, {})",
                overlay.label,
                overlay.bbox.xmin,
                overlay.bbox.ymin,
                overlay.bbox.xmax,
                overlay.bbox.ymax
            );
        }
        for line in &plan.status_lines {
            eprintln!("  {line}");
        }
        Ok(())
    }

    fn wait_key(&mut self, wait: KeyWait) -> Result<Option<KeyCommand>> {
        if self.interrupted.load(Ordering::SeqCst) {
            return Ok(Some(KeyCommand::Quit));
        }
        match wait {
            KeyWait::Timeout(timeout) => {
                std::thread::sleep(timeout);
                Ok(None)
            }
            KeyWait::Blocking => {
                eprint!("press Enter to continue (q quit, s pause, p capture): ");
                let mut line = String::new();
                self.input
                    .read_line(&mut line)
                    .context("failed to read key from input")?;
                Ok(line.trim().chars().next().and_then(KeyCommand::from_key))
            }
        }
    }
}
