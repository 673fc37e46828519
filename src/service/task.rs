//! Print tasks queued on the [`PrintService`](super::PrintService).

use std::fmt;

use image::DynamicImage;
use serde::Serialize;

use crate::error::Result;
use crate::printer::DeviceSession;
use crate::transport::Connector;

/// Monotonically increasing task number, unique per service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a task prints.
#[derive(Debug, Clone)]
pub enum TaskKind {
    /// Text through the device's ASCII mode
    Ascii(String),
    /// Pre-packed raster rows, each `row_bytes` long
    Raw(Vec<Vec<u8>>),
    /// Decoded image, dithered on the worker for the session's profile
    Image(DynamicImage),
    /// Blank paper feed in dots
    Break(u8),
}

impl TaskKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ascii(_) => "ascii",
            Self::Raw(_) => "raw",
            Self::Image(_) => "image",
            Self::Break(_) => "break",
        }
    }
}

/// # Print Task
///
/// ```
/// use peripage::service::PrintTask;
///
/// let task = PrintTask::ascii("Hello\n").with_concentration(2);
/// assert_eq!(task.concentration, Some(2));
/// ```
#[derive(Debug, Clone)]
pub struct PrintTask {
    pub kind: TaskKind,
    /// Heat level applied before the content
    pub concentration: Option<u8>,
}

impl PrintTask {
    pub fn new(kind: TaskKind) -> Self {
        Self {
            kind,
            concentration: None,
        }
    }

    pub fn ascii(text: impl Into<String>) -> Self {
        Self::new(TaskKind::Ascii(text.into()))
    }

    pub fn raw(rows: Vec<Vec<u8>>) -> Self {
        Self::new(TaskKind::Raw(rows))
    }

    pub fn image(image: DynamicImage) -> Self {
        Self::new(TaskKind::Image(image))
    }

    pub fn feed(pixels: u8) -> Self {
        Self::new(TaskKind::Break(pixels))
    }

    pub fn with_concentration(mut self, level: u8) -> Self {
        self.concentration = Some(level);
        self
    }

    /// Run the task's protocol operations, then flush the line buffer when
    /// asked to. Nothing else can interleave: the caller holds the session.
    pub(crate) fn execute<C: Connector>(self, session: &mut DeviceSession<C>, flush: bool) -> Result<()> {
        if let Some(level) = self.concentration {
            session.set_concentration(level)?;
        }

        match self.kind {
            TaskKind::Ascii(text) => session.print_ascii(&text)?,
            TaskKind::Raw(rows) => {
                session.print_rows(&rows)?;
            }
            TaskKind::Image(image) => {
                session.print_image(&image)?;
            }
            TaskKind::Break(pixels) => session.print_break(pixels)?,
        }

        if flush {
            session.flush_ascii()?;
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
