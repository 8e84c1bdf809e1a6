//! Output sinks: shared writers, capture buffers, indentation and tee.

use std::cell::{Cell, RefCell};
use std::io::{self, Write};
use std::rc::Rc;

/// A shared, dynamically typed output stream.
pub type Sink = Rc<RefCell<dyn Write>>;

/// Wrap a writer as a [`Sink`].
pub fn sink<W: Write + 'static>(writer: W) -> Sink {
    Rc::new(RefCell::new(writer))
}

/// Adapter so a [`Sink`] can be used wherever a `Write` value is expected.
pub struct SinkWriter(pub Sink);

impl Write for SinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.borrow_mut().flush()
    }
}

// ---------------------------------------------------------------------------
// SharedBuffer
// ---------------------------------------------------------------------------

/// In-memory byte buffer with shared ownership.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    bytes: Rc<RefCell<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer contents as text (lossy for invalid UTF-8).
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.bytes.borrow()).into_owned()
    }

    pub fn clear(&self) {
        self.bytes.borrow_mut().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.borrow().is_empty()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// IndentingWriter
// ---------------------------------------------------------------------------

/// Prefixes every line written through it with a fixed indent.
pub struct IndentingWriter<W: Write> {
    inner: W,
    indent: String,
    at_line_start: bool,
}

impl<W: Write> IndentingWriter<W> {
    pub fn new(inner: W, columns: usize) -> Self {
        Self {
            inner,
            indent: " ".repeat(columns),
            at_line_start: true,
        }
    }
}

impl<W: Write> Write for IndentingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for chunk in buf.split_inclusive(|&b| b == b'\n') {
            if self.at_line_start && chunk != b"\n" {
                self.inner.write_all(self.indent.as_bytes())?;
            }
            self.inner.write_all(chunk)?;
            self.at_line_start = chunk.ends_with(b"\n");
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

// ---------------------------------------------------------------------------
// TeeWriter
// ---------------------------------------------------------------------------

/// Switch controlling whether a [`TeeWriter`] copies into its capture.
///
/// Closed while a clipped render goes to the screen, so the capture only
/// receives the unclipped copy from the render tap.
#[derive(Debug, Clone)]
pub struct CaptureGate {
    open: Rc<Cell<bool>>,
}

impl Default for CaptureGate {
    fn default() -> Self {
        Self {
            open: Rc::new(Cell::new(true)),
        }
    }
}

impl CaptureGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_open(&self, open: bool) {
        self.open.set(open);
    }

    pub fn is_open(&self) -> bool {
        self.open.get()
    }
}

/// Writes to the screen, and to a capture buffer while the gate is open.
pub struct TeeWriter<S: Write> {
    screen: S,
    capture: SharedBuffer,
    gate: CaptureGate,
}

impl<S: Write> TeeWriter<S> {
    pub fn new(screen: S, capture: SharedBuffer, gate: CaptureGate) -> Self {
        Self {
            screen,
            capture,
            gate,
        }
    }
}

impl<S: Write> Write for TeeWriter<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.screen.write_all(buf)?;
        if self.gate.is_open() {
            self.capture.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.screen.flush()
    }
}
