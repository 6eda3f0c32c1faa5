/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Wire-level trace sink.
//!
//! When a log sink is attached to a codec, every message leaves a
//! human-readable trail: template selection, field values, presence maps,
//! and hex dumps of the bytes on the wire. Output is best effort; write
//! failures are swallowed so that tracing can never alter wire behavior.

use std::fmt;
use std::io::Write;

/// Indented, best-effort trace writer.
pub struct WireLog {
    out: Box<dyn Write + Send>,
    depth: usize,
}

impl WireLog {
    /// Wraps a sink in a trace writer.
    #[must_use]
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self { out, depth: 0 }
    }

    /// Increases the indent for a nested scope.
    pub fn shift(&mut self) {
        self.depth += 1;
    }

    /// Decreases the indent when a nested scope closes.
    pub fn unshift(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Writes one indented line.
    pub fn line(&mut self, args: fmt::Arguments<'_>) {
        let _ = write!(self.out, "{}", "  ".repeat(self.depth));
        let _ = writeln!(self.out, "{}", args);
    }

    /// Writes one indented line with a hex rendering of `bytes`.
    pub fn hex(&mut self, label: &str, bytes: &[u8]) {
        let mut rendered = String::with_capacity(bytes.len() * 2);
        for byte in bytes {
            rendered.push_str(&format!("{:02x}", byte));
        }
        self.line(format_args!("{} = {}", label, rendered));
    }
}

impl fmt::Debug for WireLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WireLog").field("depth", &self.depth).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_line_indentation() {
        let sink = SharedSink::default();
        let mut log = WireLog::new(Box::new(sink.clone()));
        log.line(format_args!("template = 1"));
        log.shift();
        log.line(format_args!("Price = 7"));
        log.unshift();

        let output = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
        assert_eq!(output, "template = 1\n  Price = 7\n");
    }

    #[test]
    fn test_hex_rendering() {
        let sink = SharedSink::default();
        let mut log = WireLog::new(Box::new(sink.clone()));
        log.hex("bytes", &[0xC0, 0x81, 0x07]);

        let output = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
        assert_eq!(output, "bytes = c08107\n");
    }
}
