//! Formatted trace sink.
//!
//! Besides structured `tracing` output, a machine can hand a human-readable
//! line to a caller-supplied sink on every transition and event. The buffer
//! used to format those lines belongs to the machine; nothing is shared
//! between machines. With no sink installed nothing is formatted.

use std::fmt::{self, Write};

type SinkFn = Box<dyn FnMut(&str)>;

/// Per-machine trace sink with its own scratch buffer.
#[derive(Default)]
pub(crate) struct TraceSink {
    sink: Option<SinkFn>,
    buffer: String,
}

impl TraceSink {
    pub(crate) fn set(&mut self, sink: SinkFn) {
        self.sink = Some(sink);
    }

    pub(crate) fn clear(&mut self) {
        self.sink = None;
        self.buffer = String::new();
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Formats `args` into the scratch buffer and hands it to the sink.
    pub(crate) fn emit(&mut self, args: fmt::Arguments<'_>) {
        if let Some(sink) = self.sink.as_mut() {
            self.buffer.clear();
            // Writing into a String cannot fail.
            let _ = self.buffer.write_fmt(args);
            sink(&self.buffer);
        }
    }
}

/// Strips the module path from a type name, keeping generic arguments.
pub fn short_type_name(full: &'static str) -> &'static str {
    let head_end = full.find('<').unwrap_or(full.len());
    match full[..head_end].rfind("::") {
        Some(pos) => &full[pos + 2..],
        None => full,
    }
}
