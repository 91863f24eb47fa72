//! Log-line forwarding for frontends.
//!
//! Rather than formatting events by hand, this rides the fmt layer: a
//! `MakeWriter` hands out a per-event buffer whose completed lines are
//! passed to the sink. The fmt machinery owns the rendering, so sink output
//! stays consistent with the console.

use std::io;
use std::sync::Arc;

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// Receives one formatted log line per call. Must not block.
pub type LogSink = Arc<dyn Fn(String) + Send + Sync>;

/// Longest line handed to a sink; anything beyond is cut with a byte count.
const LINE_CAP: usize = 16 * 1024;

/// Build a fmt layer that writes through the sink instead of stdout.
pub(crate) fn layer<S>(sink: LogSink) -> impl Layer<S> + Send + Sync + 'static
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(SinkWriter { sink })
}

#[derive(Clone)]
struct SinkWriter {
    sink: LogSink,
}

impl<'a> MakeWriter<'a> for SinkWriter {
    type Writer = LineBuffer;

    fn make_writer(&'a self) -> LineBuffer {
        LineBuffer {
            sink: Arc::clone(&self.sink),
            buf: Vec::new(),
        }
    }
}

/// Collects one event's bytes; every completed line goes to the sink, and
/// any unterminated remainder is forwarded on drop.
struct LineBuffer {
    sink: LogSink,
    buf: Vec<u8>,
}

impl LineBuffer {
    fn forward_complete_lines(&mut self) {
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            self.emit(&line[..line.len() - 1]);
        }
    }

    fn emit(&self, raw: &[u8]) {
        if raw.is_empty() {
            return;
        }
        let mut line = String::from_utf8_lossy(raw).into_owned();
        if line.len() > LINE_CAP {
            let mut cut = LINE_CAP;
            while !line.is_char_boundary(cut) {
                cut -= 1;
            }
            let dropped = line.len() - cut;
            line.truncate(cut);
            line.push_str(&format!(" …(+{dropped} bytes)"));
        }
        (self.sink)(line);
    }
}

impl io::Write for LineBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        self.forward_complete_lines();
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.forward_complete_lines();
        Ok(())
    }
}

impl Drop for LineBuffer {
    fn drop(&mut self) {
        self.forward_complete_lines();
        if !self.buf.is_empty() {
            let rest = std::mem::take(&mut self.buf);
            self.emit(&rest);
        }
    }
}
