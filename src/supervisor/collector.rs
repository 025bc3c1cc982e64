//! Log collector — reads the child's merged stdout/stderr, strips terminal
//! colour codes and feeds the shared [`LogBuffer`].

use std::borrow::Cow;
use std::io;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::SplitStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use super::log_buffer::LogBuffer;

/// Target used when mirroring frpc output into the tracing sink.
pub const MIRROR_TARGET: &str = "frpc";

/// Why the collector stopped reading.
#[derive(Debug)]
pub enum CollectorExit {
    /// Both streams reached EOF.
    StreamClosed,
    /// The supervisor cancelled the collector, or the read was interrupted
    /// while it was tearing the child down.
    Cancelled,
    /// Unexpected read error. Lines read before it stay in the buffer.
    Fault(io::Error),
}

fn ansi_regex() -> &'static Regex {
    static ANSI: OnceLock<Regex> = OnceLock::new();
    ANSI.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*[mK]").expect("ANSI pattern is valid"))
}

/// Remove `ESC [ <params> m` and `ESC [ <params> K` sequences.
///
/// Repeats until nothing matches, since removing one sequence can join the
/// pieces around it into another.
pub fn strip_ansi(line: &str) -> String {
    let re = ansi_regex();
    let mut out = match re.replace_all(line, "") {
        Cow::Borrowed(s) => return s.to_string(),
        Cow::Owned(s) => s,
    };
    while let Cow::Owned(next) = re.replace_all(&out, "") {
        out = next;
    }
    out
}

fn decode_line(mut raw: Vec<u8>) -> String {
    if raw.last() == Some(&b'\r') {
        raw.pop();
    }
    match String::from_utf8(raw) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

pub struct LogCollector {
    buffer: Arc<LogBuffer>,
    cancel: CancellationToken,
}

impl LogCollector {
    pub fn new(buffer: Arc<LogBuffer>, cancel: CancellationToken) -> Self {
        Self { buffer, cancel }
    }

    /// Run the collector on its own task.
    pub fn spawn<O, E>(self, stdout: O, stderr: E) -> JoinHandle<CollectorExit>
    where
        O: AsyncRead + Unpin + Send + 'static,
        E: AsyncRead + Unpin + Send + 'static,
    {
        tokio::spawn(self.run(stdout, stderr))
    }

    /// Read both streams as one line sequence until EOF, cancellation or a
    /// read fault.
    pub async fn run<O, E>(self, stdout: O, stderr: E) -> CollectorExit
    where
        O: AsyncRead + Unpin,
        E: AsyncRead + Unpin,
    {
        let out = SplitStream::new(BufReader::new(stdout).split(b'\n'));
        let err = SplitStream::new(BufReader::new(stderr).split(b'\n'));
        let mut merged = out.merge(err);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::debug!("Log collector cancelled");
                    return CollectorExit::Cancelled;
                }
                next = merged.next() => match next {
                    Some(Ok(raw)) => self.accept(decode_line(raw)),
                    Some(Err(e)) if e.kind() == io::ErrorKind::Interrupted || self.cancel.is_cancelled() => {
                        // expected when the streams are torn down during stop
                        return CollectorExit::Cancelled;
                    }
                    Some(Err(e)) => {
                        tracing::warn!("Log collector terminated: {}", e);
                        return CollectorExit::Fault(e);
                    }
                    None => {
                        tracing::debug!("frpc output stream closed");
                        return CollectorExit::StreamClosed;
                    }
                }
            }
        }
    }

    fn accept(&self, line: String) {
        let clean = strip_ansi(&line);
        tracing::debug!(target: MIRROR_TARGET, "{}", clean);
        self.buffer.push(clean);
    }
}
