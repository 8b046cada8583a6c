//! Line reader and the decode → console → Riemann pipeline.

pub mod data;
pub mod dispatch;
pub mod json;
pub mod payload;

use std::io::{BufRead, Write};

use tracing::{debug, error, warn};
use url::Url;

use crate::error::{LineError, TransportError};
use data::decode;
use dispatch::{Dispatcher, MetricSink};
use json::JsonSink;
use payload::RawPayload;

/// Prefix of the lines that carry readings. The monitor posts its data as
/// an HTTP request; everything else on the wire is ignored.
pub const REQUEST_MARKER: &str = "GET ";

/// Counters kept over a run, logged at shutdown.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub lines: u64,             // every line read
    pub requests: u64,          // lines carrying the request marker
    pub skipped: u64,           // requests dropped before emission
    pub emitted: u64,           // JSON records written
    pub events_sent: u64,
    pub dispatch_failures: u64,
}

/// What happened to one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    Ignored,
    Skipped,
    Processed { dispatched: bool },
}

/// Parses a request URI: either an absolute path (`/post?..`) or an
/// absolute URL.
pub fn parse_request_uri(uri: &str) -> Result<Url, url::ParseError> {
    if uri.starts_with('/') {
        Url::parse("http://monitor.invalid/")?.join(uri)
    } else {
        Url::parse(uri)
    }
}

/// Payload of a request line, `None` for any other line.
pub fn parse_request_line(line: &str) -> Result<Option<RawPayload>, LineError> {
    if !line.starts_with(REQUEST_MARKER) {
        return Ok(None);
    }
    let uri = line.split_whitespace().nth(1).ok_or(LineError::MissingUri)?;
    let url = parse_request_uri(uri).map_err(|source| LineError::Uri {
        uri: uri.to_string(),
        source,
    })?;
    Ok(Some(RawPayload::from_url(&url)))
}

pub struct Pipeline<W: Write, S: MetricSink> {
    console: JsonSink<W>,
    dispatcher: Dispatcher<S>,
    stats: RunStats,
}

impl<W: Write, S: MetricSink> Pipeline<W, S> {
    pub fn new(console: JsonSink<W>, dispatcher: Dispatcher<S>) -> Self {
        Self {
            console,
            dispatcher,
            stats: RunStats::default(),
        }
    }

    /// Handles one line (without its terminator). Never fails: problems are
    /// logged and the line is dropped.
    pub fn process_line(&mut self, line: &str) -> LineOutcome {
        self.stats.lines += 1;

        let vals = match parse_request_line(line) {
            Ok(Some(vals)) => vals,
            Ok(None) => {
                debug!("Ignoring line: {:?}", line);
                return LineOutcome::Ignored;
            }
            Err(e) => {
                self.stats.requests += 1;
                return self.skip(e);
            }
        };
        self.stats.requests += 1;

        let record = match decode(&vals) {
            Ok(record) => record,
            Err(e) => return self.skip(e.into()),
        };

        match self.console.emit(&record) {
            Ok(()) => self.stats.emitted += 1,
            Err(e) => error!("Failed to write JSON record: {}", e),
        }

        match self.dispatcher.dispatch(&record) {
            Ok(sent) => {
                self.stats.events_sent += sent as u64;
                LineOutcome::Processed { dispatched: true }
            }
            Err(e) => {
                error!("Failed to send event ({}) to riemann: {}", e.event, e.source);
                self.stats.dispatch_failures += 1;
                LineOutcome::Processed { dispatched: false }
            }
        }
    }

    fn skip(&mut self, e: LineError) -> LineOutcome {
        warn!("Skipping line: {}", e);
        self.stats.skipped += 1;
        LineOutcome::Skipped
    }

    /// Processes lines until the stream ends. A read error ends the run.
    pub fn run<R: BufRead>(&mut self, mut reader: R) -> Result<RunStats, TransportError> {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            let text = String::from_utf8_lossy(&buf);
            self.process_line(text.trim_end_matches(['\n', '\r']));
        }
        Ok(self.stats)
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }

    pub fn console(&self) -> &JsonSink<W> {
        &self.console
    }

    pub fn dispatcher(&self) -> &Dispatcher<S> {
        &self.dispatcher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;

    #[test]
    fn non_request_lines_are_ignored() {
        assert!(parse_request_line("HTTP/1.1 200 OK").unwrap().is_none());
        assert!(parse_request_line("").unwrap().is_none());
        assert!(parse_request_line("get /post?SN=1").unwrap().is_none());
    }

    #[test]
    fn payload_comes_from_second_token() {
        let vals = parse_request_line("GET /post?SN=01000123&V=1205 HTTP/1.1")
            .unwrap()
            .unwrap();
        assert_eq!(vals.get("SN"), "01000123");
        assert_eq!(vals.get("V"), "1205");
    }

    #[test]
    fn absolute_url_is_accepted() {
        let vals = parse_request_line("GET http://gem.local/post?SN=9 HTTP/1.1")
            .unwrap()
            .unwrap();
        assert_eq!(vals.get("SN"), "9");
    }

    #[test]
    fn bad_uri_is_a_line_error() {
        assert!(matches!(
            parse_request_line("GET post?SN=1 HTTP/1.1"),
            Err(LineError::Uri { .. })
        ));
        assert!(matches!(parse_request_line("GET "), Err(LineError::MissingUri)));
    }

    #[test]
    fn decode_error_converts_to_line_error() {
        let err: LineError = DecodeError::MissingField("SN").into();
        assert_eq!(err.to_string(), "No serial number found under 'SN' key");
    }
}
