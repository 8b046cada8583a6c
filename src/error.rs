use thiserror::Error;

use crate::telemetry::dispatch::MetricEvent;

/// A single field that could not be read. Absorbed during decoding.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    #[error("Parse error: {key}={value:?} is not a valid number")]
    Parse { key: String, value: String },

    #[error("Arity error: {key} has {found} comma-separated values, expected {expected}")]
    Arity {
        key: String,
        expected: usize,
        found: usize,
    },
}

impl FieldError {
    pub fn key(&self) -> &str {
        match self {
            FieldError::Parse { key, .. } | FieldError::Arity { key, .. } => key,
        }
    }
}

/// Conditions that discard a whole record.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("No serial number found under '{0}' key")]
    MissingField(&'static str),
}

/// Why an accepted line was skipped.
#[derive(Error, Debug)]
pub enum LineError {
    #[error("Request line carries no URI")]
    MissingUri,

    #[error("Failed to parse URI {uri:?}: {source}")]
    Uri {
        uri: String,
        #[source]
        source: url::ParseError,
    },

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encode error: {0}")]
    Encode(#[from] prost::EncodeError),

    #[error("Decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("Riemann rejected the message: {0}")]
    Rejected(String),

    #[error("Reply frame of {0} bytes exceeds the limit")]
    FrameTooLarge(usize),
}

/// The first event of a record that the sink did not accept.
#[derive(Error, Debug)]
#[error("Failed to send event {} to riemann: {source}", .event.service)]
pub struct DispatchError {
    pub event: MetricEvent,
    #[source]
    pub source: SinkError,
}

/// Failure of the byte stream feeding the pipeline. Ends the run.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}
