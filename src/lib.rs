//! Logger for a GEM energy monitor.
//!
//! The monitor writes HTTP-style request lines over its serial port, each
//! carrying one set of readings in the query string. [`telemetry::Pipeline`]
//! decodes every such line into a [`MeasurementRecord`], prints it as one
//! JSON line and pushes one Riemann event per channel through a
//! [`MetricSink`].

pub mod config;
pub mod devices;
pub mod error;
pub mod telemetry;

pub use config::{Config, RiemannProtocol};
pub use error::{DecodeError, DispatchError, FieldError, LineError, SinkError, TransportError};
pub use telemetry::data::{decode, MeasurementRecord};
pub use telemetry::dispatch::{Dispatcher, Metric, MetricEvent, MetricSink};
pub use telemetry::json::JsonSink;
pub use telemetry::payload::RawPayload;
pub use telemetry::{LineOutcome, Pipeline, RunStats};
