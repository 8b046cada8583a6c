//! Expands a record into per-channel metric events and pushes them to the
//! metrics sink, one send per event.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::data::MeasurementRecord;
use crate::error::{DispatchError, SinkError};

pub type Attributes = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Metric {
    Int(i64),
    Float(f64),
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Int(v) => write!(f, "{v}"),
            Metric::Float(v) => write!(f, "{v}"),
        }
    }
}

/// One named measurement as the sink sees it. All events of a record share
/// one attribute map.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricEvent {
    pub service: String,
    pub host: String,
    pub metric: Metric,
    pub ttl: f32,
    pub attributes: Arc<Attributes>,
}

impl fmt::Display for MetricEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{host: {:?}, service: {}, metric: {}, ttl: {}}}",
            self.host, self.service, self.metric, self.ttl
        )
    }
}

/// Anything that accepts metric events one at a time.
pub trait MetricSink {
    fn send(&mut self, event: &MetricEvent) -> Result<(), SinkError>;
}

impl<S: MetricSink + ?Sized> MetricSink for &mut S {
    fn send(&mut self, event: &MetricEvent) -> Result<(), SinkError> {
        (**self).send(event)
    }
}

impl<S: MetricSink + ?Sized> MetricSink for Box<S> {
    fn send(&mut self, event: &MetricEvent) -> Result<(), SinkError> {
        (**self).send(event)
    }
}

pub struct Dispatcher<S: MetricSink> {
    sink: S,
    host: String,
    ttl: f32,
}

impl<S: MetricSink> Dispatcher<S> {
    pub fn new(sink: S, host: impl Into<String>, ttl: f32) -> Self {
        Self {
            sink,
            host: host.into(),
            ttl,
        }
    }

    /// Events for `record` in schema order: ch01..ch48, temp01..temp08,
    /// pulse01..pulse04.
    pub fn events(&self, record: &MeasurementRecord) -> Vec<MetricEvent> {
        let mut attrs = Attributes::new();
        attrs.insert("serial_number".to_string(), record.serial_number.clone());
        attrs.insert("seconds".to_string(), record.seconds.to_string());
        attrs.insert("volts".to_string(), record.volts.to_string());
        let attrs = Arc::new(attrs);

        let event = |prefix: &str, index: usize, metric: Metric| MetricEvent {
            service: format!("{}{:02}", prefix, index + 1),
            host: self.host.clone(),
            metric,
            ttl: self.ttl,
            attributes: Arc::clone(&attrs),
        };

        let watt_seconds = record
            .watt_seconds
            .iter()
            .enumerate()
            .map(|(i, ws)| event("ch", i, Metric::Int(*ws)));
        let temperatures = record
            .temperatures
            .iter()
            .enumerate()
            .map(|(i, t)| event("temp", i, Metric::Float(*t)));
        let pulses = record
            .pulses
            .iter()
            .enumerate()
            .map(|(i, p)| event("pulse", i, Metric::Int(*p)));

        watt_seconds.chain(temperatures).chain(pulses).collect()
    }

    /// Sends every event of `record` in order. Stops at the first event the
    /// sink refuses; the rest of the record is dropped. Returns the number
    /// of events sent.
    pub fn dispatch(&mut self, record: &MeasurementRecord) -> Result<usize, DispatchError> {
        let events = self.events(record);
        let total = events.len();
        for event in events {
            if let Err(source) = self.sink.send(&event) {
                return Err(DispatchError { event, source });
            }
        }
        debug!("Sent {} events for serial {}", total, record.serial_number);
        Ok(total)
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}
