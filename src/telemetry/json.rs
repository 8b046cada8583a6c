use std::io::{self, Write};

use chrono::{Local, SecondsFormat};
use serde::ser::{Serialize, SerializeMap, Serializer};

use super::data::MeasurementRecord;

/// A record plus its capture time, serialized as one flat JSON object:
/// `timestamp, seconds, serial_number, volts, ch01.., temp01.., pulse01..`.
pub struct JsonRecord<'a> {
    pub timestamp: &'a str,
    pub record: &'a MeasurementRecord,
}

impl Serialize for JsonRecord<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let r = self.record;
        let len = 4 + r.watt_seconds.len() + r.temperatures.len() + r.pulses.len();
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("timestamp", self.timestamp)?;
        map.serialize_entry("seconds", &r.seconds)?;
        map.serialize_entry("serial_number", &r.serial_number)?;
        map.serialize_entry("volts", &r.volts)?;
        for (i, ws) in r.watt_seconds.iter().enumerate() {
            map.serialize_entry(&format!("ch{:02}", i + 1), ws)?;
        }
        for (i, temp) in r.temperatures.iter().enumerate() {
            map.serialize_entry(&format!("temp{:02}", i + 1), temp)?;
        }
        for (i, pulse) in r.pulses.iter().enumerate() {
            map.serialize_entry(&format!("pulse{:02}", i + 1), pulse)?;
        }
        map.end()
    }
}

/// RFC 3339 local time, second precision.
pub fn capture_timestamp() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Writes one JSON line per record to the console stream.
pub struct JsonSink<W: Write> {
    out: W,
}

impl<W: Write> JsonSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn emit(&mut self, record: &MeasurementRecord) -> io::Result<()> {
        let timestamp = capture_timestamp();
        self.emit_at(record, &timestamp)
    }

    pub fn emit_at(&mut self, record: &MeasurementRecord, timestamp: &str) -> io::Result<()> {
        let mut line = serde_json::to_vec(&JsonRecord { timestamp, record })?;
        line.push(b'\n');
        self.out.write_all(&line)?;
        self.out.flush()
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
