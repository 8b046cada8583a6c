use tracing::warn;

use super::payload::{self, RawPayload, PULSES_KEY, TEMPERATURES_KEY};
use crate::error::{DecodeError, FieldError};

pub const WATT_SECOND_CHANNELS: usize = 48;
pub const TEMPERATURE_CHANNELS: usize = 8;
pub const PULSE_CHANNELS: usize = 4;

/// Everything the monitor reported on one line.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRecord {
    pub seconds: i64,              // device uptime counter
    pub serial_number: String,
    pub volts: f64,
    pub watt_seconds: Vec<i64>,    // channels 1..=48
    pub temperatures: Vec<f64>,    // channels 1..=8
    pub pulses: Vec<i64>,          // channels 1..=4
    faults: Vec<FieldError>,
}

impl MeasurementRecord {
    /// Fields that failed to parse and were reported as zero.
    pub fn faults(&self) -> &[FieldError] {
        &self.faults
    }
}

/// Builds a record from one payload. A bad field is zeroed and decoding
/// carries on; only a missing serial number drops the record.
pub fn decode(vals: &RawPayload) -> Result<MeasurementRecord, DecodeError> {
    let mut faults = Vec::new();

    let serial_number = payload::serial_number(vals)?;
    let seconds = absorb(payload::seconds_counter(vals), &mut faults, 0);
    let volts = absorb(payload::volts(vals), &mut faults, 0.0);

    let watt_seconds: Vec<i64> = (1..=WATT_SECOND_CHANNELS)
        .map(|ch| absorb(payload::watt_second_count(vals, ch), &mut faults, 0))
        .collect();

    let temperatures = absorb(
        payload::csv_floats(vals, TEMPERATURES_KEY, TEMPERATURE_CHANNELS),
        &mut faults,
        vec![0.0; TEMPERATURE_CHANNELS],
    );
    let pulses = absorb(
        payload::csv_ints(vals, PULSES_KEY, PULSE_CHANNELS),
        &mut faults,
        vec![0; PULSE_CHANNELS],
    );

    Ok(MeasurementRecord {
        seconds,
        serial_number,
        volts,
        watt_seconds,
        temperatures,
        pulses,
        faults,
    })
}

fn absorb<T>(result: Result<T, FieldError>, faults: &mut Vec<FieldError>, zero: T) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            warn!("Reporting {} as zero: {}", e.key(), e);
            faults.push(e);
            zero
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A payload with every field present and well formed.
    pub(crate) fn full_payload() -> RawPayload {
        let mut pairs = vec![
            ("SC".to_string(), "86400".to_string()),
            ("SN".to_string(), "01000123".to_string()),
            ("V".to_string(), "1205".to_string()),
            ("T".to_string(), "20.5,21.0,22.25,23.0,24.0,25.5,26.0,27.75".to_string()),
            ("PL".to_string(), "1,2,3,4".to_string()),
        ];
        for ch in 1..=WATT_SECOND_CHANNELS {
            pairs.push((format!("c{ch}"), (ch * 1000).to_string()));
        }
        pairs.into_iter().collect()
    }

    fn without(key: &str, replacement: Option<&str>) -> RawPayload {
        let base = full_payload();
        let mut pairs: Vec<(String, String)> = Vec::new();
        for k in ["SC", "SN", "V", "T", "PL"] {
            if k != key {
                pairs.push((k.to_string(), base.get(k).to_string()));
            }
        }
        for ch in 1..=WATT_SECOND_CHANNELS {
            let k = format!("c{ch}");
            if k != key {
                let v = base.get(&k).to_string();
                pairs.push((k, v));
            }
        }
        if let Some(value) = replacement {
            pairs.push((key.to_string(), value.to_string()));
        }
        pairs.into_iter().collect()
    }

    #[test]
    fn decodes_full_payload() {
        let record = decode(&full_payload()).unwrap();
        assert_eq!(record.seconds, 86400);
        assert_eq!(record.serial_number, "01000123");
        assert_eq!(record.volts, 120.5);
        assert_eq!(record.watt_seconds.len(), WATT_SECOND_CHANNELS);
        assert_eq!(record.watt_seconds[0], 1000);
        assert_eq!(record.watt_seconds[47], 48000);
        assert_eq!(
            record.temperatures,
            vec![20.5, 21.0, 22.25, 23.0, 24.0, 25.5, 26.0, 27.75]
        );
        assert_eq!(record.pulses, vec![1, 2, 3, 4]);
        assert!(record.faults().is_empty());
    }

    #[test]
    fn missing_serial_number_drops_record() {
        assert_eq!(
            decode(&without("SN", None)),
            Err(DecodeError::MissingField("SN"))
        );
        assert_eq!(
            decode(&without("SN", Some(""))),
            Err(DecodeError::MissingField("SN"))
        );
    }

    #[test]
    fn non_finite_readings_are_zeroed() {
        let vals = without("V", Some("NaN"));
        let record = decode(&vals).unwrap();
        assert_eq!(record.volts, 0.0);
        assert_eq!(record.faults()[0].key(), "V");

        let record = decode(&without("T", Some("inf,2,3,4,5,6,7,8"))).unwrap();
        assert_eq!(record.temperatures, vec![0.0; TEMPERATURE_CHANNELS]);
        assert!(record.temperatures.iter().all(|t| t.is_finite()));
    }

    #[test]
    fn bad_channel_is_zeroed_and_others_kept() {
        let record = decode(&without("c7", Some("12x"))).unwrap();
        assert_eq!(record.watt_seconds[6], 0);
        assert_eq!(record.watt_seconds[5], 6000);
        assert_eq!(record.watt_seconds[7], 8000);
        assert_eq!(record.faults().len(), 1);
        assert_eq!(record.faults()[0].key(), "c7");
    }

    #[test]
    fn short_temperature_list_keeps_arity() {
        let record = decode(&without("T", Some("1.0,2.0,3.0,4.0,5.0,6.0"))).unwrap();
        assert_eq!(record.temperatures, vec![0.0; TEMPERATURE_CHANNELS]);
        assert_eq!(record.pulses, vec![1, 2, 3, 4]);
        assert!(matches!(
            record.faults(),
            [FieldError::Arity { expected: 8, found: 6, .. }]
        ));
    }

    #[test]
    fn bad_scalars_are_zeroed() {
        let record = decode(&without("V", Some("??"))).unwrap();
        assert_eq!(record.volts, 0.0);
        let record = decode(&without("SC", None)).unwrap();
        assert_eq!(record.seconds, 0);
        assert_eq!(record.faults()[0].key(), "SC");
    }
}
