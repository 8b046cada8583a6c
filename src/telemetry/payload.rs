//! Query-string payload of one monitor line and the extractors that read
//! typed values out of it.

use std::collections::HashMap;
use std::str::FromStr;

use url::{form_urlencoded, Url};

use crate::error::{DecodeError, FieldError};

pub const SECONDS_KEY: &str = "SC";
pub const SERIAL_NUMBER_KEY: &str = "SN";
pub const VOLTS_KEY: &str = "V";
pub const TEMPERATURES_KEY: &str = "T";
pub const PULSES_KEY: &str = "PL";

/// Key/value pairs from a line's query component. A key may repeat; lookups
/// see the first value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPayload {
    values: HashMap<String, Vec<String>>,
}

impl RawPayload {
    /// Pairs from the query of `url`. A `#` in the query is data, not a
    /// fragment delimiter, so any fragment is folded back into the query.
    pub fn from_url(url: &Url) -> Self {
        let query = match (url.query(), url.fragment()) {
            (Some(q), Some(f)) => format!("{q}#{f}"),
            (Some(q), None) => q.to_string(),
            (None, _) => return Self::default(),
        };
        form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    /// First value stored under `key`, or the empty string.
    pub fn get(&self, key: &str) -> &str {
        self.values
            .get(key)
            .and_then(|vals| vals.first())
            .map(String::as_str)
            .unwrap_or("")
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawPayload {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut values: HashMap<String, Vec<String>> = HashMap::new();
        for (k, v) in iter {
            values.entry(k.into()).or_default().push(v.into());
        }
        Self { values }
    }
}

fn parse_field<T: FromStr>(key: &str, raw: &str) -> Result<T, FieldError> {
    raw.parse::<T>().map_err(|_| FieldError::Parse {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

/// Device-side seconds counter under `SC`.
pub fn seconds_counter(payload: &RawPayload) -> Result<i64, FieldError> {
    parse_field(SECONDS_KEY, payload.get(SECONDS_KEY))
}

/// Device serial number under `SN`. Every emitted metric is keyed on it, so
/// an empty value is a record-level failure.
pub fn serial_number(payload: &RawPayload) -> Result<String, DecodeError> {
    let serial = payload.get(SERIAL_NUMBER_KEY);
    if serial.is_empty() {
        return Err(DecodeError::MissingField(SERIAL_NUMBER_KEY));
    }
    Ok(serial.to_string())
}

/// Like `parse_field`, but `NaN` and infinities are rejected: they are
/// line noise, not readings, and have no JSON form.
fn parse_finite(key: &str, raw: &str) -> Result<f64, FieldError> {
    match parse_field::<f64>(key, raw)? {
        v if v.is_finite() => Ok(v),
        _ => Err(FieldError::Parse {
            key: key.to_string(),
            value: raw.to_string(),
        }),
    }
}

/// Line voltage. The monitor sends tenths of a volt under `V`.
pub fn volts(payload: &RawPayload) -> Result<f64, FieldError> {
    let volts_times_10 = parse_finite(VOLTS_KEY, payload.get(VOLTS_KEY))?;
    Ok(volts_times_10 / 10.0)
}

/// Watt-second counter of channel `channel` (1-based) under `c{channel}`.
pub fn watt_second_count(payload: &RawPayload, channel: usize) -> Result<i64, FieldError> {
    let key = format!("c{channel}");
    let raw = payload.get(&key);
    parse_field(&key, raw)
}

pub fn csv_floats(payload: &RawPayload, key: &str, count: usize) -> Result<Vec<f64>, FieldError> {
    csv_values(payload, key, count, parse_finite)
}

pub fn csv_ints(payload: &RawPayload, key: &str, count: usize) -> Result<Vec<i64>, FieldError> {
    csv_values(payload, key, count, parse_field::<i64>)
}

/// Splits the value under `key` into at most `count` fields. Anything past
/// the last expected comma stays in the final field.
fn csv_values<T>(
    payload: &RawPayload,
    key: &str,
    count: usize,
    parse: fn(&str, &str) -> Result<T, FieldError>,
) -> Result<Vec<T>, FieldError> {
    let fields: Vec<&str> = payload.get(key).splitn(count, ',').collect();
    if fields.len() < count {
        return Err(FieldError::Arity {
            key: key.to_string(),
            expected: count,
            found: fields.len(),
        });
    }

    let mut values = Vec::with_capacity(count);
    for field in fields {
        values.push(parse(key, field)?);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(pairs: &[(&str, &str)]) -> RawPayload {
        pairs.iter().copied().collect()
    }

    #[test]
    fn query_pairs_are_url_decoded() {
        let url = Url::parse("http://gem/post?SN=01%2042&V=1205&SN=second").unwrap();
        let vals = RawPayload::from_url(&url);
        assert_eq!(vals.get("SN"), "01 42");
        assert_eq!(vals.get("V"), "1205");
        assert_eq!(vals.get("missing"), "");
    }

    #[test]
    fn hash_in_query_is_kept_in_value() {
        let url = Url::parse("http://gem/post?V=1205&SN=1#x").unwrap();
        let vals = RawPayload::from_url(&url);
        assert_eq!(vals.get("SN"), "1#x");
        assert_eq!(vals.get("V"), "1205");

        let url = Url::parse("http://gem/post#SN=1").unwrap();
        assert_eq!(RawPayload::from_url(&url), RawPayload::default());
    }

    #[test]
    fn seconds_counter_parses_or_fails() {
        assert_eq!(seconds_counter(&payload(&[("SC", "123456")])), Ok(123456));
        assert_eq!(
            seconds_counter(&payload(&[("SC", "12a")])),
            Err(FieldError::Parse { key: "SC".into(), value: "12a".into() })
        );
        assert!(seconds_counter(&RawPayload::default()).is_err());
    }

    #[test]
    fn serial_number_is_required() {
        assert_eq!(serial_number(&payload(&[("SN", "01000123")])).unwrap(), "01000123");
        assert_eq!(
            serial_number(&payload(&[("SN", "")])),
            Err(DecodeError::MissingField("SN"))
        );
        assert_eq!(
            serial_number(&RawPayload::default()),
            Err(DecodeError::MissingField("SN"))
        );
    }

    #[test]
    fn volts_are_scaled_down_by_ten() {
        assert_eq!(volts(&payload(&[("V", "1205")])), Ok(120.5));
        assert_eq!(volts(&payload(&[("V", "2400")])), Ok(240.0));
        assert!(matches!(
            volts(&payload(&[("V", "high")])),
            Err(FieldError::Parse { .. })
        ));
    }

    #[test]
    fn non_finite_volts_are_rejected() {
        for raw in ["NaN", "inf", "-infinity"] {
            assert_eq!(
                volts(&payload(&[("V", raw)])),
                Err(FieldError::Parse { key: "V".into(), value: raw.into() })
            );
        }
    }

    #[test]
    fn non_finite_temperature_is_rejected() {
        let vals = payload(&[("T", "inf,2,3,4,5,6,7,8")]);
        assert_eq!(
            csv_floats(&vals, "T", 8),
            Err(FieldError::Parse { key: "T".into(), value: "inf".into() })
        );
        let vals = payload(&[("T", "1,2,3,4,5,6,7,NaN")]);
        assert!(matches!(csv_floats(&vals, "T", 8), Err(FieldError::Parse { .. })));
    }

    #[test]
    fn watt_seconds_use_unpadded_channel_keys() {
        let vals = payload(&[("c1", "1000"), ("c12", "77"), ("c01", "5")]);
        assert_eq!(watt_second_count(&vals, 1), Ok(1000));
        assert_eq!(watt_second_count(&vals, 12), Ok(77));
        let err = watt_second_count(&vals, 2).unwrap_err();
        assert_eq!(err.key(), "c2");
    }

    #[test]
    fn csv_floats_reads_all_temperatures() {
        let vals = payload(&[("T", "1.0,2.0,3.0,4.0,5.0,6.0,7.0,8.0")]);
        assert_eq!(
            csv_floats(&vals, "T", 8).unwrap(),
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]
        );
    }

    #[test]
    fn short_csv_is_an_arity_error() {
        let vals = payload(&[("T", "1.0,2.0,3.0,4.0,5.0,6.0")]);
        assert_eq!(
            csv_floats(&vals, "T", 8),
            Err(FieldError::Arity { key: "T".into(), expected: 8, found: 6 })
        );
        assert!(matches!(
            csv_ints(&RawPayload::default(), "PL", 4),
            Err(FieldError::Arity { found: 1, .. })
        ));
    }

    #[test]
    fn extra_commas_stay_in_last_field() {
        let vals = payload(&[("PL", "1,2,3,4,5")]);
        assert_eq!(
            csv_ints(&vals, "PL", 4),
            Err(FieldError::Parse { key: "PL".into(), value: "4,5".into() })
        );
    }

    #[test]
    fn csv_ints_rejects_non_numeric_entry() {
        let vals = payload(&[("PL", "10,x,30,40")]);
        assert!(matches!(csv_ints(&vals, "PL", 4), Err(FieldError::Parse { .. })));
        let vals = payload(&[("PL", "10,20,30,40")]);
        assert_eq!(csv_ints(&vals, "PL", 4).unwrap(), vec![10, 20, 30, 40]);
    }
}
