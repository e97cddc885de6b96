//! Wire encodings shared by every record type.
//!
//! Timestamps are stored as `YYYY-MM-DDTHH:MM:SS.mmmZ` strings. The fixed width keeps the
//! lexicographic order of the stored strings identical to their chronological order, which
//! the SQLite backend relies on when it sorts inside `json_extract`.

use std::fmt;

use serde::{de, ser, Deserialize, Deserializer, Serializer};
use time::{format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime, UtcOffset};

/// Largest integer an `f64` holds exactly.
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

pub fn now() -> OffsetDateTime {
    truncate_millis(OffsetDateTime::now_utc())
}

pub fn to_millis(ts: OffsetDateTime) -> i64 {
    (ts.unix_timestamp_nanos() / 1_000_000) as i64
}

pub fn from_millis(millis: i64) -> Result<OffsetDateTime, String> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
        .map_err(|e| format!("timestamp out of range: {}", e))
}

fn truncate_millis(ts: OffsetDateTime) -> OffsetDateTime {
    from_millis(to_millis(ts)).unwrap_or(ts)
}

pub fn format_timestamp(ts: OffsetDateTime) -> Result<String, String> {
    ts.to_offset(UtcOffset::UTC)
        .format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
        ))
        .map_err(|e| format!("cannot format timestamp: {}", e))
}

/// Accepts RFC 3339 timestamps and bare calendar dates (read as midnight UTC).
pub fn parse_timestamp(raw: &str) -> Result<OffsetDateTime, String> {
    let raw = raw.trim();
    if let Ok(ts) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(truncate_millis(ts.to_offset(UtcOffset::UTC)));
    }
    parse_calendar_date(raw)
        .map(|d| d.midnight().assume_utc())
        .ok_or_else(|| format!("invalid timestamp: {:?}", raw))
}

fn parse_calendar_date(raw: &str) -> Option<Date> {
    Date::parse(raw, format_description!("[year]-[month]-[day]")).ok()
}

/// Day bucket of a canonical timestamp string.
pub fn day_key(canonical: &str) -> Option<&str> {
    canonical.get(..10)
}

struct Timestamp(OffsetDateTime);

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct Visitor;

        impl<'de> de::Visitor<'de> for Visitor {
            type Value = Timestamp;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a date string or milliseconds since the epoch")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Timestamp, E> {
                parse_timestamp(v).map(Timestamp).map_err(E::custom)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Timestamp, E> {
                from_millis(v).map(Timestamp).map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Timestamp, E> {
                let millis = i64::try_from(v).map_err(E::custom)?;
                self.visit_i64(millis)
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Timestamp, E> {
                self.visit_i64(v as i64)
            }
        }

        deserializer.deserialize_any(Visitor)
    }
}

struct Numeric(f64);

impl<'de> Deserialize<'de> for Numeric {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct Visitor;

        impl<'de> de::Visitor<'de> for Visitor {
            type Value = Numeric;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a number")
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Numeric, E> {
                Ok(Numeric(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Numeric, E> {
                Ok(Numeric(v as f64))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Numeric, E> {
                Ok(Numeric(v as f64))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Numeric, E> {
                match v.trim().parse::<f64>() {
                    Ok(n) if n.is_finite() => Ok(Numeric(n)),
                    _ => Err(E::custom(format!("invalid number: {:?}", v))),
                }
            }
        }

        deserializer.deserialize_any(Visitor)
    }
}

fn serialize_number<S: Serializer>(v: f64, serializer: S) -> Result<S::Ok, S::Error> {
    if v.fract() == 0.0 && v.abs() <= MAX_EXACT_INT {
        serializer.serialize_i64(v as i64)
    } else {
        serializer.serialize_f64(v)
    }
}

pub mod timestamp {
    use super::*;

    pub fn serialize<S: Serializer>(ts: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_timestamp(*ts).map_err(<S::Error as ser::Error>::custom)?)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<OffsetDateTime, D::Error> {
        Timestamp::deserialize(deserializer).map(|t| t.0)
    }

    pub mod option {
        use super::super::*;

        pub fn serialize<S: Serializer>(ts: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error> {
            match ts {
                Some(ts) => serializer.serialize_some(&format_timestamp(*ts).map_err(<S::Error as ser::Error>::custom)?),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error> {
            Option::<Timestamp>::deserialize(deserializer).map(|t| t.map(|t| t.0))
        }
    }
}

pub mod numeric {
    use super::*;

    pub fn serialize<S: Serializer>(v: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_number(*v, serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Numeric::deserialize(deserializer).map(|n| n.0)
    }

    pub mod option {
        use super::super::*;

        pub fn serialize<S: Serializer>(v: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
            match v {
                Some(v) => serialize_number(*v, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
            Option::<Numeric>::deserialize(deserializer).map(|n| n.map(|n| n.0))
        }
    }
}
