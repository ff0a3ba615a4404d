//! Human-readable durations in configuration ("300ms", "5s", "1m30s")

use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};
use std::{fmt, time::Duration};

pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let duration_str = humantime::format_duration(*duration).to_string();
    serializer.serialize_str(&duration_str)
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct DurationVisitor;

    impl<'de> Visitor<'de> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a duration as milliseconds (number) or human-readable string (e.g. '300ms', '5s')")
        }

        fn visit_u64<E>(self, millis: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_millis(millis))
        }

        fn visit_i64<E>(self, millis: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            u64::try_from(millis)
                .map(Duration::from_millis)
                .map_err(|_| de::Error::custom(format!("Negative duration: {millis}")))
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(value.trim())
                .map_err(|e| de::Error::custom(format!("Invalid duration '{value}': {e}")))
        }
    }

    deserializer.deserialize_any(DurationVisitor)
}
