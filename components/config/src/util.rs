use serde::de::{self, Deserializer};
use serde::ser::{Serialize, SerializeSeq, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub fn parse<T: FromStr>(s: &str, default: T) -> T {
    s.parse().unwrap_or(default)
}

/// Parses a human-readable duration such as `250ms` or `7days`
pub fn parse_duration(s: &str, default: Duration) -> Duration {
    match humantime::parse_duration(s.trim()) {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!("Invalid duration {s:?}, using {default:?}: {e}");
            default
        }
    }
}

/// Parses a comma-separated list, skipping (and logging) any invalid entries
pub fn parse_list<T: FromStr>(s: &str) -> Vec<T>
where
    T::Err: fmt::Display,
{
    s.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .filter_map(|item| match item.parse() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Skipping invalid list entry {item:?}: {e}");
                None
            }
        })
        .collect()
}

pub mod duration {
    use serde::de::SeqAccess;

    use super::*;

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = value.as_secs();
        let ns = value.subsec_nanos();

        if ns == 0 {
            return s.serialize(serializer);
        }

        let mut seq = serializer.serialize_seq(Some(2))?;
        seq.serialize_element(&s)?;
        seq.serialize_element(&ns)?;
        seq.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct Visitor;

        impl<'de> de::Visitor<'de> for Visitor {
            type Value = Duration;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("whole seconds, [seconds, nanoseconds] or a duration string like \"250ms\"")
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<Duration, E> {
                Ok(Duration::from_secs(value))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<Duration, E> {
                match u64::try_from(value) {
                    Ok(value) => self.visit_u64(value),
                    Err(_) => Err(E::custom("Negative integer")),
                }
            }

            fn visit_seq<S: SeqAccess<'de>>(self, mut value: S) -> Result<Duration, S::Error> {
                let Some(seconds) = value.next_element::<u64>()? else {
                    return Err(de::Error::custom("Missing seconds value"));
                };

                Ok(Duration::new(seconds, value.next_element::<u32>()?.unwrap_or(0)))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                humantime::parse_duration(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(Visitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_list_skips_invalid_entries() {
        assert_eq!(parse_list::<u64>("1, 2,,x,3 "), vec![1, 2, 3]);
        assert!(parse_list::<u64>("").is_empty());
    }

    #[test]
    fn parse_duration_falls_back() {
        assert_eq!(parse_duration("2s", Duration::ZERO), Duration::from_secs(2));
        assert_eq!(parse_duration("soon", Duration::from_secs(9)), Duration::from_secs(9));
    }

    #[test]
    fn duration_deserializes_from_strings_and_numbers() {
        #[derive(serde::Deserialize)]
        struct D {
            #[serde(with = "super::duration")]
            d: Duration,
        }

        let d: D = toml::from_str("d = \"7days\"").unwrap();
        assert_eq!(d.d, Duration::from_secs(7 * 24 * 60 * 60));

        let d: D = toml::from_str("d = 30").unwrap();
        assert_eq!(d.d, Duration::from_secs(30));

        let d: D = toml::from_str("d = [1, 500]").unwrap();
        assert_eq!(d.d, Duration::new(1, 500));
    }
}
