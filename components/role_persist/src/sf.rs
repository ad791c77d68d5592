use std::{fmt, num::NonZeroU64, str::FromStr};

/// Platform identifier for parties, users and roles.
///
/// Snowflakes are opaque here, only their identity matters. They are stored as `INT8`
/// and serialized as strings in human-readable formats to survive JSON number precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Snowflake(pub NonZeroU64);

pub type PartyId = Snowflake;
pub type UserId = Snowflake;
pub type RoleId = Snowflake;

impl Snowflake {
    #[inline]
    pub const fn new(id: u64) -> Option<Snowflake> {
        match NonZeroU64::new(id) {
            Some(id) => Some(Snowflake(id)),
            None => None,
        }
    }

    #[inline]
    pub const fn from_i64(id: i64) -> Option<Snowflake> {
        Snowflake::new(id as u64)
    }

    #[inline(always)]
    pub const fn to_u64(self) -> u64 {
        self.0.get()
    }

    #[inline(always)]
    pub const fn to_i64(self) -> i64 {
        self.0.get() as i64
    }
}

impl FromStr for Snowflake {
    type Err = <NonZeroU64 as FromStr>::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NonZeroU64::from_str(s).map(Snowflake)
    }
}

impl fmt::Display for Snowflake {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

mod pg_impl {
    use super::*;

    use std::error::Error;

    use bytes::BytesMut;
    use postgres_types::{accepts, to_sql_checked, FromSql, IsNull, ToSql, Type};

    impl<'a> FromSql<'a> for Snowflake {
        #[inline]
        fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
            let raw = <i64 as FromSql<'a>>::from_sql(ty, raw)?;

            Snowflake::from_i64(raw).ok_or_else(|| "Snowflake cannot be zero".into())
        }

        accepts!(INT8);
    }

    impl ToSql for Snowflake {
        #[inline]
        fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>>
        where
            Self: Sized,
        {
            self.to_i64().to_sql(ty, out)
        }

        accepts!(INT8);
        to_sql_checked!();
    }
}

mod serde_impl {
    use super::*;

    use serde::de::{Deserialize, Deserializer, Error, Visitor};
    use serde::ser::{Serialize, Serializer};

    impl Serialize for Snowflake {
        fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            if serializer.is_human_readable() {
                serializer.collect_str(self)
            } else {
                self.0.serialize(serializer)
            }
        }
    }

    impl<'de> Deserialize<'de> for Snowflake {
        fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where
            D: Deserializer<'de>,
        {
            struct SnowflakeVisitor;

            impl<'de> Visitor<'de> for SnowflakeVisitor {
                type Value = Snowflake;

                fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str("a non-zero 64-bit integer or numeric string")
                }

                fn visit_u64<E: Error>(self, v: u64) -> Result<Self::Value, E> {
                    Snowflake::new(v).ok_or_else(|| E::custom("expected a non-zero value"))
                }

                fn visit_i64<E: Error>(self, v: i64) -> Result<Self::Value, E> {
                    match u64::try_from(v) {
                        Ok(v) => self.visit_u64(v),
                        Err(_) => Err(E::custom("expected a positive value")),
                    }
                }

                fn visit_str<E: Error>(self, v: &str) -> Result<Self::Value, E> {
                    Snowflake::from_str(v).map_err(|e| E::custom(format!("Invalid Snowflake: {e}")))
                }
            }

            deserializer.deserialize_any(SnowflakeVisitor)
        }
    }
}
