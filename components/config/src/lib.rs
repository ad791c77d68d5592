pub extern crate paste;
pub extern crate serde;
pub extern crate tracing;

use std::path::Path;

pub mod general;
pub mod util;

/// Declares a configuration section with defaults and optional environment overrides.
///
/// ```ignore
/// config::section! {
///     pub struct Database {
///         /// Database connection string
///         pub db_str: String = "postgresql://localhost".to_owned() => "DB_STR",
///     }
/// }
/// ```
///
/// An override may pass the raw value through a parser, `=> "ENV" | parse[default]`,
/// otherwise the string is converted with `Into`.
#[macro_export]
macro_rules! section {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {$(
            $(#[$field_meta:meta])*
            $field_vis:vis $field_name:ident : $field_ty:ty = $field_default:expr
                $(=> $field_env:literal
                    $(| $func:path
                        $([  $($param:expr),* ])?
                    )?
                )?
        ),*$(,)?}

        $(impl Extra { $($extra:tt)+ })?
    ) => { $crate::paste::paste! {
        #[derive(Debug, $crate::serde::Deserialize)]
        $(#[$meta])*
        #[serde(deny_unknown_fields)]
        $vis struct $name {$(
            $(#[$field_meta])*
            $(
                #[doc = ""]
                #[doc = "**Overridden by the `" $field_env "` environment variable.**"]
            )?
            $field_vis $field_name: $field_ty,
        )*}

        impl Default for $name {
            #[inline]
            fn default() -> Self {
                $name {$(
                    $field_name: $field_default,
                )*}
            }
        }

        impl $crate::ConfigExtra for $name {
            $($($extra)+)?
        }

        impl $crate::Configuration for $name {
            fn configure(&mut self) {
                $($(
                    if let Ok(value) = std::env::var($field_env) {
                        $crate::tracing::debug!("Applying environment overwrite for {}.{}=>{}", stringify!($name), stringify!($field_name), $field_env);
                        self.$field_name = ($($func(&value $( $(,$param)* )? ),)? value , ).0.into();
                    }
                )?)*

                $crate::ConfigExtra::configure(self);
            }
        }
    }};
}

/// Declares the top-level configuration as a set of sections.
#[macro_export]
macro_rules! config {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {$(
            $(#[$field_meta:meta])*
            $field:ident: $field_ty:ty
        ),*$(,)?}
    ) => {
        $(#[$meta])*
        #[derive(Default, Debug, $crate::serde::Deserialize)]
        #[serde(deny_unknown_fields, default)]
        $vis struct $name {
            $($(#[$field_meta])* pub $field: $field_ty,)*
        }

        impl $crate::Configuration for $name {
            fn configure(&mut self) {
                $($crate::Configuration::configure(&mut self.$field);)*
            }
        }
    };
}

pub trait ConfigExtra: Configuration {
    fn configure(&mut self) {}
}

pub trait Configuration: serde::de::DeserializeOwned {
    /// Applies any environmental overrides and adjustments
    fn configure(&mut self);
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("Parse Error: {0}")]
    ParseError(#[from] toml::de::Error),
}

impl ConfigError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ConfigError::IOError(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Parses a TOML configuration, without applying environment overrides.
pub fn parse<C: Configuration>(toml: &str) -> Result<C, ConfigError> {
    Ok(toml::from_str(toml)?)
}

/// Loads a TOML configuration file, then applies environment overrides.
///
/// A missing file is not an error if `allow_missing` is set, and yields the defaults instead.
pub async fn load<C: Configuration + Default>(path: &Path, allow_missing: bool) -> Result<C, ConfigError> {
    let mut config: C = match tokio::fs::read_to_string(path).await {
        Ok(file) => parse(&file)?,
        Err(e) if allow_missing && e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!("Config file {} not found, using defaults", path.display());
            C::default()
        }
        Err(e) => return Err(e.into()),
    };

    config.configure();

    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    crate::section! {
        #[serde(default)]
        pub struct Polling {
            #[serde(with = "crate::util::duration")]
            pub interval: Duration = Duration::from_secs(1) => "CONFIG_TEST_POLL_INTERVAL" | crate::util::parse_duration[Duration::from_secs(1)],
            pub name: String = "keeper".to_owned() => "CONFIG_TEST_POLL_NAME",
            pub batch: u32 = 64 => "CONFIG_TEST_POLL_BATCH" | crate::util::parse[64u32],
        }
    }

    crate::config! {
        pub struct TestConfig {
            polling: Polling,
        }
    }

    use crate::Configuration;

    #[test]
    fn env_overrides_apply() {
        std::env::set_var("CONFIG_TEST_POLL_INTERVAL", "250ms");
        std::env::set_var("CONFIG_TEST_POLL_NAME", "other");
        std::env::set_var("CONFIG_TEST_POLL_BATCH", "not a number");

        let mut config = TestConfig::default();
        config.configure();

        assert_eq!(config.polling.interval, Duration::from_millis(250));
        assert_eq!(config.polling.name, "other");
        assert_eq!(config.polling.batch, 64);
    }

    #[test]
    fn toml_sections_parse_with_defaults() {
        let config: TestConfig = crate::parse("[polling]\nbatch = 10\n").unwrap();

        assert_eq!(config.polling.batch, 10);
        assert_eq!(config.polling.interval, Duration::from_secs(1));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(crate::parse::<TestConfig>("[polling]\nbogus = 1\n").is_err());
    }

    #[tokio::test]
    async fn missing_file_yields_defaults() {
        let config: TestConfig = crate::load("./does/not/exist.toml".as_ref(), true).await.unwrap();
        assert_eq!(config.polling.batch, 64);

        let err = crate::load::<TestConfig>("./does/not/exist.toml".as_ref(), false).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
