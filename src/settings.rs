//! Layered settings: built-in defaults, then an optional file (any format the
//! `config` crate understands, e.g. `arbor.toml`), then `ARBOR__`-style
//! environment variables such as `ARBOR__LOG__FILTER=debug`.

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::codec::{Codec, DEFAULT_CANDIDATES};
use crate::error::{ArborError, Result};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CodecSettings {
    /// Delimiter candidates in priority order.
    pub candidates: String,
}
impl Default for CodecSettings {
    fn default() -> Self {
        Self {
            candidates: String::from_utf8_lossy(DEFAULT_CANDIDATES).into_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// An `EnvFilter` directive, used when `RUST_LOG` is not set.
    pub filter: String,
}
impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub codec: CodecSettings,
    pub log: LogSettings,
}

impl Settings {
    /// Reads `file` when it exists; a missing file just leaves the defaults.
    pub fn load(file: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::with_name(path).required(false));
        }
        let settings = builder
            .add_source(Environment::with_prefix("ARBOR").separator("__"))
            .build()?
            .try_deserialize::<Settings>()?;
        Ok(settings)
    }
    pub fn codec(&self) -> Result<Codec> {
        Codec::new(self.codec.candidates.as_bytes().to_vec())
            .map_err(|e| ArborError::Config(format!("codec.candidates: {e}")))
    }
}
