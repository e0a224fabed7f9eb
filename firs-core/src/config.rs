//! Paths and algorithm choices for the render/sign pipeline.
use crate::invoice::{C14nMethod, UnmatchedPlaceholders};
use std::{
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;

/// Error returned when a configuration value cannot be used.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {input}")]
    Invalid { key: &'static str, input: String },
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Configuration of template, key material and signing options.
///
/// # Examples
/// ```rust
/// use firs_core::config::Config;
/// use firs_core::invoice::C14nMethod;
///
/// let config = Config::new("templates/invoice.xml", "private.pem").with_c14n(C14nMethod::Inclusive);
/// assert_eq!(config.c14n(), C14nMethod::Inclusive);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    template_path: PathBuf,
    private_key_path: PathBuf,
    certificate_path: Option<PathBuf>,
    c14n: C14nMethod,
    unmatched: UnmatchedPlaceholders,
}

impl Config {
    pub fn new(template_path: impl Into<PathBuf>, private_key_path: impl Into<PathBuf>) -> Self {
        Self {
            template_path: template_path.into(),
            private_key_path: private_key_path.into(),
            ..Self::default()
        }
    }

    /// Read `FIRS_TEMPLATE`, `FIRS_PRIVATE_KEY`, `FIRS_CERTIFICATE`,
    /// `FIRS_C14N` and `FIRS_UNMATCHED`, keeping defaults for unset ones.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(path) = lookup("FIRS_TEMPLATE") {
            config.template_path = path.into();
        }
        if let Some(path) = lookup("FIRS_PRIVATE_KEY") {
            config.private_key_path = path.into();
        }
        config.certificate_path = lookup("FIRS_CERTIFICATE")
            .filter(|path| !path.is_empty())
            .map(PathBuf::from);
        if let Some(value) = lookup("FIRS_C14N") {
            config.c14n = parse_value("FIRS_C14N", &value)?;
        }
        if let Some(value) = lookup("FIRS_UNMATCHED") {
            config.unmatched = parse_value("FIRS_UNMATCHED", &value)?;
        }
        Ok(config)
    }

    pub fn with_certificate(mut self, path: impl Into<PathBuf>) -> Self {
        self.certificate_path = Some(path.into());
        self
    }

    pub fn with_c14n(mut self, c14n: C14nMethod) -> Self {
        self.c14n = c14n;
        self
    }

    pub fn with_unmatched(mut self, unmatched: UnmatchedPlaceholders) -> Self {
        self.unmatched = unmatched;
        self
    }

    pub fn template_path(&self) -> &Path {
        &self.template_path
    }

    pub fn private_key_path(&self) -> &Path {
        &self.private_key_path
    }

    pub fn certificate_path(&self) -> Option<&Path> {
        self.certificate_path.as_deref()
    }

    pub fn c14n(&self) -> C14nMethod {
        self.c14n
    }

    pub fn unmatched(&self) -> UnmatchedPlaceholders {
        self.unmatched
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            template_path: PathBuf::from("./templates/invoice.xml"),
            private_key_path: PathBuf::from("./private.pem"),
            certificate_path: None,
            c14n: C14nMethod::default(),
            unmatched: UnmatchedPlaceholders::default(),
        }
    }
}

fn parse_value<T: FromStr>(key: &'static str, input: &str) -> Result<T, ConfigError> {
    input.parse().map_err(|_| ConfigError::Invalid {
        key,
        input: input.to_string(),
    })
}

/// Read a file into a string, reporting the path on failure.
pub(crate) fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}
