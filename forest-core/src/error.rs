use thiserror::Error;

/// Errors raised while loading or parsing a forest configuration.
///
/// The generation and animation code never fails; only the text surfaces
/// (config files and the rule editor) can produce these.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("rule line {line}: {reason}")]
    Rule { line: usize, reason: String },

    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
