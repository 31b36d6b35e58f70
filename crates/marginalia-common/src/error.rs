//! Error types for marginalia-common.

use std::path::PathBuf;

use miette::Diagnostic;

/// Reading, writing or (de)serializing a configuration file failed.
#[derive(thiserror::Error, Debug, Diagnostic)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("could not access config file {}", path.display())]
    #[diagnostic(code(marginalia::config::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported config format for {}", path.display())]
    #[diagnostic(
        code(marginalia::config::format),
        help("use a .json or .toml file")
    )]
    UnsupportedFormat { path: PathBuf },

    #[error(transparent)]
    #[diagnostic(code(marginalia::config::json))]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    #[diagnostic(code(marginalia::config::toml))]
    TomlDe(#[from] toml::de::Error),

    #[error(transparent)]
    #[diagnostic(code(marginalia::config::toml))]
    TomlSer(#[from] toml::ser::Error),
}
