use crate::exit;
use snafu::Snafu;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Unable to read configuration file '{}': {}", path.display(), source))]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Unable to parse configuration file '{}': {}", path.display(), source))]
    ConfigParse {
        path: PathBuf,
        source: ini::ParseError,
    },

    #[snafu(display("Option '{}' is not defined in section '{}' or its defaults", key, section))]
    MissingOption { section: String, key: String },

    #[snafu(display("Option '{}' in section '{}' is not a boolean: '{}'", key, section, value))]
    InvalidBool {
        section: String,
        key: String,
        value: String,
    },

    #[snafu(display(
        "Option '{}' in section '{}' has invalid value '{}': {}",
        key,
        section,
        value,
        reason
    ))]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
}

impl Error {
    /// Process exit code a tool should use when this error ends the run.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::ConfigRead { .. } | Error::ConfigParse { .. } => exit::CONFIG_UNREADABLE,
            _ => exit::FAILURE,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
