use aiconfig::exit;
use snafu::Snafu;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Unable to run '{} {}': {}", program, args.join(" "), source))]
    Spawn {
        program: String,
        args: Vec<String>,
        source: std::io::Error,
    },

    #[snafu(display(
        "'{} {}' failed (exit code {}): {}",
        program,
        args.join(" "),
        code.map(|c| c.to_string()).unwrap_or_else(|| "none".to_string()),
        stderr
    ))]
    CommandFailed {
        program: String,
        args: Vec<String>,
        code: Option<i32>,
        stderr: String,
    },

    #[snafu(display("Unknown operating system '{}', no PXE target for it", name))]
    UnknownOs { name: String },

    #[snafu(display("Kickstart file '{}' is not readable", path.display()))]
    Kickstart { path: PathBuf },

    #[snafu(display(
        "{} is not ready for PXE boot after {} attempts, last status:\n{}",
        fqdn,
        attempts,
        output
    ))]
    NotReady {
        fqdn: String,
        attempts: u32,
        output: String,
    },
}

impl Error {
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::UnknownOs { .. } | Error::Kickstart { .. } => exit::BAD_ARGUMENTS,
            _ => exit::FAILURE,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
