use aiconfig::exit;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub(crate) enum Error {
    #[snafu(display("Logger setup error: {}", source))]
    Logger { source: log::SetLoggerError },

    #[snafu(display("{}", source))]
    Config { source: aiconfig::Error },

    #[snafu(display("{}", source))]
    Kerberos { source: aienv::krb5::Error },

    #[snafu(display("{}", source))]
    Pwn { source: aiclients::Error },

    #[snafu(display("No owners given"))]
    NoOwners,
}

impl Error {
    pub(crate) fn exit_code(&self) -> i32 {
        match self {
            Error::Logger { .. } => exit::FAILURE,
            Error::Config { source } => source.exit_code(),
            Error::Kerberos { source } => source.exit_code(),
            Error::Pwn { source } => source.exit_code(),
            Error::NoOwners => exit::BAD_ARGUMENTS,
        }
    }
}

pub(crate) type Result<T> = std::result::Result<T, Error>;
