use aiconfig::exit;
use reqwest::StatusCode;
use snafu::Snafu;
use std::fmt;
use std::path::PathBuf;
use url::Url;

/// Coarse classification shared by every client error, used by callers to decide between
/// retrying, reporting, and choosing an exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Connection,
    Timeout,
    InternalServerError,
    Unauthorized,
    NotFound,
    NotAllowed,
    NotImplemented,
    AlreadyExists,
    InvalidInput,
    UnexpectedResponse,
    Init,
}

impl ErrorKind {
    /// Connection failures and timeouts may succeed if the caller tries again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Connection | ErrorKind::Timeout)
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::InvalidInput => exit::BAD_ARGUMENTS,
            _ => exit::FAILURE,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Connection => "connection error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::InternalServerError => "internal server error",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::NotFound => "not found",
            ErrorKind::NotAllowed => "not allowed",
            ErrorKind::NotImplemented => "not implemented",
            ErrorKind::AlreadyExists => "already exists",
            ErrorKind::InvalidInput => "invalid input",
            ErrorKind::UnexpectedResponse => "unexpected response",
            ErrorKind::Init => "initialization error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("{}", source))]
    Config { source: aiconfig::Error },

    #[snafu(display("Unable to read CA bundle '{}': {}", path.display(), source))]
    CaBundleRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("CA bundle '{}' contains no certificates", path.display()))]
    CaBundleEmpty { path: PathBuf },

    #[snafu(display("Invalid certificate in CA bundle '{}': {}", path.display(), source))]
    Certificate {
        path: PathBuf,
        source: reqwest::Error,
    },

    #[snafu(display("Failed to build HTTP client: {}", source))]
    ClientBuild { source: reqwest::Error },

    #[snafu(display("Invalid endpoint URL '{}': {}", url, source))]
    EndpointParse {
        url: String,
        source: url::ParseError,
    },

    #[snafu(display("Endpoint URL '{}' can't have path segments", url))]
    EndpointBase { url: Url },

    #[snafu(display("Failed to negotiate credentials for '{}': {}", host, reason))]
    Negotiate { host: String, reason: String },

    #[snafu(display("Unable to connect when {}ing '{}': {}", method, url, source))]
    Connection {
        method: String,
        url: Url,
        source: reqwest::Error,
    },

    #[snafu(display("Timed out {}ing '{}': {}", method, url, source))]
    Timeout {
        method: String,
        url: Url,
        source: reqwest::Error,
    },

    #[snafu(display("Error {}ing '{}': {}", method, url, source))]
    Request {
        method: String,
        url: Url,
        source: reqwest::Error,
    },

    #[snafu(display(
        "Unable to read response body when {}ing '{}' (code {}): {}",
        method,
        url,
        code,
        source
    ))]
    ResponseBody {
        method: String,
        url: Url,
        code: StatusCode,
        source: reqwest::Error,
    },

    #[snafu(display("Internal server error when {}ing '{}': {}", method, url, body))]
    InternalServerError {
        method: String,
        url: Url,
        body: String,
    },

    #[snafu(display("Error {} when {}ing '{}': {}", code, method, url, body))]
    Unauthorized {
        method: String,
        url: Url,
        code: StatusCode,
        body: String,
    },

    #[snafu(display("Unable to parse JSON response from '{}': {}", url, source))]
    Json {
        url: Url,
        source: serde_json::Error,
    },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config { .. }
            | Error::CaBundleRead { .. }
            | Error::CaBundleEmpty { .. }
            | Error::Certificate { .. }
            | Error::ClientBuild { .. }
            | Error::EndpointParse { .. }
            | Error::EndpointBase { .. }
            | Error::Negotiate { .. } => ErrorKind::Init,
            Error::Connection { .. } | Error::Request { .. } | Error::ResponseBody { .. } => {
                ErrorKind::Connection
            }
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::InternalServerError { .. } => ErrorKind::InternalServerError,
            Error::Unauthorized { .. } => ErrorKind::Unauthorized,
            Error::Json { .. } => ErrorKind::UnexpectedResponse,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config { source } => source.exit_code(),
            Error::Negotiate { .. } => exit::KERBEROS,
            _ => self.kind().exit_code(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
