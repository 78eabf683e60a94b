use aiconfig::exit;
use aihttp::ErrorKind;
use reqwest::StatusCode;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Unable to configure network database client: {}", source))]
    Config { source: aiconfig::Error },

    #[snafu(display("{}", source))]
    CaBundle { source: aihttp::Error },

    #[snafu(display("Failed to build HTTP client: {}", source))]
    ClientBuild { source: reqwest::Error },

    #[snafu(display("Invalid network database URL '{}': {}", url, source))]
    Url {
        url: String,
        source: url::ParseError,
    },

    #[snafu(display("Network database call {} failed: {}", operation, source))]
    Request {
        operation: String,
        source: reqwest::Error,
    },

    #[snafu(display("Unable to read reply to {}: {}", operation, source))]
    ResponseBody {
        operation: String,
        source: reqwest::Error,
    },

    #[snafu(display("Network database call {} returned {}: {}", operation, code, body))]
    Status {
        operation: String,
        code: StatusCode,
        body: String,
    },

    #[snafu(display("Network database call {} failed ({}): {}", operation, code, message))]
    Fault {
        operation: String,
        code: String,
        message: String,
    },

    #[snafu(display("Malformed XML: {}", source))]
    Xml { source: quick_xml::Error },

    #[snafu(display("Malformed XML: {}", reason))]
    XmlStructure { reason: String },

    #[snafu(display("Reply to {} has no {} element", operation, element))]
    MissingElement { operation: String, element: String },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config { .. }
            | Error::CaBundle { .. }
            | Error::ClientBuild { .. }
            | Error::Url { .. } => ErrorKind::Init,
            Error::Request { source, .. } if source.is_timeout() => ErrorKind::Timeout,
            Error::Request { .. } | Error::ResponseBody { .. } => ErrorKind::Connection,
            Error::Status { code, .. } => match *code {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ErrorKind::NotAllowed,
                StatusCode::NOT_FOUND => ErrorKind::NotFound,
                StatusCode::INTERNAL_SERVER_ERROR => ErrorKind::InternalServerError,
                _ => ErrorKind::UnexpectedResponse,
            },
            Error::Fault { message, .. } => fault_kind(message),
            Error::Xml { .. } | Error::XmlStructure { .. } | Error::MissingElement { .. } => {
                ErrorKind::UnexpectedResponse
            }
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config { source } => source.exit_code(),
            Error::CaBundle { source } => source.exit_code(),
            _ => self.kind().exit_code(),
        }
    }
}

/// Faults only carry free text, so the few we act on are recognised by wording.
fn fault_kind(message: &str) -> ErrorKind {
    let message = message.to_lowercase();
    if message.contains("not found") || message.contains("does not exist") {
        ErrorKind::NotFound
    } else if message.contains("not authorized")
        || message.contains("permission")
        || message.contains("authentication")
    {
        ErrorKind::NotAllowed
    } else {
        ErrorKind::UnexpectedResponse
    }
}

pub type Result<T> = std::result::Result<T, Error>;
