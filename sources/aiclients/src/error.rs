use aiconfig::{exit, Service};
use aihttp::{ErrorKind, StatusCode};
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Unable to configure {} client: {}", service, source))]
    Config {
        service: Service,
        source: aiconfig::Error,
    },

    #[snafu(display("{} request failed: {}", service, source))]
    Transport {
        service: Service,
        source: aihttp::Error,
    },

    #[snafu(display("{}: {} not found", service, what))]
    NotFound { service: Service, what: String },

    #[snafu(display("{}: {} already exists", service, what))]
    AlreadyExists { service: Service, what: String },

    #[snafu(display("{}: {} is not implemented: {}", service, what, body))]
    NotImplemented {
        service: Service,
        what: String,
        body: String,
    },

    #[snafu(display(
        "{}: {} '{}' matches {} records, expected exactly one",
        service,
        model,
        value,
        count
    ))]
    Ambiguous {
        service: Service,
        model: String,
        value: String,
        count: usize,
    },

    #[snafu(display("{}: invalid input: {}", service, reason))]
    InvalidInput { service: Service, reason: String },

    #[snafu(display("{}: unexpected status {} for {}: {}", service, code, what, body))]
    UnexpectedStatus {
        service: Service,
        what: String,
        code: StatusCode,
        body: String,
    },

    #[snafu(display("{}: unexpected response for {}: {}", service, what, reason))]
    UnexpectedResponse {
        service: Service,
        what: String,
        reason: String,
    },

    #[snafu(display("{}: unable to parse JSON for {}: {}", service, what, source))]
    Json {
        service: Service,
        what: String,
        source: serde_json::Error,
    },

    #[snafu(display("{}: unable to parse YAML for {}: {}", service, what, source))]
    Yaml {
        service: Service,
        what: String,
        source: serde_yaml::Error,
    },

    #[snafu(display("{}: unable to parse XML for {}: {}", service, what, source))]
    Xml {
        service: Service,
        what: String,
        source: quick_xml::DeError,
    },

    #[snafu(display("{}: secret '{}' is not valid base64: {}", service, key, source))]
    Base64 {
        service: Service,
        key: String,
        source: base64::DecodeError,
    },

    #[snafu(display("{}: unable to write output: {}", service, source))]
    Output {
        service: Service,
        source: std::io::Error,
    },
}

impl Error {
    /// The service that produced the error.
    pub fn service(&self) -> Service {
        match self {
            Error::Config { service, .. }
            | Error::Transport { service, .. }
            | Error::NotFound { service, .. }
            | Error::AlreadyExists { service, .. }
            | Error::NotImplemented { service, .. }
            | Error::Ambiguous { service, .. }
            | Error::InvalidInput { service, .. }
            | Error::UnexpectedStatus { service, .. }
            | Error::UnexpectedResponse { service, .. }
            | Error::Json { service, .. }
            | Error::Yaml { service, .. }
            | Error::Xml { service, .. }
            | Error::Base64 { service, .. }
            | Error::Output { service, .. } => *service,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config { .. } => ErrorKind::Init,
            // The services answer 401 and 403 when the caller lacks rights on the entity.
            Error::Transport { source, .. } => match source.kind() {
                ErrorKind::Unauthorized => ErrorKind::NotAllowed,
                kind => kind,
            },
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Error::NotImplemented { .. } => ErrorKind::NotImplemented,
            Error::Ambiguous { .. } | Error::InvalidInput { .. } | Error::Base64 { .. } => {
                ErrorKind::InvalidInput
            }
            Error::UnexpectedStatus { .. }
            | Error::UnexpectedResponse { .. }
            | Error::Json { .. }
            | Error::Yaml { .. }
            | Error::Xml { .. }
            | Error::Output { .. } => ErrorKind::UnexpectedResponse,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config { source, .. } => source.exit_code(),
            Error::Transport { source, .. } => source.exit_code(),
            Error::InvalidInput { .. } => exit::BAD_ARGUMENTS,
            _ => exit::FAILURE,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
