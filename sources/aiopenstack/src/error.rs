use aiconfig::exit;
use aihttp::{ErrorKind, StatusCode};
use snafu::Snafu;
use std::fmt;
use std::time::Duration;

/// The cloud service a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    Keystone,
    Nova,
    Cinder,
    Glance,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Component::Keystone => "keystone",
            Component::Nova => "nova",
            Component::Cinder => "cinder",
            Component::Glance => "glance",
        })
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Unable to configure cloud clients: {}", source))]
    Config { source: aiconfig::Error },

    #[snafu(display("{}", source))]
    BadEnvironment { source: aienv::openstack::Error },

    #[snafu(display("Cloud authentication failed: {}", reason))]
    Auth { reason: String },

    #[snafu(display("{} request failed: {}", component, source))]
    Transport {
        component: Component,
        source: aihttp::Error,
    },

    #[snafu(display("Invalid {} URL '{}': {}", component, url, source))]
    Url {
        component: Component,
        url: String,
        source: aihttp::Error,
    },

    #[snafu(display(
        "No '{}' endpoint for interface '{}'{} in the service catalog",
        service_type,
        interface,
        region.as_deref().map(|r| format!(" in region '{}'", r)).unwrap_or_default()
    ))]
    NoEndpoint {
        service_type: String,
        interface: String,
        region: Option<String>,
    },

    #[snafu(display("{}: {} not found", component, what))]
    NotFound { component: Component, what: String },

    #[snafu(display("{}: {} matches {} records, expected exactly one", component, what, count))]
    Ambiguous {
        component: Component,
        what: String,
        count: usize,
    },

    #[snafu(display("{}: unexpected status {} for {}: {}", component, code, what, body))]
    UnexpectedStatus {
        component: Component,
        what: String,
        code: StatusCode,
        body: String,
    },

    #[snafu(display("{}: unable to parse response for {}: {}", component, what, source))]
    Json {
        component: Component,
        what: String,
        source: serde_json::Error,
    },

    #[snafu(display("glance: invalid next link '{}': {}", link, source))]
    NextLink {
        link: String,
        source: url::ParseError,
    },

    #[snafu(display("Invalid volume size '{}', expected <N>GB or <N>TB with N > 0", size))]
    InvalidSize { size: String },

    #[snafu(display("Volume {} went to status '{}'", id, status))]
    VolumeFailed { id: String, status: String },

    #[snafu(display(
        "Volume {} not ready after {}s (status '{}', bootable '{}')",
        id,
        timeout.as_secs(),
        status,
        bootable
    ))]
    VolumeTimeout {
        id: String,
        timeout: Duration,
        status: String,
        bootable: String,
    },

    #[snafu(display("Server {} was booted from a volume and can't be rebuilt from an image", name))]
    VolumeBacked { name: String },

    #[snafu(display("No public {} {} image ({}, {}) has a minor version and release date", distro, major, edition, architecture))]
    NoImage {
        distro: String,
        major: String,
        edition: String,
        architecture: String,
    },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config { .. }
            | Error::BadEnvironment { .. }
            | Error::Auth { .. }
            | Error::Url { .. }
            | Error::NoEndpoint { .. } => ErrorKind::Init,
            Error::Transport { source, .. } => match source.kind() {
                ErrorKind::Unauthorized => ErrorKind::NotAllowed,
                kind => kind,
            },
            Error::NotFound { .. } | Error::NoImage { .. } => ErrorKind::NotFound,
            Error::Ambiguous { .. } | Error::InvalidSize { .. } | Error::VolumeBacked { .. } => {
                ErrorKind::InvalidInput
            }
            Error::VolumeTimeout { .. } => ErrorKind::Timeout,
            Error::UnexpectedStatus { .. }
            | Error::Json { .. }
            | Error::NextLink { .. }
            | Error::VolumeFailed { .. } => ErrorKind::UnexpectedResponse,
        }
    }

    /// The component that failed, when the failure belongs to one service.
    pub fn component(&self) -> Option<Component> {
        match self {
            Error::Auth { .. } | Error::NoEndpoint { .. } => Some(Component::Keystone),
            Error::Transport { component, .. }
            | Error::Url { component, .. }
            | Error::NotFound { component, .. }
            | Error::Ambiguous { component, .. }
            | Error::UnexpectedStatus { component, .. }
            | Error::Json { component, .. } => Some(*component),
            Error::InvalidSize { .. } | Error::VolumeFailed { .. } | Error::VolumeTimeout { .. } => {
                Some(Component::Cinder)
            }
            Error::VolumeBacked { .. } => Some(Component::Nova),
            Error::NoImage { .. } | Error::NextLink { .. } => Some(Component::Glance),
            Error::Config { .. } | Error::BadEnvironment { .. } => None,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config { source } => source.exit_code(),
            Error::Transport { source, .. } => source.exit_code(),
            Error::VolumeBacked { .. } => exit::PRECONDITION,
            _ => self.kind().exit_code(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
