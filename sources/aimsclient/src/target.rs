//! Translation from an operating system release to the name of its PXE boot target.

use crate::error::{self, Result};
use std::fmt;

/// An operating system release as the inventory describes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatingSystem {
    pub name: String,
    pub major: String,
    pub minor: String,
}

impl OperatingSystem {
    pub fn new<S1, S2, S3>(name: S1, major: S2, minor: S3) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self {
            name: name.into(),
            major: major.into(),
            minor: minor.into(),
        }
    }
}

impl fmt::Display for OperatingSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}.{}", self.name, self.major, self.minor)
    }
}

/// The PXE target for `os` on `architecture`, e.g. `SLC65_X86_64` or `RHEL7_U1_X86_64`.
pub fn pxe_target(os: &OperatingSystem, architecture: &str) -> Result<String> {
    let (major, minor) = (os.major.as_str(), os.minor.as_str());
    let release = match os.name.as_str() {
        "SLC" => format!("SLC{}{}", major, minor),
        "RedHat" if major == "5" => format!("RHES_5_U{}", minor),
        "RedHat" => format!("RHEL{}_U{}", major, minor),
        "Fedora" => format!("FEDORA{}", major),
        "CentOS" => format!("CC{}{}", major, minor),
        name => return error::UnknownOsSnafu { name }.fail(),
    };
    Ok(format!("{}_{}", release, architecture.to_uppercase()))
}
