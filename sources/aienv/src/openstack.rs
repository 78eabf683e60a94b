//! Cloud identity variables exported by the caller's shell.
//!
//! Every variable starting with `OS_` is captured under its lowercased name. Legacy tenant
//! variables are folded into their project equivalents and dropped, so `project_name` and
//! `project_id` are the only names the rest of the code needs to know about.

use log::debug;
use snafu::{ensure, OptionExt};
use std::collections::BTreeMap;
use std::env;

const PREFIX: &str = "OS_";
const REQUIRED_IDENTITY_API_VERSION: &str = "3";

const LEGACY_ALIASES: &[(&str, &str)] = &[
    ("os_tenant_name", "os_project_name"),
    ("os_tenant_id", "os_project_id"),
];

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OpenstackEnv {
    vars: BTreeMap<String, String>,
}

impl OpenstackEnv {
    /// Captures the identity variables of the current process.
    pub fn from_env() -> Self {
        Self::from_vars(env::vars())
    }

    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut captured: BTreeMap<String, String> = vars
            .into_iter()
            .filter(|(k, _)| k.as_ref().starts_with(PREFIX))
            .map(|(k, v)| (k.as_ref().to_lowercase(), v.into()))
            .collect();

        for (legacy, canonical) in LEGACY_ALIASES {
            if let Some(value) = captured.remove(*legacy) {
                debug!("Folding {} into {}", legacy, canonical);
                captured.entry(canonical.to_string()).or_insert(value);
            }
        }

        Self { vars: captured }
    }

    /// Returns a captured variable by its lowercased name, with or without the `os_` prefix.
    pub fn get(&self, name: &str) -> Option<&str> {
        let name = name.to_lowercase();
        let key = if name.starts_with("os_") {
            name
        } else {
            format!("os_{}", name)
        };
        self.vars
            .get(&key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn auth_url(&self) -> Option<&str> {
        self.get("auth_url")
    }

    pub fn identity_api_version(&self) -> Option<&str> {
        self.get("identity_api_version")
    }

    pub fn project_name(&self) -> Option<&str> {
        self.get("project_name")
    }

    pub fn project_id(&self) -> Option<&str> {
        self.get("project_id")
    }

    pub fn user_domain_name(&self) -> Option<&str> {
        self.get("user_domain_name")
    }

    pub fn user_domain_id(&self) -> Option<&str> {
        self.get("user_domain_id")
    }

    pub fn project_domain_name(&self) -> Option<&str> {
        self.get("project_domain_name")
    }

    pub fn project_domain_id(&self) -> Option<&str> {
        self.get("project_domain_id")
    }

    pub fn username(&self) -> Option<&str> {
        self.get("username")
    }

    pub fn password(&self) -> Option<&str> {
        self.get("password")
    }

    pub fn auth_type(&self) -> Option<&str> {
        self.get("auth_type")
    }

    pub fn interface(&self) -> &str {
        self.get("interface").unwrap_or("public")
    }

    pub fn region_name(&self) -> Option<&str> {
        self.get("region_name")
    }

    /// Rejects environments set up for identity API v2.
    pub fn validate(&self) -> Result<()> {
        let version = self
            .identity_api_version()
            .context(error::BadEnvironmentSnafu {
                reason: "OS_IDENTITY_API_VERSION is not set",
            })?;
        ensure!(
            version == REQUIRED_IDENTITY_API_VERSION,
            error::BadEnvironmentSnafu {
                reason: format!(
                    "OS_IDENTITY_API_VERSION is '{}', only '{}' is supported",
                    version, REQUIRED_IDENTITY_API_VERSION
                ),
            }
        );

        let auth_url = self.auth_url().context(error::BadEnvironmentSnafu {
            reason: "OS_AUTH_URL is not set",
        })?;
        let last_component = auth_url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default();
        ensure!(
            !last_component.starts_with("v2"),
            error::BadEnvironmentSnafu {
                reason: format!("OS_AUTH_URL '{}' points at identity API v2", auth_url),
            }
        );

        Ok(())
    }
}

pub mod error {
    use snafu::Snafu;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub(super)))]
    pub enum Error {
        #[snafu(display("Bad OpenStack environment: {}", reason))]
        BadEnvironment { reason: String },
    }
}

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
