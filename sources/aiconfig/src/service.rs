use std::fmt;
use std::time::Duration;

/// The remote services that have a section in the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    Foreman,
    PuppetDb,
    Enc,
    Roger,
    Certmgr,
    Nova,
    Tbag,
    Pwn,
    Authz,
    Landb,
    Aidisownhost,
    Rundeck,
}

impl Service {
    pub const ALL: [Service; 12] = [
        Service::Foreman,
        Service::PuppetDb,
        Service::Enc,
        Service::Roger,
        Service::Certmgr,
        Service::Nova,
        Service::Tbag,
        Service::Pwn,
        Service::Authz,
        Service::Landb,
        Service::Aidisownhost,
        Service::Rundeck,
    ];

    /// Name of the configuration section, which is also the prefix of its option names.
    pub fn section(&self) -> &'static str {
        match self {
            Service::Foreman => "foreman",
            Service::PuppetDb => "pdb",
            Service::Enc => "enc",
            Service::Roger => "roger",
            Service::Certmgr => "certmgr",
            Service::Nova => "nova",
            Service::Tbag => "tbag",
            Service::Pwn => "pwn",
            Service::Authz => "authz",
            Service::Landb => "landb",
            Service::Aidisownhost => "aidisownhost",
            Service::Rundeck => "rundeck",
        }
    }

    /// Full option name for a per-service key, e.g. `foreman_port`.
    pub fn option(&self, suffix: &str) -> String {
        format!("{}_{}", self.section(), suffix)
    }

    pub(crate) fn default_port(&self) -> Option<&'static str> {
        match self {
            Service::Foreman => Some("8443"),
            Service::PuppetDb => Some("9081"),
            Service::Enc => Some("8443"),
            Service::Roger => Some("8201"),
            Service::Certmgr => Some("8008"),
            Service::Nova => None,
            Service::Tbag => Some("8201"),
            Service::Pwn => Some("8202"),
            Service::Authz => Some("8443"),
            Service::Landb => Some("443"),
            Service::Aidisownhost => Some("443"),
            Service::Rundeck => Some("443"),
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.section())
    }
}

/// Where and how to reach one service, drawn from its configuration section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceBinding {
    pub service: Service,
    pub hostname: String,
    pub port: u16,
    pub timeout: Duration,
    /// When set, the hostname is replaced at request time by one member of its DNS alias.
    pub dereference_alias: bool,
}
