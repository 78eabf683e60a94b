use std::fmt;
use std::str::FromStr;

/// The kind of entity a record is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Module,
    Hostgroup,
    Host,
    Hostname,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Module => "module",
            Scope::Hostgroup => "hostgroup",
            Scope::Host => "host",
            Scope::Hostname => "hostname",
        }
    }

    /// Hostgroup paths use `/` between levels, which the services expect as `-`.
    pub fn wire_entity(&self, entity: &str) -> String {
        match self {
            Scope::Hostgroup => entity.replace('/', "-"),
            _ => entity.to_string(),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "module" => Ok(Scope::Module),
            "hostgroup" => Ok(Scope::Hostgroup),
            "host" => Ok(Scope::Host),
            "hostname" => Ok(Scope::Hostname),
            other => Err(format!("unknown scope '{}'", other)),
        }
    }
}
