/*!
`aiconfig` reads the site-wide Agile Infrastructure configuration file and answers option lookups
for every service client.

The file is INI-style: a `[DEFAULT]` section plus one section per service (`[foreman]`, `[pdb]`,
`[roger]`, ...). Options are looked up in this order, and the first defined value wins:

1. per-invocation overrides, usually derived from command-line flags
2. the service's own section
3. the `[DEFAULT]` section
4. built-in defaults

```ini
[DEFAULT]
dereference_alias = false

[foreman]
foreman_hostname = foreman.example.org
foreman_port = 8443
foreman_timeout = 60
```

The file is parsed once, when the `Config` is created; lookups never touch the disk again.
*/

#![deny(rust_2018_idioms)]

mod error;
mod service;

pub use error::{Error, Result};
pub use service::{Service, ServiceBinding};

use ini::Ini;
use log::debug;
use snafu::{ensure, OptionExt, ResultExt};
use std::collections::HashMap;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/ai/ai.conf";
pub const DEFAULT_SECTION: &str = "DEFAULT";

const DEFAULT_CA_BUNDLE: &str = "/etc/ssl/certs/ca-bundle.crt";
const DEFAULT_TIMEOUT_SECONDS: &str = "60";

/// Options whose values are read as booleans rather than strings.
pub const BOOLEAN_OPTIONS: &[&str] = &["dereference_alias"];

/// Exit codes shared by the tools that embed the library.
pub mod exit {
    pub const SUCCESS: i32 = 0;
    pub const FAILURE: i32 = 1;
    pub const BAD_ARGUMENTS: i32 = 2;
    pub const KERBEROS: i32 = 3;
    pub const PRECONDITION: i32 = 4;
    pub const CONFIG_UNREADABLE: i32 = 10;
}

/// A typed option value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value<'a> {
    Str(&'a str),
    Bool(bool),
}

/// The layered configuration shared by all clients of one process.
#[derive(Debug, Clone)]
pub struct Config {
    path: PathBuf,
    ini: Ini,
    overrides: HashMap<String, String>,
}

impl Config {
    /// Loads the configuration from the default location.
    pub fn new() -> Result<Self> {
        Self::from_file(DEFAULT_CONFIG_PATH)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Reading configuration from {}", path.display());
        let contents = fs::read_to_string(path).context(error::ConfigReadSnafu { path })?;
        Self::from_str_with_path(&contents, path)
    }

    /// Parses configuration text directly; `path` is only used in error messages.
    pub fn from_str_with_path<P: AsRef<Path>>(contents: &str, path: P) -> Result<Self> {
        let path = path.as_ref();
        let ini = Ini::load_from_str(contents).context(error::ConfigParseSnafu { path })?;
        Ok(Self {
            path: path.to_path_buf(),
            ini,
            overrides: HashMap::new(),
        })
    }

    /// Adds per-invocation overrides, keyed by option name. An override applies to every section.
    pub fn with_overrides<I, K, V>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.overrides
            .extend(overrides.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the value of `key` in `section`, or None if no layer defines it.
    pub fn get_opt(&self, section: &str, key: &str) -> Option<&str> {
        if let Some(value) = self.overrides.get(key) {
            return Some(value.as_str());
        }
        if let Some(value) = self.ini.section(Some(section)).and_then(|s| s.get(key)) {
            return Some(value);
        }
        if let Some(value) = self
            .ini
            .section(Some(DEFAULT_SECTION))
            .and_then(|s| s.get(key))
        {
            return Some(value);
        }
        builtin_default(section, key)
    }

    pub fn get(&self, section: &str, key: &str) -> Result<&str> {
        self.get_opt(section, key)
            .context(error::MissingOptionSnafu { section, key })
    }

    pub fn get_bool(&self, section: &str, key: &str) -> Result<bool> {
        let value = self.get(section, key)?;
        parse_bool(value).context(error::InvalidBoolSnafu {
            section,
            key,
            value,
        })
    }

    /// Reads an option and converts it with `FromStr`.
    pub fn get_parsed<T>(&self, section: &str, key: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        let value = self.get(section, key)?;
        value
            .trim()
            .parse::<T>()
            .map_err(|e| error::Error::InvalidValue {
                section: section.to_string(),
                key: key.to_string(),
                value: value.to_string(),
                reason: e.to_string(),
            })
    }

    /// Reads an option, typed as boolean when it is one of `BOOLEAN_OPTIONS`.
    pub fn value(&self, section: &str, key: &str) -> Result<Value<'_>> {
        if BOOLEAN_OPTIONS.contains(&key) {
            Ok(Value::Bool(self.get_bool(section, key)?))
        } else {
            Ok(Value::Str(self.get(section, key)?))
        }
    }

    /// All options of a section, overrides excluded, in file order.
    pub fn section_options(&self, section: &str) -> Vec<(&str, &str)> {
        self.ini
            .section(Some(section))
            .map(|props| props.iter().collect())
            .unwrap_or_default()
    }

    pub fn dereference_alias(&self) -> Result<bool> {
        self.get_bool(DEFAULT_SECTION, "dereference_alias")
    }

    pub fn ca_bundle(&self) -> Result<PathBuf> {
        self.get(DEFAULT_SECTION, "ca_bundle").map(PathBuf::from)
    }

    /// Builds the endpoint binding for `service` from its `<service>_hostname`, `<service>_port`
    /// and `<service>_timeout` options.
    pub fn binding(&self, service: Service) -> Result<ServiceBinding> {
        let section = service.section();
        let hostname = self.get(section, &service.option("hostname"))?.to_string();

        let port_key = service.option("port");
        let port: u16 = self.get_parsed(section, &port_key)?;
        ensure!(
            port > 0,
            error::InvalidValueSnafu {
                section,
                key: port_key,
                value: port.to_string(),
                reason: "port must be a positive integer",
            }
        );

        let timeout_key = service.option("timeout");
        let timeout: u64 = self.get_parsed(section, &timeout_key)?;
        ensure!(
            timeout > 0,
            error::InvalidValueSnafu {
                section,
                key: timeout_key,
                value: timeout.to_string(),
                reason: "timeout must be a positive number of seconds",
            }
        );

        let dereference_alias = self.get_bool(section, "dereference_alias")?;

        Ok(ServiceBinding {
            service,
            hostname,
            port,
            timeout: Duration::from_secs(timeout),
            dereference_alias,
        })
    }
}

/// Built-in defaults, the lowest-precedence layer.
fn builtin_default(section: &str, key: &str) -> Option<&'static str> {
    match key {
        "dereference_alias" => return Some("false"),
        "ca_bundle" => return Some(DEFAULT_CA_BUNDLE),
        _ => {}
    }
    let service = Service::ALL.iter().find(|s| s.section() == section)?;
    let suffix = key.strip_prefix(service.section())?.strip_prefix('_')?;
    match suffix {
        "port" => service.default_port(),
        "timeout" => Some(DEFAULT_TIMEOUT_SECONDS),
        _ => None,
    }
}

/// Parses booleans the way INI readers do.
fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "yes" | "true" | "on" => Some(true),
        "0" | "no" | "false" | "off" => Some(false),
        _ => None,
    }
}
