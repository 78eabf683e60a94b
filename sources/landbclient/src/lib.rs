/*!
`landbclient` talks SOAP 1.1 to the network database, the directory of devices and the people
responsible for them.

The client logs in with a username and password from the `[landb]` configuration section, keeps
the session token it gets back, and sends it in the SOAP header of every later call.

```no_run
# fn main() -> landbclient::Result<()> {
let config = aiconfig::Config::new().map_err(|source| landbclient::Error::Config { source })?;
let client = landbclient::LandbClient::new(&config, false)?;
client.change_responsible("myhost.cern.ch", "ai-admins", None)?;
# Ok(())
# }
```
*/

#![deny(rust_2018_idioms)]

mod error;
pub mod xml;

pub use error::{Error, Result};

use aiconfig::{Config, Service};
use aienv::dns;
use log::{debug, info, trace};
use reqwest::blocking::Client;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use snafu::{OptionExt, ResultExt};
use url::Url;
use xml::Element;

pub const DEFAULT_PATH: &str = "/sc/soap/soap.fcgi?v=6";
pub const DEFAULT_FIRST_NAME: &str = "E-GROUP";
const NAMESPACE: &str = "urn:NetworkService";
const ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const AUTH_TYPE: &str = "NICE";
const SOAP_ACTION: &str = "SOAPAction";
const TEXT_XML: &str = "text/xml; charset=utf-8";

/// The person or group responsible for a device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponsiblePerson {
    pub name: Option<String>,
    pub first_name: Option<String>,
    pub email: Option<String>,
    pub department: Option<String>,
    pub group: Option<String>,
}

impl ResponsiblePerson {
    fn from_element(element: &Element) -> Self {
        let text = |name: &str| element.child_text(name).map(str::to_string);
        Self {
            name: text("Name"),
            first_name: text("FirstName"),
            email: text("Email"),
            department: text("Department"),
            group: text("Group"),
        }
    }
}

/// A device record as returned by `getDeviceInfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    info: Element,
}

impl Device {
    pub fn name(&self) -> Option<&str> {
        self.info.child_text("DeviceName")
    }

    pub fn responsible_person(&self) -> Option<ResponsiblePerson> {
        self.info
            .child("ResponsiblePerson")
            .map(ResponsiblePerson::from_element)
    }

    /// The raw record, for fields this type doesn't expose.
    pub fn element(&self) -> &Element {
        &self.info
    }

    /// The `DeviceInput` for `deviceUpdate`: the current record with a new responsible person.
    fn update_input(&self, name: &str, first_name: &str) -> Element {
        let mut input = without_nil(&self.info);
        input.name = "DeviceInput".to_string();
        input.set_child(
            Element::new("ResponsiblePerson")
                .with_child(Element::text_element("Name", name))
                .with_child(Element::text_element("FirstName", first_name)),
        );
        input
    }
}

/// Copies `element` without attributes, dropping children marked nil.
fn without_nil(element: &Element) -> Element {
    Element {
        name: element.name.clone(),
        attributes: Vec::new(),
        text: element.text.clone(),
        children: element
            .children
            .iter()
            .filter(|c| c.attribute("nil") != Some("true"))
            .map(without_nil)
            .collect(),
    }
}

#[derive(Debug, Clone)]
pub struct LandbClient {
    url: Url,
    client: Client,
    username: String,
    password: String,
    token: Option<String>,
    dryrun: bool,
}

impl LandbClient {
    /// Builds a client from the `[landb]` section and logs in.
    pub fn new(config: &Config, dryrun: bool) -> Result<Self> {
        let service = Service::Landb;
        let section = service.section();
        let binding = config.binding(service).context(error::ConfigSnafu)?;
        let path = config
            .get_opt(section, &service.option("path"))
            .unwrap_or(DEFAULT_PATH);
        let url_text = format!("https://{}:{}{}", binding.hostname, binding.port, path);
        let mut url = Url::parse(&url_text).context(error::UrlSnafu { url: &url_text })?;
        if binding.dereference_alias {
            url = dns::dereference_alias(&url);
        }

        let ca_bundle = config.ca_bundle().context(error::ConfigSnafu)?;
        let mut builder = Client::builder()
            .timeout(binding.timeout)
            .tls_built_in_root_certs(false);
        for certificate in aihttp::read_ca_bundle(&ca_bundle).context(error::CaBundleSnafu)? {
            builder = builder.add_root_certificate(certificate);
        }
        let client = builder.build().context(error::ClientBuildSnafu)?;

        let username = config
            .get(section, &service.option("username"))
            .context(error::ConfigSnafu)?;
        let password = config
            .get(section, &service.option("password"))
            .context(error::ConfigSnafu)?;

        let mut landb = Self::from_parts(url, client, username, password, dryrun);
        landb.authenticate()?;
        Ok(landb)
    }

    /// Builds a client that hasn't logged in yet.
    pub fn from_parts<S1, S2>(
        url: Url,
        client: Client,
        username: S1,
        password: S2,
        dryrun: bool,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            url,
            client,
            username: username.into(),
            password: password.into(),
            token: None,
            dryrun,
        }
    }

    /// Exchanges the username and password for a session token.
    pub fn authenticate(&mut self) -> Result<()> {
        let operation = "getAuthToken";
        let reply = self.call(
            operation,
            vec![
                Element::text_element("Login", self.username.as_str()),
                Element::text_element("Password", self.password.as_str()),
                Element::text_element("Type", AUTH_TYPE),
            ],
        )?;
        let token = reply
            .children
            .first()
            .map(|c| c.text.as_str())
            .or(Some(reply.text.as_str()))
            .filter(|token| !token.is_empty())
            .context(error::MissingElementSnafu {
                operation,
                element: "token",
            })?;
        debug!("Logged in to the network database as {}", self.username);
        self.token = Some(token.to_string());
        Ok(())
    }

    pub fn device_info(&self, name: &str) -> Result<Device> {
        let operation = "getDeviceInfo";
        let reply = self.call(operation, vec![Element::text_element("DeviceName", name)])?;
        let info = reply
            .descendant("DeviceInfo")
            .cloned()
            .context(error::MissingElementSnafu {
                operation,
                element: "DeviceInfo",
            })?;
        Ok(Device { info })
    }

    /// Makes `name` (and `first_name`, or `E-GROUP` when it's a group) responsible for the device
    /// behind `fqdn`. Both are sent uppercased.
    pub fn change_responsible(
        &self,
        fqdn: &str,
        name: &str,
        first_name: Option<&str>,
    ) -> Result<()> {
        let device_name = dns::shortify(fqdn);
        let name = name.to_uppercase();
        let first_name = first_name.unwrap_or(DEFAULT_FIRST_NAME).to_uppercase();
        let device = self.device_info(device_name)?;
        if let Some(current) = device.responsible_person() {
            debug!(
                "{} is currently the responsibility of {} {}",
                device_name,
                current.first_name.as_deref().unwrap_or(""),
                current.name.as_deref().unwrap_or("")
            );
        }
        if self.dryrun {
            info!(
                "Would have made {} {} responsible for {}",
                first_name, name, device_name
            );
            return Ok(());
        }
        let input = device.update_input(&name, &first_name);
        self.call(
            "deviceUpdate",
            vec![Element::text_element("DeviceName", device_name), input],
        )?;
        info!("Made {} {} responsible for {}", first_name, name, device_name);
        Ok(())
    }

    fn envelope(&self, operation: &str, parameters: Vec<Element>) -> String {
        let mut envelope = Element::new("soap:Envelope").with_attribute("xmlns:soap", ENVELOPE_NS);
        if let Some(token) = &self.token {
            envelope = envelope.with_child(
                Element::new("soap:Header").with_child(
                    Element::new("Auth")
                        .with_attribute("xmlns", NAMESPACE)
                        .with_child(Element::text_element("token", token.as_str())),
                ),
            );
        }
        let mut call = Element::new(operation).with_attribute("xmlns", NAMESPACE);
        call.children = parameters;
        envelope = envelope.with_child(Element::new("soap:Body").with_child(call));

        let mut out = String::from(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        envelope.write_to(&mut out);
        out
    }

    /// Sends one call and returns the `<operation>Response` element.
    fn call(&self, operation: &str, parameters: Vec<Element>) -> Result<Element> {
        let body = self.envelope(operation, parameters);
        debug!("Calling {} at {}", operation, self.url);
        let action = format!("\"{}#{}\"", NAMESPACE, operation);
        let response = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, HeaderValue::from_static(TEXT_XML))
            .header(SOAP_ACTION, action)
            .body(body)
            .send()
            .context(error::RequestSnafu { operation })?;
        let status = response.status();
        let text = response
            .text()
            .context(error::ResponseBodySnafu { operation })?;
        trace!(
            "{} replied {}: {}",
            operation,
            status,
            aihttp::printable_string(text.as_bytes())
        );

        // Faults come back with status 500, so look for one before judging the status.
        let envelope = match Element::parse(&text) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return error::StatusSnafu {
                    operation,
                    code: status,
                    body: aihttp::printable_string(text.as_bytes()),
                }
                .fail()
            }
            Err(e) => return Err(e),
        };
        if let Some(fault) = envelope.find(&["Body", "Fault"]) {
            return error::FaultSnafu {
                operation,
                code: fault.child_text("faultcode").unwrap_or("unknown"),
                message: fault.child_text("faultstring").unwrap_or(""),
            }
            .fail();
        }
        snafu::ensure!(
            status.is_success(),
            error::StatusSnafu {
                operation,
                code: status,
                body: aihttp::printable_string(text.as_bytes()),
            }
        );
        let response_name = format!("{}Response", operation);
        envelope
            .find(&["Body", response_name.as_str()])
            .cloned()
            .context(error::MissingElementSnafu {
                operation,
                element: response_name.as_str(),
            })
    }
}
