//! Client for the inventory service, which owns hosts, hostgroups, environments and per-host
//! parameters.
//!
//! Names given by the caller (hostgroup labels, environment names, operating system titles...)
//! are resolved to numeric ids by searching the matching collection. Successful lookups are
//! cached for the life of the client, keyed by `"<collection>:<value>"`.

use crate::error::{self, Result};
use crate::http::ServiceHttp;
use aiconfig::{Config, Service};
use aihttp::{Method, StatusCode};
use log::{debug, info};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use snafu::{ensure, OptionExt};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

const ACCEPT: &str = "application/json,version=2";
pub const DEFAULT_PER_PAGE: u32 = 100;

/// The collections whose members can be looked up by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Model {
    Environment,
    Hostgroup,
    User,
    OperatingSystem,
    Architecture,
    Medium,
    PartitionTable,
}

impl Model {
    pub fn collection(&self) -> &'static str {
        match self {
            Model::Environment => "environments",
            Model::Hostgroup => "hostgroups",
            Model::User => "users",
            Model::OperatingSystem => "operatingsystems",
            Model::Architecture => "architectures",
            Model::Medium => "media",
            Model::PartitionTable => "ptables",
        }
    }

    /// The attribute a caller-supplied name is matched against.
    fn search_field(&self) -> &'static str {
        match self {
            // Hostgroup names are only unique within their parent; labels are full paths.
            Model::Hostgroup => "label",
            Model::User => "login",
            Model::OperatingSystem => "title",
            _ => "name",
        }
    }
}

/// Collection holding the target of a `<relation>_id` host attribute.
fn relation_collection(relation: &str) -> String {
    match relation {
        "medium" => "media".to_string(),
        other => format!("{}s", other),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerOperation {
    On,
    Off,
    Soft,
    Cycle,
    Status,
}

impl PowerOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            PowerOperation::On => "on",
            PowerOperation::Off => "off",
            PowerOperation::Soft => "soft",
            PowerOperation::Cycle => "cycle",
            PowerOperation::Status => "status",
        }
    }
}

impl fmt::Display for PowerOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PowerOperation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "on" => Ok(PowerOperation::On),
            "off" => Ok(PowerOperation::Off),
            "soft" => Ok(PowerOperation::Soft),
            "cycle" => Ok(PowerOperation::Cycle),
            "status" => Ok(PowerOperation::Status),
            other => Err(format!(
                "unknown power operation '{}', expected one of on, off, soft, cycle, status",
                other
            )),
        }
    }
}

/// A host to register.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewHost {
    pub fqdn: String,
    pub environment: String,
    pub hostgroup: String,
    /// Login of the owning user; unset leaves ownership to the service default.
    pub owner: Option<String>,
    pub operatingsystem: Option<String>,
    pub architecture: Option<String>,
    pub medium: Option<String>,
    pub ptable: Option<String>,
    pub ip: Option<String>,
    pub mac: Option<String>,
    pub comment: Option<String>,
    pub managed: bool,
}

/// Fields to change on an existing host. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostUpdate {
    pub environment: Option<String>,
    pub hostgroup: Option<String>,
    pub operatingsystem: Option<String>,
    pub architecture: Option<String>,
    pub medium: Option<String>,
    pub ptable: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    subtotal: usize,
    per_page: Option<usize>,
    #[serde(default)]
    results: Vec<Value>,
}

#[derive(Debug)]
pub struct ForemanClient {
    http: ServiceHttp,
    per_page: u32,
    cache: RefCell<HashMap<String, u64>>,
}

impl ForemanClient {
    pub fn new(config: &Config, dryrun: bool) -> Result<Self> {
        Ok(Self::from_http(ServiceHttp::new(
            config,
            Service::Foreman,
            dryrun,
        )?))
    }

    pub fn from_http(http: ServiceHttp) -> Self {
        Self {
            http: http.with_accept(ACCEPT),
            per_page: DEFAULT_PER_PAGE,
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page.max(1);
        self
    }

    /// Returns every record of `model` matching `query`, concatenated across pages in order.
    ///
    /// Paging stops at an empty or short page, or once the accumulated results reach a subtotal
    /// that two consecutive pages agree on. The subtotal can grow while the listing is walked, so
    /// the first page's figure alone doesn't end it.
    pub fn search_query(&self, model: &str, query: &str) -> Result<Vec<Value>> {
        let per_page = self.per_page.to_string();
        let mut results = Vec::new();
        let mut previous_subtotal = None;
        let mut page: u32 = 1;
        loop {
            let page_number = page.to_string();
            let url = self.http.url_with_query(
                &["api", model],
                &[
                    ("search", query),
                    ("page", &page_number),
                    ("per_page", &per_page),
                ],
            )?;
            let body: SearchPage = self.http.get_json(&url, model)?;
            debug!(
                "{} page {}: {} results of {}",
                model,
                page,
                body.results.len(),
                body.subtotal
            );
            if body.results.is_empty() {
                break;
            }
            let page_size = body.per_page.unwrap_or(self.per_page as usize);
            let short = body.results.len() < page_size;
            results.extend(body.results);
            let settled = previous_subtotal == Some(body.subtotal);
            if short || (settled && results.len() >= body.subtotal) {
                break;
            }
            previous_subtotal = Some(body.subtotal);
            page += 1;
        }
        Ok(results)
    }

    /// Resolves a name to the id of the single matching record.
    pub fn resolve_id(&self, model: Model, value: &str) -> Result<u64> {
        let key = format!("{}:{}", model.collection(), value);
        if let Some(id) = self.cache.borrow().get(&key) {
            return Ok(*id);
        }

        let query = format!("{} = \"{}\"", model.search_field(), value);
        let matches = self.search_query(model.collection(), &query)?;
        let id = match matches.as_slice() {
            [] => {
                return error::NotFoundSnafu {
                    service: Service::Foreman,
                    what: format!("{} '{}'", model.collection(), value),
                }
                .fail()
            }
            [record] => record.get("id").and_then(Value::as_u64).context(
                error::UnexpectedResponseSnafu {
                    service: Service::Foreman,
                    what: key.as_str(),
                    reason: "record has no numeric id",
                },
            )?,
            many => {
                return error::AmbiguousSnafu {
                    service: Service::Foreman,
                    model: model.collection(),
                    value,
                    count: many.len(),
                }
                .fail()
            }
        };
        self.cache.borrow_mut().insert(key, id);
        Ok(id)
    }

    pub fn environment_id(&self, name: &str) -> Result<u64> {
        self.resolve_id(Model::Environment, name)
    }

    pub fn hostgroup_id(&self, label: &str) -> Result<u64> {
        self.resolve_id(Model::Hostgroup, label)
    }

    pub fn user_id(&self, login: &str) -> Result<u64> {
        self.resolve_id(Model::User, login)
    }

    pub fn operatingsystem_id(&self, title: &str) -> Result<u64> {
        self.resolve_id(Model::OperatingSystem, title)
    }

    pub fn architecture_id(&self, name: &str) -> Result<u64> {
        self.resolve_id(Model::Architecture, name)
    }

    pub fn medium_id(&self, name: &str) -> Result<u64> {
        self.resolve_id(Model::Medium, name)
    }

    pub fn ptable_id(&self, name: &str) -> Result<u64> {
        self.resolve_id(Model::PartitionTable, name)
    }

    pub fn add_host(&self, host: &NewHost) -> Result<()> {
        let mut attributes = Map::new();
        attributes.insert("name".into(), json!(host.fqdn));
        attributes.insert(
            "environment_id".into(),
            json!(self.environment_id(&host.environment)?),
        );
        attributes.insert(
            "hostgroup_id".into(),
            json!(self.hostgroup_id(&host.hostgroup)?),
        );
        if let Some(owner) = &host.owner {
            attributes.insert("owner_id".into(), json!(self.user_id(owner)?));
            attributes.insert("owner_type".into(), json!("User"));
        }
        self.insert_optional_ids(
            &mut attributes,
            host.operatingsystem.as_deref(),
            host.architecture.as_deref(),
            host.medium.as_deref(),
            host.ptable.as_deref(),
        )?;
        for (name, value) in [
            ("ip", &host.ip),
            ("mac", &host.mac),
            ("comment", &host.comment),
        ] {
            if let Some(value) = value {
                attributes.insert(name.into(), json!(value));
            }
        }
        attributes.insert("managed".into(), json!(host.managed));
        attributes.insert("build".into(), json!(false));

        let url = self.http.url(&["api", "hosts"])?;
        let body = json!({ "host": attributes });
        let response = match self.http.write(Method::POST, &url, Some(&body))? {
            Some(response) => response,
            None => return Ok(()),
        };
        ensure!(
            response.status != StatusCode::UNPROCESSABLE_ENTITY,
            error::AlreadyExistsSnafu {
                service: Service::Foreman,
                what: format!("host {}", host.fqdn),
            }
        );
        self.http.check(response, &format!("host {}", host.fqdn))?;
        info!("Added {} to the inventory", host.fqdn);
        Ok(())
    }

    fn insert_optional_ids(
        &self,
        attributes: &mut Map<String, Value>,
        operatingsystem: Option<&str>,
        architecture: Option<&str>,
        medium: Option<&str>,
        ptable: Option<&str>,
    ) -> Result<()> {
        for (attribute, model, value) in [
            ("operatingsystem_id", Model::OperatingSystem, operatingsystem),
            ("architecture_id", Model::Architecture, architecture),
            ("medium_id", Model::Medium, medium),
            ("ptable_id", Model::PartitionTable, ptable),
        ] {
            if let Some(value) = value {
                attributes.insert(attribute.into(), json!(self.resolve_id(model, value)?));
            }
        }
        Ok(())
    }

    /// Deletes a host. Any 2xx is success.
    pub fn delete_host(&self, fqdn: &str) -> Result<()> {
        let url = self.http.url(&["api", "hosts", fqdn])?;
        if let Some(response) = self.http.write(Method::DELETE, &url, None::<&Value>)? {
            self.http.check(response, &format!("host {}", fqdn))?;
            info!("Deleted {} from the inventory", fqdn);
        }
        Ok(())
    }

    /// Fetches a host. Each relation named in `expand` (e.g. `hostgroup`) is replaced by the full
    /// record its `<relation>_id` attribute points at.
    pub fn get_host(&self, fqdn: &str, expand: &[&str]) -> Result<Value> {
        let what = format!("host {}", fqdn);
        let url = self.http.url(&["api", "hosts", fqdn])?;
        let mut host: Value = self.http.get_json(&url, &what)?;

        for relation in expand {
            let id = host
                .get(format!("{}_id", relation))
                .and_then(Value::as_u64)
                .context(error::UnexpectedResponseSnafu {
                    service: Service::Foreman,
                    what: what.as_str(),
                    reason: format!("no {}_id to expand", relation),
                })?;
            let collection = relation_collection(relation);
            let url = self
                .http
                .url(&["api", &collection, &id.to_string()])?;
            let related: Value = self
                .http
                .get_json(&url, &format!("{} {}", relation, id))?;
            if let Some(object) = host.as_object_mut() {
                object.insert(relation.to_string(), related);
            }
        }
        Ok(host)
    }

    pub fn add_host_parameter(&self, fqdn: &str, name: &str, value: &str) -> Result<()> {
        let url = self.http.url(&["api", "hosts", fqdn, "parameters"])?;
        let body = json!({ "parameter": { "name": name, "value": value } });
        let what = format!("parameter {} of {}", name, fqdn);
        if let Some(response) = self.http.write(Method::POST, &url, Some(&body))? {
            ensure!(
                response.status != StatusCode::UNPROCESSABLE_ENTITY,
                error::AlreadyExistsSnafu {
                    service: Service::Foreman,
                    what,
                }
            );
            self.http.check(response, &what)?;
        }
        Ok(())
    }

    /// Runs a power action on the host's BMC. `status` is a read and also runs in dry-run mode;
    /// the other actions return None in dry-run mode.
    pub fn power_operation(&self, fqdn: &str, operation: &str) -> Result<Option<Value>> {
        let operation: PowerOperation = operation.parse().map_err(|reason| {
            error::Error::InvalidInput {
                service: Service::Foreman,
                reason,
            }
        })?;
        let url = self.http.url(&["api", "hosts", fqdn, "power"])?;
        let body = json!({ "power_action": operation.as_str() });
        let what = format!("power {} of {}", operation, fqdn);

        let response = if operation == PowerOperation::Status {
            self.http
                .send(Method::PUT, &url, Some(body.to_string()))?
        } else {
            match self.http.write(Method::PUT, &url, Some(&body))? {
                Some(response) => response,
                None => return Ok(None),
            }
        };
        let response = self.http.check(response, &what)?;
        let result: Value = self.http.json(&response, &what)?;
        Ok(Some(result.get("power").cloned().unwrap_or(result)))
    }

    pub fn rename_host(&self, fqdn: &str, new_fqdn: &str) -> Result<()> {
        let url = self.http.url(&["api", "hosts", fqdn])?;
        let body = json!({ "host": { "name": new_fqdn } });
        if let Some(response) = self.http.write(Method::PUT, &url, Some(&body))? {
            ensure!(
                response.status != StatusCode::UNPROCESSABLE_ENTITY,
                error::AlreadyExistsSnafu {
                    service: Service::Foreman,
                    what: format!("host {}", new_fqdn),
                }
            );
            self.http.check(response, &format!("host {}", fqdn))?;
            info!("Renamed {} to {}", fqdn, new_fqdn);
        }
        Ok(())
    }

    pub fn update_host(&self, fqdn: &str, update: &HostUpdate) -> Result<()> {
        let mut attributes = Map::new();
        if let Some(environment) = &update.environment {
            attributes.insert(
                "environment_id".into(),
                json!(self.environment_id(environment)?),
            );
        }
        if let Some(hostgroup) = &update.hostgroup {
            attributes.insert("hostgroup_id".into(), json!(self.hostgroup_id(hostgroup)?));
        }
        self.insert_optional_ids(
            &mut attributes,
            update.operatingsystem.as_deref(),
            update.architecture.as_deref(),
            update.medium.as_deref(),
            update.ptable.as_deref(),
        )?;
        if let Some(comment) = &update.comment {
            attributes.insert("comment".into(), json!(comment));
        }
        ensure!(
            !attributes.is_empty(),
            error::InvalidInputSnafu {
                service: Service::Foreman,
                reason: format!("nothing to update on {}", fqdn),
            }
        );

        let url = self.http.url(&["api", "hosts", fqdn])?;
        let body = json!({ "host": attributes });
        if let Some(response) = self.http.write(Method::PUT, &url, Some(&body))? {
            self.http.check(response, &format!("host {}", fqdn))?;
        }
        Ok(())
    }
}
