//! Client for the PuppetDB-style facts service.

use crate::error::Result;
use crate::http::ServiceHttp;
use aiconfig::{Config, Service};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

const QUERY_ROOT: [&str; 3] = ["pdb", "query", "v4"];
pub const LANDBSET_RESOURCE: &str = "Teigi::Landbset";
pub const LBALIAS_RESOURCE: &str = "Lbd::Alias";

#[derive(Debug, Deserialize)]
struct Fact {
    name: String,
    value: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Resource {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub title: String,
    #[serde(default)]
    pub parameters: Value,
}

#[derive(Debug, Clone)]
pub struct PdbClient {
    http: ServiceHttp,
}

impl PdbClient {
    pub fn new(config: &Config) -> Result<Self> {
        // Every call is a read, so there's nothing for dry-run to skip.
        Ok(Self::from_http(ServiceHttp::new(
            config,
            Service::PuppetDb,
            false,
        )?))
    }

    pub fn from_http(http: ServiceHttp) -> Self {
        Self { http }
    }

    fn node_query<T: serde::de::DeserializeOwned>(&self, fqdn: &str, rest: &[&str]) -> Result<T> {
        let mut segments: Vec<&str> = QUERY_ROOT.to_vec();
        segments.extend(["nodes", fqdn]);
        segments.extend(rest);
        let url = self.http.url(&segments)?;
        self.http.get_json(&url, &format!("node {}", fqdn))
    }

    pub fn get_host(&self, fqdn: &str) -> Result<Value> {
        self.node_query(fqdn, &[])
    }

    /// Returns the node's facts keyed by fact name.
    pub fn get_facts(&self, fqdn: &str) -> Result<BTreeMap<String, Value>> {
        let facts: Vec<Fact> = self.node_query(fqdn, &["facts"])?;
        Ok(facts.into_iter().map(|f| (f.name, f.value)).collect())
    }

    pub fn get_resources(&self, fqdn: &str) -> Result<Vec<Resource>> {
        self.node_query(fqdn, &["resources"])
    }

    fn resource_titles(&self, fqdn: &str, resource_type: &str) -> Result<Vec<String>> {
        let resources: Vec<Resource> = self.node_query(fqdn, &["resources", resource_type])?;
        Ok(resources.into_iter().map(|r| r.title).collect())
    }

    /// Network-database sets the node's configuration puts it in.
    pub fn get_landbsets(&self, fqdn: &str) -> Result<Vec<String>> {
        self.resource_titles(fqdn, LANDBSET_RESOURCE)
    }

    /// Load-balanced DNS aliases the node's configuration joins.
    pub fn get_lbaliases(&self, fqdn: &str) -> Result<Vec<String>> {
        self.resource_titles(fqdn, LBALIAS_RESOURCE)
    }

    /// Runs an arbitrary query below the API root, e.g. `facts/osfamily`.
    pub fn raw_request(&self, path: &str) -> Result<Value> {
        let mut segments: Vec<&str> = QUERY_ROOT.to_vec();
        segments.extend(path.split('/').filter(|s| !s.is_empty()));
        let url = self.http.url(&segments)?;
        self.http.get_json(&url, path)
    }
}
