//! Client for the classifier, which returns the parameters configuration management applies to
//! a node.

use crate::error::{self, Result};
use crate::http::ServiceHttp;
use aiconfig::{Config, Service};
use aihttp::Method;
use snafu::ResultExt;

const YAML: &str = "application/x-yaml";

#[derive(Debug, Clone)]
pub struct EncClient {
    http: ServiceHttp,
}

impl EncClient {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self::from_http(ServiceHttp::new(config, Service::Enc, false)?))
    }

    pub fn from_http(http: ServiceHttp) -> Self {
        Self { http }
    }

    /// Returns the node's classification.
    pub fn get_node(&self, hostname: &str) -> Result<serde_yaml::Value> {
        let what = format!("node {}", hostname);
        let url = self
            .http
            .url_with_query(&["node", hostname], &[("format", "yml")])?;
        let response = self
            .http
            .send_with_headers(Method::GET, &url, &[("Accept", YAML)], None)?;
        let response = self.http.check(response, &what)?;
        serde_yaml::from_str(&response.text).context(error::YamlSnafu {
            service: Service::Enc,
            what,
        })
    }
}
