use crate::error::{self, Component, Result};
use crate::session::{self, Session};
use aihttp::{Endpoint, Method, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use snafu::{OptionExt, ResultExt};
use url::Url;

/// One cloud service reached through the session's catalog.
#[derive(Debug, Clone)]
pub(crate) struct ServiceApi {
    session: Session,
    endpoint: Endpoint,
    component: Component,
}

impl ServiceApi {
    /// Binds to the first of `service_types` the catalog has an endpoint for.
    pub(crate) fn new(session: &Session, component: Component, service_types: &[&str]) -> Result<Self> {
        let base = service_types
            .iter()
            .find_map(|service_type| session.endpoint_for(service_type).ok())
            .context(error::NoEndpointSnafu {
                service_type: service_types.join("|"),
                interface: session.interface(),
                region: session.region().map(str::to_string),
            })?;
        Ok(Self {
            session: session.clone(),
            endpoint: Endpoint::new(base),
            component,
        })
    }

    pub(crate) fn session(&self) -> &Session {
        &self.session
    }

    pub(crate) fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub(crate) fn url(&self, segments: &[&str]) -> Result<Url> {
        self.url_with_query(segments, &[])
    }

    pub(crate) fn url_with_query(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url> {
        self.endpoint
            .url_with_query(segments, query)
            .context(error::UrlSnafu {
                component: self.component,
                url: self.endpoint.base().as_str(),
            })
    }

    pub(crate) fn send(&self, method: Method, url: &Url, body: Option<&Value>) -> Result<Response> {
        self.session.request(self.component, method, url, body)
    }

    pub(crate) fn check(&self, response: Response, what: &str) -> Result<Response> {
        session::check(self.component, response, what)
    }

    pub(crate) fn json<T: DeserializeOwned>(&self, response: &Response, what: &str) -> Result<T> {
        serde_json::from_str(&response.text).context(error::JsonSnafu {
            component: self.component,
            what,
        })
    }

    pub(crate) fn get_json<T: DeserializeOwned>(&self, url: &Url, what: &str) -> Result<T> {
        let response = self.send(Method::GET, url, None)?;
        let response = self.check(response, what)?;
        self.json(&response, what)
    }
}
