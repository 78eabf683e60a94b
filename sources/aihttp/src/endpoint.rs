use crate::error::{self, Result};
use aiconfig::ServiceBinding;
use snafu::{OptionExt, ResultExt};
use url::Url;

/// The base URL of one service. Request URLs are built by appending path segments, each of which
/// is percent-encoded, so a segment can never introduce extra path components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    base: Url,
}

impl Endpoint {
    pub fn new(base: Url) -> Self {
        Self { base }
    }

    pub fn parse(base: &str) -> Result<Self> {
        let base = Url::parse(base).context(error::EndpointParseSnafu { url: base })?;
        Ok(Self { base })
    }

    pub fn https(hostname: &str, port: u16) -> Result<Self> {
        Self::parse(&format!("https://{}:{}/", hostname, port))
    }

    pub fn from_binding(binding: &ServiceBinding) -> Result<Self> {
        Self::https(&binding.hostname, binding.port)
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Joins `segments` onto the base path. An empty final segment produces a trailing slash.
    pub fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .ok()
            .context(error::EndpointBaseSnafu {
                url: self.base.clone(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub fn url_with_query(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.url(segments)?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use aiconfig::Service;
    use std::time::Duration;

    #[test]
    fn from_binding() {
        let binding = ServiceBinding {
            service: Service::Foreman,
            hostname: "foreman.example.org".to_string(),
            port: 8443,
            timeout: Duration::from_secs(60),
            dereference_alias: false,
        };
        let endpoint = Endpoint::from_binding(&binding).unwrap();
        assert_eq!(endpoint.base().as_str(), "https://foreman.example.org:8443/");
    }

    #[test]
    fn segments() {
        let endpoint = Endpoint::https("tbag.example.org", 8201).unwrap();
        assert_eq!(
            endpoint
                .url(&["tbag", "v2", "host", "foo.example.org", "secret", ""])
                .unwrap()
                .as_str(),
            "https://tbag.example.org:8201/tbag/v2/host/foo.example.org/secret/"
        );
    }

    #[test]
    fn segments_are_encoded() {
        let endpoint = Endpoint::https("pwn.example.org", 8202).unwrap();
        let url = endpoint.url(&["owner", "a/b c"]).unwrap();
        assert_eq!(url.path(), "/owner/a%2Fb%20c");
    }

    #[test]
    fn base_with_path() {
        let endpoint = Endpoint::parse("https://keystone.example.org/v3").unwrap();
        let url = endpoint.url(&["auth", "tokens"]).unwrap();
        assert_eq!(url.as_str(), "https://keystone.example.org/v3/auth/tokens");
    }

    #[test]
    fn query() {
        let endpoint = Endpoint::https("foreman.example.org", 8443).unwrap();
        let url = endpoint
            .url_with_query(&["api", "hosts"], &[("search", "name = foo"), ("page", "1")])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://foreman.example.org:8443/api/hosts?search=name+%3D+foo&page=1"
        );
    }

    #[test]
    fn bad_base() {
        assert!(Endpoint::parse("not a url").is_err());
        let endpoint = Endpoint::parse("mailto:someone@example.org").unwrap();
        assert!(endpoint.url(&["x"]).is_err());
    }
}
