use crate::auth::{default_authenticator, Authenticator};
use crate::error::{self, Result};
use crate::printable_string;
use aiconfig::{Config, ServiceBinding};
use log::{debug, trace};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE};
use reqwest::redirect::Policy;
use reqwest::{Certificate, Method, StatusCode};
use serde::de::DeserializeOwned;
use snafu::{ensure, ResultExt};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const MAX_REDIRECTS: usize = 10;
const PEM_END: &str = "-----END CERTIFICATE-----";

/// The single request primitive every service client is built on. Cloning is cheap and clones
/// share one connection pool.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    authenticator: Arc<dyn Authenticator + Send + Sync>,
    dereference_alias: bool,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("authenticator", &self.authenticator)
            .field("dereference_alias", &self.dereference_alias)
            .finish()
    }
}

impl HttpTransport {
    /// Creates a transport that trusts only the certificates in `ca_bundle`, or the built-in roots
    /// if no bundle is given.
    pub fn new(timeout: Duration, ca_bundle: Option<&Path>) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(timeout)
            .redirect(Policy::limited(MAX_REDIRECTS));
        if let Some(path) = ca_bundle {
            builder = builder.tls_built_in_root_certs(false);
            for certificate in read_ca_bundle(path)? {
                builder = builder.add_root_certificate(certificate);
            }
        }
        let client = builder.build().context(error::ClientBuildSnafu)?;
        Ok(Self {
            client,
            authenticator: default_authenticator(),
            dereference_alias: false,
        })
    }

    /// Creates the transport for one configured service, pinned to the configured CA bundle.
    pub fn for_binding(binding: &ServiceBinding, config: &Config) -> Result<Self> {
        let ca_bundle = config.ca_bundle().context(error::ConfigSnafu)?;
        Ok(Self::new(binding.timeout, Some(&ca_bundle))?
            .with_dereference_alias(binding.dereference_alias))
    }

    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator + Send + Sync>) -> Self {
        self.authenticator = authenticator;
        self
    }

    pub fn with_dereference_alias(mut self, dereference_alias: bool) -> Self {
        self.dereference_alias = dereference_alias;
        self
    }

    /// Sends one request. Transport failures, 500 and 401/403 become errors; any other status is
    /// returned for the caller to interpret. Nothing is retried.
    pub fn request(
        &self,
        method: Method,
        url: &Url,
        headers: &[(&str, &str)],
        body: Option<String>,
    ) -> Result<Response> {
        let url = if self.dereference_alias {
            aienv::dns::dereference_alias(url)
        } else {
            url.clone()
        };
        debug!("{} {}", method, url);

        let mut builder = self.client.request(method.clone(), url.clone());
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        if let Some(host) = url.host_str() {
            if let Some(authorization) = self.authenticator.authorization(host)? {
                builder = builder.header(AUTHORIZATION, authorization);
            }
        }
        if let Some(body) = body {
            trace!("Request body: {}", printable_string(body.as_bytes()));
            builder = builder.body(body);
        }

        let method_name = method.to_string();
        let response = builder.send().map_err(|source| {
            if source.is_timeout() {
                error::Error::Timeout {
                    method: method_name.clone(),
                    url: url.clone(),
                    source,
                }
            } else if source.is_connect() {
                error::Error::Connection {
                    method: method_name.clone(),
                    url: url.clone(),
                    source,
                }
            } else {
                error::Error::Request {
                    method: method_name.clone(),
                    url: url.clone(),
                    source,
                }
            }
        })?;

        let status = response.status();
        let final_url = response.url().clone();
        let response_headers = response.headers().clone();
        let bytes = response.bytes().context(error::ResponseBodySnafu {
            method: &method_name,
            url: url.clone(),
            code: status,
        })?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        trace!("Response {}: {}", status, printable_string(&bytes));

        ensure!(
            status != StatusCode::INTERNAL_SERVER_ERROR,
            error::InternalServerSnafu {
                method: &method_name,
                url: url.clone(),
                body: printable_string(&bytes),
            }
        );
        ensure!(
            status != StatusCode::UNAUTHORIZED && status != StatusCode::FORBIDDEN,
            error::UnauthorizedSnafu {
                method: &method_name,
                url: url.clone(),
                code: status,
                body: printable_string(&bytes),
            }
        );

        Ok(Response {
            status,
            url: final_url,
            headers: response_headers,
            text,
        })
    }
}

/// Splits a PEM bundle into its certificates.
pub fn read_ca_bundle(path: &Path) -> Result<Vec<Certificate>> {
    let pem = fs::read_to_string(path).context(error::CaBundleReadSnafu { path })?;
    let certificates = pem
        .split_inclusive(PEM_END)
        .filter(|block| block.contains(PEM_END))
        .map(|block| Certificate::from_pem(block.trim().as_bytes()))
        .collect::<std::result::Result<Vec<_>, _>>()
        .context(error::CertificateSnafu { path })?;
    ensure!(!certificates.is_empty(), error::CaBundleEmptySnafu { path });
    debug!(
        "Trusting {} certificates from {}",
        certificates.len(),
        path.display()
    );
    Ok(certificates)
}

/// A response whose status the transport did not reject.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    /// The URL that answered, after redirects.
    pub url: Url,
    pub headers: HeaderMap,
    pub text: String,
}

impl Response {
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.text).context(error::JsonSnafu {
            url: self.url.clone(),
        })
    }
}
