//! Client for the certificate manager, which pre-authorizes hosts to obtain a certificate.

use crate::error::{self, Result};
use crate::http::ServiceHttp;
use aiconfig::{Config, Service};
use aihttp::{Method, StatusCode};
use log::info;
use serde::Serialize;
use snafu::ensure;

#[derive(Debug, Serialize)]
struct StageRequest<'a> {
    hostname: &'a str,
}

#[derive(Debug, Clone)]
pub struct CertmgrClient {
    http: ServiceHttp,
}

impl CertmgrClient {
    pub fn new(config: &Config, dryrun: bool) -> Result<Self> {
        Ok(Self::from_http(ServiceHttp::new(
            config,
            Service::Certmgr,
            dryrun,
        )?))
    }

    pub fn from_http(http: ServiceHttp) -> Self {
        Self { http }
    }

    /// Stages `fqdn` so its first certificate request will be signed.
    pub fn stage(&self, fqdn: &str) -> Result<()> {
        let url = self.http.url(&["krb", "certmgr", "staged", ""])?;
        let body = StageRequest { hostname: fqdn };
        let what = format!("staging of {}", fqdn);
        if let Some(response) = self.http.write(Method::POST, &url, Some(&body))? {
            ensure!(
                response.status == StatusCode::CREATED,
                error::UnexpectedStatusSnafu {
                    service: Service::Certmgr,
                    what,
                    code: response.status,
                    body: aihttp::printable_string(response.text.as_bytes()),
                }
            );
            info!("Staged {}", fqdn);
        }
        Ok(())
    }
}
