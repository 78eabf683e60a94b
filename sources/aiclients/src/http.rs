//! The piece every JSON client embeds: one service's endpoint and transport plus its dry-run flag.

use crate::error::{self, Result};
use aiconfig::{Config, Service};
use aihttp::{Endpoint, HttpTransport, Method, Response, StatusCode};
use log::info;
use serde::de::DeserializeOwned;
use serde::Serialize;
use snafu::{ensure, ResultExt};
use url::Url;

pub const JSON: &str = "application/json";

#[derive(Debug, Clone)]
pub struct ServiceHttp {
    service: Service,
    endpoint: Endpoint,
    transport: HttpTransport,
    accept: &'static str,
    dryrun: bool,
}

impl ServiceHttp {
    /// Binds to `service` as configured in `config`.
    pub fn new(config: &Config, service: Service, dryrun: bool) -> Result<Self> {
        let binding = config
            .binding(service)
            .context(error::ConfigSnafu { service })?;
        let endpoint =
            Endpoint::from_binding(&binding).context(error::TransportSnafu { service })?;
        let transport = HttpTransport::for_binding(&binding, config)
            .context(error::TransportSnafu { service })?;
        Ok(Self::from_parts(service, endpoint, transport, dryrun))
    }

    pub fn from_parts(
        service: Service,
        endpoint: Endpoint,
        transport: HttpTransport,
        dryrun: bool,
    ) -> Self {
        Self {
            service,
            endpoint,
            transport,
            accept: JSON,
            dryrun,
        }
    }

    /// Replaces the default `Accept` header value.
    pub fn with_accept(mut self, accept: &'static str) -> Self {
        self.accept = accept;
        self
    }

    pub fn service(&self) -> Service {
        self.service
    }

    pub fn dryrun(&self) -> bool {
        self.dryrun
    }

    pub fn url(&self, segments: &[&str]) -> Result<Url> {
        self.endpoint
            .url(segments)
            .context(error::TransportSnafu {
                service: self.service,
            })
    }

    pub fn url_with_query(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url> {
        self.endpoint
            .url_with_query(segments, query)
            .context(error::TransportSnafu {
                service: self.service,
            })
    }

    /// Sends a request with explicit headers and no dry-run check.
    pub fn send_with_headers(
        &self,
        method: Method,
        url: &Url,
        headers: &[(&str, &str)],
        body: Option<String>,
    ) -> Result<Response> {
        self.transport
            .request(method, url, headers, body)
            .context(error::TransportSnafu {
                service: self.service,
            })
    }

    /// Sends a request with the client's `Accept` header, and a JSON content type if there's a
    /// body. Use this directly only for requests without side effects.
    pub fn send(&self, method: Method, url: &Url, body: Option<String>) -> Result<Response> {
        let mut headers = vec![("Accept", self.accept)];
        if body.is_some() {
            headers.push(("Content-Type", JSON));
        }
        self.send_with_headers(method, url, &headers, body)
    }

    pub fn get(&self, url: &Url) -> Result<Response> {
        self.send(Method::GET, url, None)
    }

    /// Sends a side-effecting request, unless this is a dry run, in which case nothing is sent
    /// and None is returned.
    pub fn write<T: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &Url,
        body: Option<&T>,
    ) -> Result<Option<Response>> {
        if self.dryrun {
            info!("Dry run: not sending {} {}", method, url);
            return Ok(None);
        }
        let body = body
            .map(serde_json::to_string)
            .transpose()
            .context(error::JsonSnafu {
                service: self.service,
                what: url.path(),
            })?;
        self.send(method, url, body).map(Some)
    }

    /// Passes 2xx responses through. 404 becomes NotFound, 501 NotImplemented, and anything else
    /// an error carrying the body.
    pub fn check(&self, response: Response, what: &str) -> Result<Response> {
        let status = response.status;
        if status.is_success() {
            return Ok(response);
        }
        match status {
            StatusCode::NOT_FOUND => error::NotFoundSnafu {
                service: self.service,
                what,
            }
            .fail(),
            StatusCode::NOT_IMPLEMENTED => error::NotImplementedSnafu {
                service: self.service,
                what,
                body: aihttp::printable_string(response.text.as_bytes()),
            }
            .fail(),
            code => error::UnexpectedStatusSnafu {
                service: self.service,
                what,
                code,
                body: aihttp::printable_string(response.text.as_bytes()),
            }
            .fail(),
        }
    }

    /// Requires exactly `expected`, treating 404 as NotFound.
    pub fn expect_status(
        &self,
        response: Response,
        expected: StatusCode,
        what: &str,
    ) -> Result<Response> {
        let response = self.check(response, what)?;
        ensure!(
            response.status == expected,
            error::UnexpectedStatusSnafu {
                service: self.service,
                what,
                code: response.status,
                body: aihttp::printable_string(response.text.as_bytes()),
            }
        );
        Ok(response)
    }

    pub fn json<T: DeserializeOwned>(&self, response: &Response, what: &str) -> Result<T> {
        serde_json::from_str(&response.text).context(error::JsonSnafu {
            service: self.service,
            what,
        })
    }

    /// GETs `url`, checks the status and parses the JSON body.
    pub fn get_json<T: DeserializeOwned>(&self, url: &Url, what: &str) -> Result<T> {
        let response = self.get(url)?;
        let response = self.check(response, what)?;
        self.json(&response, what)
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;
    use aihttp::Unauthenticated;
    use httptest::Server;
    use std::sync::Arc;
    use std::time::Duration;

    /// A client of `service` talking plain HTTP to a local test server.
    pub(crate) fn service_http(server: &Server, service: Service, dryrun: bool) -> ServiceHttp {
        let endpoint = Endpoint::parse(&server.url_str("/")).unwrap();
        let transport = HttpTransport::new(Duration::from_secs(5), None)
            .unwrap()
            .with_authenticator(Arc::new(Unauthenticated));
        ServiceHttp::from_parts(service, endpoint, transport, dryrun)
    }
}

#[cfg(test)]
mod test {
    use super::test_util::service_http;
    use super::*;
    use aihttp::ErrorKind;
    use httptest::{matchers::*, responders::*, Expectation, Server};
    use serde_json::json;

    #[test]
    fn default_headers() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("PUT", "/thing/"),
                request::headers(contains(("accept", "application/json"))),
                request::headers(contains(("content-type", "application/json"))),
                request::body(json_decoded(eq(json!({"a": 1})))),
            ])
            .respond_with(status_code(200)),
        );
        let http = service_http(&server, Service::Roger, false);
        let url = http.url(&["thing", ""]).unwrap();
        let response = http.write(Method::PUT, &url, Some(&json!({"a": 1}))).unwrap();
        assert_eq!(response.unwrap().status, StatusCode::OK);
    }

    #[test]
    fn dryrun_sends_nothing() {
        // No expectations: any request fails the test.
        let server = Server::run();
        let http = service_http(&server, Service::Roger, true);
        let url = http.url(&["thing", ""]).unwrap();
        assert!(http
            .write(Method::DELETE, &url, None::<&()>)
            .unwrap()
            .is_none());
    }

    #[test]
    fn forbidden_is_not_allowed() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/node/foo"))
                .respond_with(status_code(403)),
        );
        let http = service_http(&server, Service::Enc, false);
        let url = http.url(&["node", "foo"]).unwrap();
        let err = http.get(&url).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotAllowed);
        assert_eq!(err.service(), Service::Enc);
    }

    #[test]
    fn check_statuses() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/x"))
                .times(3)
                .respond_with(cycle![
                    status_code(404),
                    status_code(501),
                    status_code(409).body("conflict"),
                ]),
        );
        let http = service_http(&server, Service::Pwn, false);
        let url = http.url(&["x"]).unwrap();
        let kinds: Vec<ErrorKind> = (0..3)
            .map(|_| {
                let response = http.get(&url).unwrap();
                http.check(response, "x").unwrap_err().kind()
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                ErrorKind::NotFound,
                ErrorKind::NotImplemented,
                ErrorKind::UnexpectedResponse
            ]
        );
    }
}
