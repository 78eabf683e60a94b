//! Client for the authorization service, which answers whether a requestor may act on a host or
//! hostgroup.

use crate::error::{self, Result};
use crate::http::ServiceHttp;
use crate::scope::Scope;
use aiconfig::{Config, Service};
use serde_json::Value;
use snafu::ensure;

#[derive(Debug, Clone)]
pub struct AuthzClient {
    http: ServiceHttp,
}

impl AuthzClient {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self::from_http(ServiceHttp::new(config, Service::Authz, false)?))
    }

    pub fn from_http(http: ServiceHttp) -> Self {
        Self { http }
    }

    pub fn get_authz(&self, entity: &str, scope: Scope, requestor: &str) -> Result<Value> {
        ensure!(
            !entity.trim().is_empty() && !requestor.trim().is_empty(),
            error::InvalidInputSnafu {
                service: Service::Authz,
                reason: "an entity, a scope and a requestor are all required",
            }
        );
        ensure!(
            matches!(scope, Scope::Hostname | Scope::Hostgroup),
            error::InvalidInputSnafu {
                service: Service::Authz,
                reason: format!("authorization can't be checked per {}", scope),
            }
        );
        let entity = scope.wire_entity(entity);
        let url = self.http.url_with_query(
            &["authz", "v1", scope.as_str(), &entity, ""],
            &[("requestor", requestor)],
        )?;
        self.http.get_json(
            &url,
            &format!("authorization of {} on {} {}", requestor, scope, entity),
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use aihttp::ErrorKind;
    use crate::http::test_util::service_http;
    use httptest::{matchers::*, responders::*, Expectation, Server};
    use serde_json::json;

    #[test]
    fn hostgroup_authz() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/authz/v1/hostgroup/ai-foo/"),
                request::query(url_decoded(contains(("requestor", "jdoe")))),
            ])
            .respond_with(json_encoded(json!({"authorized": true}))),
        );
        let client = AuthzClient::from_http(service_http(&server, Service::Authz, false));
        let answer = client.get_authz("ai/foo", Scope::Hostgroup, "jdoe").unwrap();
        assert_eq!(answer["authorized"], json!(true));
    }

    #[test]
    fn inputs_required() {
        let server = Server::run();
        let client = AuthzClient::from_http(service_http(&server, Service::Authz, false));
        for (entity, scope, requestor) in [
            ("", Scope::Hostname, "jdoe"),
            ("foo.example.org", Scope::Hostname, " "),
            ("apache", Scope::Module, "jdoe"),
        ] {
            assert_eq!(
                client
                    .get_authz(entity, scope, requestor)
                    .unwrap_err()
                    .kind(),
                ErrorKind::InvalidInput
            );
        }
    }
}
