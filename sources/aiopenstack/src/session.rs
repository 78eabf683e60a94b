//! Identity sessions.
//!
//! A [`Session`] holds a project-scoped token and the service catalog that came with it. Two
//! ways of getting the token are supported, chosen by `OS_AUTH_TYPE`:
//!
//! * `v3password` (the default): username and password from the environment
//! * `v3kerberos`: an unscoped token from the federation endpoint, obtained with HTTP Negotiate,
//!   which is then exchanged for a project-scoped one

use crate::error::{self, Component, Result};
use aiconfig::Config;
use aienv::openstack::OpenstackEnv;
use aihttp::{
    default_authenticator, Authenticator, Endpoint, HttpTransport, Method, Response, StatusCode,
    Unauthenticated,
};
use log::{debug, info};
use serde::Deserialize;
use serde_json::{json, Value};
use snafu::{ensure, OptionExt, ResultExt};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const JSON: &str = "application/json";
const SUBJECT_TOKEN: &str = "X-Subject-Token";
pub(crate) const AUTH_TOKEN: &str = "X-Auth-Token";
const DEFAULT_DOMAIN: &str = "Default";
const DEFAULT_IDENTITY_PROVIDER: &str = "sssd";
const DEFAULT_PROTOCOL: &str = "kerberos";
/// Section whose timeout applies to every cloud request.
const TIMEOUT_SECTION: &str = "nova";

/// How the session obtains its token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    Password,
    Kerberos,
}

impl AuthMethod {
    fn from_env(env: &OpenstackEnv) -> Result<Self> {
        match env.auth_type() {
            None | Some("password") | Some("v3password") => Ok(AuthMethod::Password),
            Some("v3kerberos") => Ok(AuthMethod::Kerberos),
            Some(other) => error::AuthSnafu {
                reason: format!("unsupported OS_AUTH_TYPE '{}'", other),
            }
            .fail(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogService {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<CatalogEndpoint>,
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogEndpoint {
    interface: String,
    region: Option<String>,
    region_id: Option<String>,
    url: String,
}

#[derive(Debug, Deserialize)]
struct TokenReply {
    token: TokenBody,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    #[serde(default)]
    catalog: Vec<CatalogService>,
    project: Option<Project>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Project {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct ProjectList {
    #[serde(default)]
    projects: Vec<Project>,
}

/// An authenticated, project-scoped identity session.
#[derive(Debug, Clone)]
pub struct Session {
    transport: HttpTransport,
    identity: Endpoint,
    token: String,
    catalog: Vec<CatalogService>,
    project: Option<Project>,
    interface: String,
    region: Option<String>,
}

impl Session {
    /// Authenticates with the caller's environment, using the configured CA bundle and the
    /// compute timeout for every cloud request.
    pub fn from_env(config: &Config, env: &OpenstackEnv) -> Result<Self> {
        let timeout: u64 = config
            .get_parsed(TIMEOUT_SECTION, &format!("{}_timeout", TIMEOUT_SECTION))
            .context(error::ConfigSnafu)?;
        let ca_bundle = config.ca_bundle().context(error::ConfigSnafu)?;
        let transport = HttpTransport::new(Duration::from_secs(timeout), Some(&ca_bundle))
            .context(error::TransportSnafu {
                component: Component::Keystone,
            })?;
        Self::authenticate(transport, env)
    }

    pub fn authenticate(transport: HttpTransport, env: &OpenstackEnv) -> Result<Self> {
        Self::authenticate_with(transport, env, default_authenticator())
    }

    /// Like `authenticate`, with the authenticator used against the federation endpoint given
    /// explicitly. Every other request carries the session token only.
    pub fn authenticate_with(
        transport: HttpTransport,
        env: &OpenstackEnv,
        negotiator: Arc<dyn Authenticator + Send + Sync>,
    ) -> Result<Self> {
        env.validate().context(error::BadEnvironmentSnafu)?;
        let auth_url = env.auth_url().context(error::AuthSnafu {
            reason: "OS_AUTH_URL is not set",
        })?;
        let identity = Endpoint::parse(auth_url).context(error::UrlSnafu {
            component: Component::Keystone,
            url: auth_url,
        })?;
        let transport = transport.with_authenticator(Arc::new(Unauthenticated));

        let method = AuthMethod::from_env(env)?;
        let scope = project_scope(env)?;
        debug!("Authenticating against {} with {:?}", auth_url, method);
        let identity_body = match method {
            AuthMethod::Password => password_identity(env)?,
            AuthMethod::Kerberos => {
                let unscoped =
                    federated_token(&transport.clone().with_authenticator(negotiator), &identity, env)?;
                json!({"methods": ["token"], "token": {"id": unscoped}})
            }
        };
        let body = json!({"auth": {"identity": identity_body, "scope": scope}});

        let url = endpoint_url(&identity, &["auth", "tokens"])?;
        let response = transport
            .request(
                Method::POST,
                &url,
                &[("Accept", JSON), ("Content-Type", JSON)],
                Some(body.to_string()),
            )
            .context(error::TransportSnafu {
                component: Component::Keystone,
            })?;
        ensure!(
            response.status.is_success(),
            error::AuthSnafu {
                reason: format!(
                    "token request returned {}: {}",
                    response.status,
                    aihttp::printable_string(response.text.as_bytes())
                ),
            }
        );
        let token = subject_token(&response)?;
        let reply: TokenReply = serde_json::from_str(&response.text).context(error::JsonSnafu {
            component: Component::Keystone,
            what: "token",
        })?;
        if let Some(project) = &reply.token.project {
            info!("Authenticated to project '{}' ({})", project.name, project.id);
        }

        Ok(Self {
            transport,
            identity,
            token,
            catalog: reply.token.catalog,
            project: reply.token.project,
            interface: env.interface().trim_end_matches("URL").to_string(),
            region: env.region_name().map(str::to_string),
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// The project the token is scoped to.
    pub fn project(&self) -> Option<&Project> {
        self.project.as_ref()
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    pub fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    /// Looks up the catalog URL of a service type (`compute`, `volumev3`, `image`...) for the
    /// session's interface and region.
    pub fn endpoint_for(&self, service_type: &str) -> Result<Url> {
        let url = self
            .catalog
            .iter()
            .filter(|service| service.service_type == service_type)
            .flat_map(|service| service.endpoints.iter())
            .find(|endpoint| {
                endpoint.interface == self.interface
                    && self.region.as_ref().map_or(true, |region| {
                        endpoint.region.as_ref() == Some(region)
                            || endpoint.region_id.as_ref() == Some(region)
                    })
            })
            .map(|endpoint| endpoint.url.as_str())
            .context(error::NoEndpointSnafu {
                service_type,
                interface: &self.interface,
                region: self.region.clone(),
            })?;
        Endpoint::parse(url)
            .map(|endpoint| endpoint.base().clone())
            .context(error::UrlSnafu {
                component: Component::Keystone,
                url,
            })
    }

    /// Returns the id of the project called `name` among those `user` is a member of.
    pub fn project_uuid(&self, user: &str, name: &str) -> Result<String> {
        let url = endpoint_url(&self.identity, &["users", user, "projects"])?;
        let what = format!("projects of {}", user);
        let response = self.request(Component::Keystone, Method::GET, &url, None)?;
        let response = check(Component::Keystone, response, &what)?;
        let list: ProjectList = serde_json::from_str(&response.text).context(error::JsonSnafu {
            component: Component::Keystone,
            what: what.as_str(),
        })?;

        let mut matches: Vec<Project> = list
            .projects
            .into_iter()
            .filter(|project| project.name == name)
            .collect();
        let what = format!("project '{}' of {}", name, user);
        match matches.len() {
            0 => error::NotFoundSnafu {
                component: Component::Keystone,
                what,
            }
            .fail(),
            1 => Ok(matches.remove(0).id),
            count => error::AmbiguousSnafu {
                component: Component::Keystone,
                what,
                count,
            }
            .fail(),
        }
    }

    /// Sends a request carrying the session token.
    pub(crate) fn request(
        &self,
        component: Component,
        method: Method,
        url: &Url,
        body: Option<&Value>,
    ) -> Result<Response> {
        let mut headers = vec![(AUTH_TOKEN, self.token.as_str()), ("Accept", JSON)];
        if body.is_some() {
            headers.push(("Content-Type", JSON));
        }
        self.transport
            .request(method, url, &headers, body.map(Value::to_string))
            .context(error::TransportSnafu { component })
    }
}

pub(crate) fn endpoint_url(endpoint: &Endpoint, segments: &[&str]) -> Result<Url> {
    endpoint.url(segments).context(error::UrlSnafu {
        component: Component::Keystone,
        url: endpoint.base().as_str(),
    })
}

/// Passes 2xx responses through; 404 becomes NotFound and anything else an error with the body.
pub(crate) fn check(component: Component, response: Response, what: &str) -> Result<Response> {
    match response.status {
        status if status.is_success() => Ok(response),
        StatusCode::NOT_FOUND => error::NotFoundSnafu { component, what }.fail(),
        code => error::UnexpectedStatusSnafu {
            component,
            what,
            code,
            body: aihttp::printable_string(response.text.as_bytes()),
        }
        .fail(),
    }
}

fn subject_token(response: &Response) -> Result<String> {
    response
        .header(SUBJECT_TOKEN)
        .map(str::to_string)
        .context(error::AuthSnafu {
            reason: format!("no {} header in reply from {}", SUBJECT_TOKEN, response.url),
        })
}

fn password_identity(env: &OpenstackEnv) -> Result<Value> {
    let username = env.username().context(error::AuthSnafu {
        reason: "OS_USERNAME is not set",
    })?;
    let password = env.password().context(error::AuthSnafu {
        reason: "OS_PASSWORD is not set",
    })?;
    let domain = match env.user_domain_id() {
        Some(id) => json!({ "id": id }),
        None => json!({ "name": env.user_domain_name().unwrap_or(DEFAULT_DOMAIN) }),
    };
    Ok(json!({
        "methods": ["password"],
        "password": {"user": {"name": username, "domain": domain, "password": password}},
    }))
}

fn project_scope(env: &OpenstackEnv) -> Result<Value> {
    if let Some(id) = env.project_id() {
        return Ok(json!({"project": {"id": id}}));
    }
    let name = env.project_name().context(error::AuthSnafu {
        reason: "neither OS_PROJECT_NAME nor OS_PROJECT_ID is set",
    })?;
    let domain = match env.project_domain_id() {
        Some(id) => json!({ "id": id }),
        None => json!({ "name": env.project_domain_name().unwrap_or(DEFAULT_DOMAIN) }),
    };
    Ok(json!({"project": {"name": name, "domain": domain}}))
}

/// Gets an unscoped token from the federation endpoint, authenticating with `transport`'s
/// authenticator.
fn federated_token(
    transport: &HttpTransport,
    identity: &Endpoint,
    env: &OpenstackEnv,
) -> Result<String> {
    let provider = env
        .get("identity_provider")
        .unwrap_or(DEFAULT_IDENTITY_PROVIDER);
    let protocol = env.get("protocol").unwrap_or(DEFAULT_PROTOCOL);
    let url = endpoint_url(
        identity,
        &[
            "OS-FEDERATION",
            "identity_providers",
            provider,
            "protocols",
            protocol,
            "auth",
        ],
    )?;
    let response = transport
        .request(Method::GET, &url, &[("Accept", JSON)], None)
        .context(error::TransportSnafu {
            component: Component::Keystone,
        })?;
    ensure!(
        response.status.is_success(),
        error::AuthSnafu {
            reason: format!(
                "federated login returned {}: {}",
                response.status,
                aihttp::printable_string(response.text.as_bytes())
            ),
        }
    );
    subject_token(&response)
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;
    use httptest::{matchers::*, responders::*, Expectation, Server};

    pub(crate) const TOKEN: &str = "gAAAAABtoken";
    pub(crate) const PROJECT_ID: &str = "2c1f4a0e9d6b4e1c8e3f5a7b9d0c1e2f";

    pub(crate) fn transport() -> HttpTransport {
        HttpTransport::new(Duration::from_secs(5), None).unwrap()
    }

    pub(crate) fn env_vars(server: &Server) -> Vec<(String, String)> {
        [
            ("OS_AUTH_URL", server.url_str("/v3")),
            ("OS_IDENTITY_API_VERSION", "3".to_string()),
            ("OS_PROJECT_NAME", "Personal jdoe".to_string()),
            ("OS_PROJECT_DOMAIN_ID", "default".to_string()),
            ("OS_USER_DOMAIN_NAME", "Default".to_string()),
            ("OS_USERNAME", "jdoe".to_string()),
            ("OS_PASSWORD", "secret".to_string()),
            ("OS_REGION_NAME", "cern".to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    pub(crate) fn catalog(server: &Server) -> Value {
        catalog_with_image(server, "/")
    }

    pub(crate) fn catalog_with_image(server: &Server, image_path: &str) -> Value {
        json!([
            {"type": "identity", "endpoints": [
                {"interface": "public", "region": "cern", "region_id": "cern", "url": server.url_str("/v3")},
            ]},
            {"type": "compute", "endpoints": [
                {"interface": "internal", "region": "cern", "url": "http://internal.invalid/compute"},
                {"interface": "public", "region": "other", "url": "http://other.invalid/compute"},
                {"interface": "public", "region": "cern", "url": server.url_str("/compute/v2.1")},
            ]},
            {"type": "volumev3", "endpoints": [
                {"interface": "public", "region": "cern", "url": server.url_str(&format!("/volume/v3/{}", PROJECT_ID))},
            ]},
            {"type": "image", "endpoints": [
                {"interface": "public", "region": "cern", "url": server.url_str(image_path)},
            ]},
        ])
    }

    pub(crate) fn token_reply(server: &Server) -> impl httptest::responders::Responder {
        token_reply_with(catalog(server))
    }

    fn token_reply_with(catalog: Value) -> impl httptest::responders::Responder {
        status_code(201)
            .append_header("Content-Type", JSON)
            .append_header(SUBJECT_TOKEN, TOKEN)
            .body(
                json!({"token": {
                    "catalog": catalog,
                    "project": {"id": PROJECT_ID, "name": "Personal jdoe"},
                }})
                .to_string(),
            )
    }

    /// A password-authenticated session whose catalog points at `server`.
    pub(crate) fn session(server: &Server) -> Session {
        session_with_catalog(server, catalog(server))
    }

    pub(crate) fn session_with_catalog(server: &Server, catalog: Value) -> Session {
        server.expect(
            Expectation::matching(request::method_path("POST", "/v3/auth/tokens"))
                .respond_with(token_reply_with(catalog)),
        );
        Session::authenticate_with(
            transport(),
            &OpenstackEnv::from_vars(env_vars(server)),
            Arc::new(Unauthenticated),
        )
        .unwrap()
    }
}
