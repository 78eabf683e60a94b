//! Client for the secret store, which keeps secrets per host or hostgroup.

use crate::error::{self, Result};
use crate::http::ServiceHttp;
use crate::scope::Scope;
use aiconfig::{Config, Service};
use aihttp::Method;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use snafu::{ensure, ResultExt};

const ROOT: [&str; 2] = ["tbag", "v2"];
const TREE: &str = "hosttree";
const BASE64_ENCODING: &str = "b64";

#[derive(Debug, Serialize, Deserialize)]
struct SecretBody {
    secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    encoding: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TbagClient {
    http: ServiceHttp,
}

impl TbagClient {
    pub fn new(config: &Config, dryrun: bool) -> Result<Self> {
        Ok(Self::from_http(ServiceHttp::new(config, Service::Tbag, dryrun)?))
    }

    pub fn from_http(http: ServiceHttp) -> Self {
        Self { http }
    }

    fn check_scope(scope: Scope) -> Result<()> {
        ensure!(
            matches!(scope, Scope::Host | Scope::Hostgroup),
            error::InvalidInputSnafu {
                service: Service::Tbag,
                reason: format!("secrets can't be kept per {}", scope),
            }
        );
        Ok(())
    }

    fn secret_url(&self, scope_name: &str, entity: &str, key: Option<&str>) -> Result<url::Url> {
        let mut segments: Vec<&str> = ROOT.to_vec();
        segments.extend([scope_name, entity, "secret"]);
        // The listing lives under a trailing slash.
        segments.push(key.unwrap_or(""));
        self.http.url(&segments)
    }

    /// Names of the secrets stored for the entity.
    pub fn get_keys(&self, scope: Scope, entity: &str) -> Result<Vec<String>> {
        Self::check_scope(scope)?;
        let entity = scope.wire_entity(entity);
        let url = self.secret_url(scope.as_str(), &entity, None)?;
        self.http
            .get_json(&url, &format!("secrets of {} {}", scope, entity))
    }

    pub fn get_key(&self, scope: Scope, entity: &str, key: &str) -> Result<Vec<u8>> {
        Self::check_scope(scope)?;
        let entity = scope.wire_entity(entity);
        let url = self.secret_url(scope.as_str(), &entity, Some(key))?;
        self.read_secret(&url, key, &format!("secret {} of {} {}", key, scope, entity))
    }

    /// Looks the key up on the host first and then up its hostgroup hierarchy.
    pub fn get_from_tree(&self, host: &str, key: &str) -> Result<Vec<u8>> {
        let url = self.secret_url(TREE, host, Some(key))?;
        self.read_secret(&url, key, &format!("secret {} in tree of {}", key, host))
    }

    fn read_secret(&self, url: &url::Url, key: &str, what: &str) -> Result<Vec<u8>> {
        let body: SecretBody = self.http.get_json(url, what)?;
        match body.encoding.as_deref() {
            Some(BASE64_ENCODING) => STANDARD.decode(body.secret.trim()).context(
                error::Base64Snafu {
                    service: Service::Tbag,
                    key,
                },
            ),
            _ => Ok(body.secret.into_bytes()),
        }
    }

    /// Stores a secret. Values that aren't UTF-8 have to be sent base64-encoded.
    pub fn add_key(
        &self,
        scope: Scope,
        entity: &str,
        key: &str,
        value: &[u8],
        b64: bool,
    ) -> Result<()> {
        Self::check_scope(scope)?;
        let body = if b64 {
            SecretBody {
                secret: STANDARD.encode(value),
                encoding: Some(BASE64_ENCODING.to_string()),
            }
        } else {
            let secret = String::from_utf8(value.to_vec()).map_err(|_| {
                error::Error::InvalidInput {
                    service: Service::Tbag,
                    reason: format!("value of {} is not UTF-8, store it base64-encoded", key),
                }
            })?;
            SecretBody {
                secret,
                encoding: None,
            }
        };
        let entity = scope.wire_entity(entity);
        let url = self.secret_url(scope.as_str(), &entity, Some(key))?;
        if let Some(response) = self.http.write(Method::POST, &url, Some(&body))? {
            self.http
                .check(response, &format!("secret {} of {} {}", key, scope, entity))?;
        }
        Ok(())
    }

    pub fn delete_key(&self, scope: Scope, entity: &str, key: &str) -> Result<()> {
        Self::check_scope(scope)?;
        let entity = scope.wire_entity(entity);
        let url = self.secret_url(scope.as_str(), &entity, Some(key))?;
        if let Some(response) = self.http.write(Method::DELETE, &url, None::<&()>)? {
            self.http
                .check(response, &format!("secret {} of {} {}", key, scope, entity))?;
        }
        Ok(())
    }
}
