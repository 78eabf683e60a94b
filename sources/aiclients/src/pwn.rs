//! Client for the ownership service, which maps a module or hostgroup to the people and groups
//! responsible for it.
//!
//! Owner names are canonicalised before they're sent: surrounding whitespace and any `@REALM`
//! suffix are removed, the name is lowercased, and duplicates are dropped keeping the first.

use crate::error::{self, Result};
use crate::http::ServiceHttp;
use crate::scope::Scope;
use aiconfig::{Config, Service};
use aihttp::{ErrorKind, Method, StatusCode};
use indexmap::IndexSet;
use log::info;
use serde::{Deserialize, Serialize};
use snafu::ensure;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ownership {
    pub scope: String,
    pub entity: String,
    #[serde(default)]
    pub owners: Vec<String>,
}

#[derive(Debug, Serialize)]
struct OwnersBody<'a> {
    owners: &'a [String],
}

/// Canonicalises one owner name.
pub fn canonical_owner(owner: &str) -> String {
    let owner = owner.trim();
    let owner = owner.split('@').next().unwrap_or(owner);
    owner.trim().to_lowercase()
}

/// Canonicalises a list of owners, dropping empty names and duplicates.
pub fn canonical_owners<I, S>(owners: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    owners
        .into_iter()
        .map(|owner| canonical_owner(owner.as_ref()))
        .filter(|owner| !owner.is_empty())
        .collect::<IndexSet<String>>()
        .into_iter()
        .collect()
}

#[derive(Debug, Clone)]
pub struct PwnClient {
    http: ServiceHttp,
}

impl PwnClient {
    pub fn new(config: &Config, dryrun: bool) -> Result<Self> {
        Ok(Self::from_http(ServiceHttp::new(config, Service::Pwn, dryrun)?))
    }

    pub fn from_http(http: ServiceHttp) -> Self {
        Self { http }
    }

    fn check_write_scope(scope: Scope) -> Result<()> {
        ensure!(
            matches!(scope, Scope::Module | Scope::Hostgroup),
            error::InvalidInputSnafu {
                service: Service::Pwn,
                reason: format!("ownership can't be set per {}", scope),
            }
        );
        Ok(())
    }

    fn owner_url(&self, scope: Scope, entity: &str) -> Result<url::Url> {
        self.http
            .url(&["pwn", "v1", "owner", scope.as_str(), entity, ""])
    }

    pub fn get_ownership(&self, scope: Scope, entity: &str) -> Result<Ownership> {
        let entity = scope.wire_entity(entity);
        let url = self.owner_url(scope, &entity)?;
        self.http
            .get_json(&url, &format!("ownership of {} {}", scope, entity))
    }

    pub fn create_ownership(&self, scope: Scope, entity: &str, owners: &[String]) -> Result<()> {
        Self::check_write_scope(scope)?;
        let body = Ownership {
            scope: scope.as_str().to_string(),
            entity: scope.wire_entity(entity),
            owners: canonical_owners(owners),
        };
        let what = format!("ownership of {} {}", scope, body.entity);
        let url = self.http.url(&["pwn", "v1", "owner", ""])?;
        if let Some(response) = self.http.write(Method::POST, &url, Some(&body))? {
            ensure!(
                response.status != StatusCode::CONFLICT,
                error::AlreadyExistsSnafu {
                    service: Service::Pwn,
                    what,
                }
            );
            self.http.check(response, &what)?;
            info!("Created {} with owners {:?}", what, body.owners);
        }
        Ok(())
    }

    /// Replaces the owner list.
    pub fn put_ownership(&self, scope: Scope, entity: &str, owners: &[String]) -> Result<()> {
        Self::check_write_scope(scope)?;
        let entity = scope.wire_entity(entity);
        let owners = canonical_owners(owners);
        let what = format!("ownership of {} {}", scope, entity);
        let url = self.owner_url(scope, &entity)?;
        let body = OwnersBody { owners: &owners };
        if let Some(response) = self.http.write(Method::PUT, &url, Some(&body))? {
            self.http.check(response, &what)?;
            info!("Set {} to {:?}", what, owners);
        }
        Ok(())
    }

    pub fn update_or_create_ownership(
        &self,
        scope: Scope,
        entity: &str,
        owners: &[String],
    ) -> Result<()> {
        match self.get_ownership(scope, entity) {
            Ok(_) => self.put_ownership(scope, entity, owners),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.create_ownership(scope, entity, owners)
            }
            Err(e) => Err(e),
        }
    }

    /// Appends owners after the existing ones.
    pub fn add_owners(&self, scope: Scope, entity: &str, owners: &[String]) -> Result<()> {
        let current = self.get_ownership(scope, entity)?;
        let merged = canonical_owners(current.owners.iter().chain(owners));
        self.put_ownership(scope, entity, &merged)
    }

    pub fn remove_owners(&self, scope: Scope, entity: &str, owners: &[String]) -> Result<()> {
        let current = self.get_ownership(scope, entity)?;
        let removed = canonical_owners(owners);
        let remaining: Vec<String> = canonical_owners(&current.owners)
            .into_iter()
            .filter(|owner| !removed.contains(owner))
            .collect();
        self.put_ownership(scope, entity, &remaining)
    }

    pub fn delete_ownership(&self, scope: Scope, entity: &str) -> Result<()> {
        Self::check_write_scope(scope)?;
        let entity = scope.wire_entity(entity);
        let url = self.owner_url(scope, &entity)?;
        if let Some(response) = self.http.write(Method::DELETE, &url, None::<&()>)? {
            self.http
                .check(response, &format!("ownership of {} {}", scope, entity))?;
        }
        Ok(())
    }
}
