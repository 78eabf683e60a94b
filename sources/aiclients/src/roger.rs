//! Client for the alarm/state service, which records whether each of a host's alarm categories is
//! enabled and a free-form application state.

use crate::error::{self, Result};
use crate::http::ServiceHttp;
use aiconfig::{Config, Service};
use aihttp::Method;
use serde::Deserialize;
use serde_json::{Map, Value};
use snafu::ensure;

pub const ALARM_FIELDS: [&str; 4] = ["nc_alarmed", "hw_alarmed", "os_alarmed", "app_alarmed"];

/// A host's recorded state.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct State {
    pub hostname: String,
    #[serde(default)]
    pub appstate: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub nc_alarmed: bool,
    #[serde(default)]
    pub hw_alarmed: bool,
    #[serde(default)]
    pub os_alarmed: bool,
    #[serde(default)]
    pub app_alarmed: bool,
}

/// Fields to change. Alarm values are given as text and must read as a boolean.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateUpdate {
    pub appstate: Option<String>,
    pub message: Option<String>,
    pub nc_alarmed: Option<String>,
    pub hw_alarmed: Option<String>,
    pub os_alarmed: Option<String>,
    pub app_alarmed: Option<String>,
}

impl StateUpdate {
    /// Builds the request body, containing only the fields that were set.
    pub fn to_body(&self) -> Result<Map<String, Value>> {
        let mut body = Map::new();
        if let Some(appstate) = &self.appstate {
            body.insert("appstate".into(), Value::from(appstate.as_str()));
        }
        if let Some(message) = &self.message {
            body.insert("message".into(), Value::from(message.as_str()));
        }
        let alarms = [
            &self.nc_alarmed,
            &self.hw_alarmed,
            &self.os_alarmed,
            &self.app_alarmed,
        ];
        for (field, value) in ALARM_FIELDS.iter().zip(alarms) {
            if let Some(value) = value {
                body.insert(field.to_string(), Value::Bool(coerce_bool(field, value)?));
            }
        }
        Ok(body)
    }
}

/// Accepts `1`/`true` and `0`/`false` in any case.
pub fn coerce_bool(field: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => error::InvalidInputSnafu {
            service: Service::Roger,
            reason: format!("{} must be true or false, not '{}'", field, value),
        }
        .fail(),
    }
}

#[derive(Debug, Clone)]
pub struct RogerClient {
    http: ServiceHttp,
}

impl RogerClient {
    pub fn new(config: &Config, dryrun: bool) -> Result<Self> {
        Ok(Self::from_http(ServiceHttp::new(
            config,
            Service::Roger,
            dryrun,
        )?))
    }

    pub fn from_http(http: ServiceHttp) -> Self {
        Self { http }
    }

    fn state_url(&self, hostname: &str) -> Result<url::Url> {
        self.http.url(&["roger", "v1", "state", hostname, ""])
    }

    pub fn get_state(&self, hostname: &str) -> Result<State> {
        let url = self.state_url(hostname)?;
        self.http.get_json(&url, &format!("state of {}", hostname))
    }

    pub fn put_state(&self, hostname: &str, update: &StateUpdate) -> Result<()> {
        let body = update.to_body()?;
        ensure!(
            !body.is_empty(),
            error::InvalidInputSnafu {
                service: Service::Roger,
                reason: format!("nothing to update for {}", hostname),
            }
        );
        let url = self.state_url(hostname)?;
        if let Some(response) = self.http.write(Method::PUT, &url, Some(&body))? {
            self.http
                .check(response, &format!("state of {}", hostname))?;
        }
        Ok(())
    }

    pub fn delete_state(&self, hostname: &str) -> Result<()> {
        let url = self.state_url(hostname)?;
        if let Some(response) = self.http.write(Method::DELETE, &url, None::<&()>)? {
            self.http
                .check(response, &format!("state of {}", hostname))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::http::test_util::service_http;
    use aihttp::ErrorKind;
    use httptest::{matchers::*, responders::*, Expectation, Server};
    use serde_json::json;

    fn client(server: &Server, dryrun: bool) -> RogerClient {
        RogerClient::from_http(service_http(server, Service::Roger, dryrun))
    }

    #[test]
    fn coercion() {
        for value in ["1", "true", "True", " TRUE "] {
            assert!(coerce_bool("nc_alarmed", value).unwrap());
        }
        for value in ["0", "false", "False"] {
            assert!(!coerce_bool("nc_alarmed", value).unwrap());
        }
        for value in ["yes", "", "bogus"] {
            assert_eq!(
                coerce_bool("nc_alarmed", value).unwrap_err().kind(),
                ErrorKind::InvalidInput
            );
        }
    }

    #[test]
    fn put_selected_fields() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("PUT", "/roger/v1/state/foo.example.org/"),
                request::body(json_decoded(eq(json!({"nc_alarmed": false, "message": "M"})))),
            ])
            .respond_with(json_encoded(json!({"hostname": "foo.example.org"}))),
        );
        let update = StateUpdate {
            nc_alarmed: Some("False".to_string()),
            message: Some("M".to_string()),
            ..Default::default()
        };
        client(&server, false)
            .put_state("foo.example.org", &update)
            .unwrap();
    }

    #[test]
    fn bogus_alarm_sends_nothing() {
        let server = Server::run();
        let update = StateUpdate {
            nc_alarmed: Some("bogus".to_string()),
            ..Default::default()
        };
        assert_eq!(
            client(&server, false)
                .put_state("foo.example.org", &update)
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidInput
        );
    }

    #[test]
    fn get_state() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path(
                "GET",
                "/roger/v1/state/foo.example.org/",
            ))
            .respond_with(json_encoded(json!({
                "hostname": "foo.example.org",
                "appstate": "production",
                "nc_alarmed": true,
                "hw_alarmed": false,
                "os_alarmed": true,
                "app_alarmed": false,
                "expires": null,
            }))),
        );
        let state = client(&server, false).get_state("foo.example.org").unwrap();
        assert_eq!(state.appstate.as_deref(), Some("production"));
        assert!(state.nc_alarmed);
        assert!(!state.hw_alarmed);
    }

    #[test]
    fn dryrun() {
        let server = Server::run();
        let client = client(&server, true);
        let update = StateUpdate {
            appstate: Some("disabled".to_string()),
            ..Default::default()
        };
        client.put_state("foo.example.org", &update).unwrap();
        client.delete_state("foo.example.org").unwrap();
    }
}
