//! Compute client.
//!
//! Servers are named after the short name of their FQDN, and looked up the same way.

use crate::api::ServiceApi;
use crate::error::{self, Component, Result};
use crate::glance::{GlanceClient, Image, ImageQuery};
use crate::session::Session;
use aienv::dns::shortify;
use aihttp::Method;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::info;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use snafu::OptionExt;
use std::collections::BTreeMap;

const DEVICE_PREFIX: &str = "/dev/";

/// Yields the names guests see for attached disks: `vdb` through `vdz`. `vda` is the root disk.
#[derive(Debug, Clone)]
pub struct DeviceNames {
    next: u8,
}

impl Default for DeviceNames {
    fn default() -> Self {
        Self { next: b'b' }
    }
}

impl Iterator for DeviceNames {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.next > b'z' {
            return None;
        }
        let letter = self.next as char;
        self.next += 1;
        Some(format!("vd{}", letter))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Server {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: String,
    /// An object with the image id, or an empty string for servers booted from a volume.
    #[serde(default)]
    image: Value,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub addresses: Value,
}

impl Server {
    pub fn image_id(&self) -> Option<&str> {
        self.image
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct ServerReply {
    server: Server,
}

#[derive(Debug, Deserialize)]
struct ServerSummary {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ServerList {
    #[serde(default)]
    servers: Vec<ServerSummary>,
}

#[derive(Debug, Deserialize)]
struct Flavor {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct FlavorList {
    #[serde(default)]
    flavors: Vec<Flavor>,
}

#[derive(Debug, Deserialize)]
struct CreatedServer {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CreatedReply {
    server: CreatedServer,
}

/// Optional parameters of `boot`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootOptions {
    pub key_name: Option<String>,
    pub availability_zone: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct NovaClient {
    api: ServiceApi,
    dryrun: bool,
}

impl NovaClient {
    pub fn new(session: &Session, dryrun: bool) -> Result<Self> {
        Ok(Self {
            api: ServiceApi::new(session, Component::Nova, &["compute"])?,
            dryrun,
        })
    }

    /// Resolves a flavor given by name or id.
    fn flavor_id(&self, flavor: &str) -> Result<String> {
        let url = self.api.url(&["flavors"])?;
        let list: FlavorList = self.api.get_json(&url, "flavor list")?;
        list.flavors
            .into_iter()
            .find(|f| f.name == flavor || f.id == flavor)
            .map(|f| f.id)
            .context(error::NotFoundSnafu {
                component: Component::Nova,
                what: format!("flavor '{}'", flavor),
            })
    }

    /// Boots a server named after the short name of `fqdn`. Returns the new server's id, or None
    /// in dry-run mode.
    pub fn boot(
        &self,
        fqdn: &str,
        flavor: &str,
        image: &str,
        userdata: &str,
        options: &BootOptions,
    ) -> Result<Option<String>> {
        let name = shortify(fqdn);
        let flavor_id = self.flavor_id(flavor)?;

        let mut server = Map::new();
        server.insert("name".to_string(), json!(name));
        server.insert("flavorRef".to_string(), json!(flavor_id));
        server.insert("imageRef".to_string(), json!(image));
        server.insert("user_data".to_string(), json!(STANDARD.encode(userdata)));
        if let Some(key_name) = &options.key_name {
            server.insert("key_name".to_string(), json!(key_name));
        }
        if let Some(zone) = &options.availability_zone {
            server.insert("availability_zone".to_string(), json!(zone));
        }
        if !options.metadata.is_empty() {
            server.insert("metadata".to_string(), json!(options.metadata));
        }

        if self.dryrun {
            info!("Dry run: not booting {} ({}, image {})", name, flavor, image);
            return Ok(None);
        }
        let url = self.api.url(&["servers"])?;
        let what = format!("boot of {}", name);
        let response = self
            .api
            .send(Method::POST, &url, Some(&json!({ "server": server })))?;
        let response = self.api.check(response, &what)?;
        let reply: CreatedReply = self.api.json(&response, &what)?;
        info!("Booted {} as server {}", name, reply.server.id);
        Ok(Some(reply.server.id))
    }

    /// Finds the server named after `fqdn`.
    pub fn get_server(&self, fqdn: &str) -> Result<Server> {
        let name = shortify(fqdn);
        let pattern = format!("^{}$", name);
        let url = self
            .api
            .url_with_query(&["servers"], &[("name", pattern.as_str())])?;
        let list: ServerList = self.api.get_json(&url, "server list")?;
        // The name filter is a regular expression, so check for an exact match.
        let mut matching: Vec<ServerSummary> = list
            .servers
            .into_iter()
            .filter(|server| server.name == name)
            .collect();
        let what = format!("server {}", name);
        let summary = match matching.len() {
            0 => {
                return error::NotFoundSnafu {
                    component: Component::Nova,
                    what,
                }
                .fail()
            }
            1 => matching.remove(0),
            count => {
                return error::AmbiguousSnafu {
                    component: Component::Nova,
                    what,
                    count,
                }
                .fail()
            }
        };

        let url = self.api.url(&["servers", &summary.id])?;
        let reply: ServerReply = self.api.get_json(&url, &what)?;
        Ok(reply.server)
    }

    pub fn delete(&self, fqdn: &str) -> Result<()> {
        let server = self.get_server(fqdn)?;
        if self.dryrun {
            info!("Dry run: not deleting server {} ({})", server.name, server.id);
            return Ok(());
        }
        let url = self.api.url(&["servers", &server.id])?;
        let response = self.api.send(Method::DELETE, &url, None)?;
        self.api
            .check(response, &format!("deletion of {}", server.name))?;
        info!("Deleted server {} ({})", server.name, server.id);
        Ok(())
    }

    /// Rebuilds the server from `image`, or from the image it currently runs if none is given.
    /// Servers booted from a volume have no image and are refused.
    pub fn rebuild(&self, fqdn: &str, image: Option<&str>) -> Result<()> {
        let server = self.get_server(fqdn)?;
        let image = match image {
            Some(image) => image.to_string(),
            None => server
                .image_id()
                .map(str::to_string)
                .context(error::VolumeBackedSnafu { name: &server.name })?,
        };
        if self.dryrun {
            info!("Dry run: not rebuilding {} from image {}", server.name, image);
            return Ok(());
        }
        let url = self.api.url(&["servers", &server.id, "action"])?;
        let response = self.api.send(
            Method::POST,
            &url,
            Some(&json!({"rebuild": {"imageRef": image}})),
        )?;
        self.api
            .check(response, &format!("rebuild of {}", server.name))?;
        info!("Rebuilding {} from image {}", server.name, image);
        Ok(())
    }

    /// Attaches a volume to the server, at `device` if given (`vdc` or `/dev/vdc`), otherwise
    /// wherever the hypervisor picks.
    pub fn attach_volume(&self, fqdn: &str, volume_id: &str, device: Option<&str>) -> Result<()> {
        let server = self.get_server(fqdn)?;
        let mut attachment = Map::new();
        attachment.insert("volumeId".to_string(), json!(volume_id));
        if let Some(device) = device {
            let device = if device.starts_with(DEVICE_PREFIX) {
                device.to_string()
            } else {
                format!("{}{}", DEVICE_PREFIX, device)
            };
            attachment.insert("device".to_string(), json!(device));
        }
        if self.dryrun {
            info!("Dry run: not attaching volume {} to {}", volume_id, server.name);
            return Ok(());
        }
        let url = self
            .api
            .url(&["servers", &server.id, "os-volume_attachments"])?;
        let response = self.api.send(
            Method::POST,
            &url,
            Some(&json!({ "volumeAttachment": attachment })),
        )?;
        self.api.check(
            response,
            &format!("attachment of {} to {}", volume_id, server.name),
        )?;
        info!("Attached volume {} to {}", volume_id, server.name);
        Ok(())
    }

    /// The latest public image for a distribution, see [`crate::glance::select_latest`].
    pub fn get_latest_image(&self, query: &ImageQuery) -> Result<Image> {
        GlanceClient::new(self.api.session())?.get_latest_image(query)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::session::test_util::session;
    use aihttp::ErrorKind;
    use httptest::{matchers::*, responders::*, Expectation, Server as HttpServer};

    fn server_json(image: Value) -> Value {
        json!({"server": {
            "id": "s1",
            "name": "foo",
            "status": "ACTIVE",
            "image": image,
            "metadata": {"landb-mainuser": "ai-team"},
        }})
    }

    fn expect_lookup(server: &HttpServer, image: Value) {
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/compute/v2.1/servers"),
                request::query(url_decoded(contains(("name", "^foo$")))),
            ])
            .respond_with(json_encoded(json!({"servers": [
                {"id": "s1", "name": "foo"},
                {"id": "s2", "name": "foo-old"},
            ]}))),
        );
        server.expect(
            Expectation::matching(request::method_path("GET", "/compute/v2.1/servers/s1"))
                .respond_with(json_encoded(server_json(image))),
        );
    }

    #[test]
    fn device_names() {
        let names: Vec<String> = DeviceNames::default().collect();
        assert_eq!(names.len(), 25);
        assert_eq!(names.first().map(String::as_str), Some("vdb"));
        assert_eq!(names.last().map(String::as_str), Some("vdz"));
        assert!(!names.contains(&"vda".to_string()));
        let mut sorted = names.clone();
        sorted.dedup();
        assert_eq!(sorted, names);
    }

    #[test]
    fn boot() {
        let server = HttpServer::run();
        let nova = NovaClient::new(&session(&server), false).unwrap();
        server.expect(
            Expectation::matching(request::method_path("GET", "/compute/v2.1/flavors"))
                .respond_with(json_encoded(json!({"flavors": [
                    {"id": "f1", "name": "m2.small"},
                    {"id": "f2", "name": "m2.large"},
                ]}))),
        );
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/compute/v2.1/servers"),
                request::body(json_decoded(eq(json!({"server": {
                    "name": "foo",
                    "flavorRef": "f2",
                    "imageRef": "img-1",
                    "user_data": "IyEvYmluL3NoCg==",
                    "availability_zone": "cern-geneva-a",
                }})))),
            ])
            .respond_with(status_code(202).body(json!({"server": {"id": "s9"}}).to_string())),
        );
        let options = BootOptions {
            availability_zone: Some("cern-geneva-a".to_string()),
            ..Default::default()
        };
        let id = nova
            .boot("foo.cern.ch", "m2.large", "img-1", "#!/bin/sh\n", &options)
            .unwrap();
        assert_eq!(id.as_deref(), Some("s9"));
    }

    #[test]
    fn boot_unknown_flavor() {
        let server = HttpServer::run();
        let nova = NovaClient::new(&session(&server), false).unwrap();
        server.expect(
            Expectation::matching(request::method_path("GET", "/compute/v2.1/flavors"))
                .respond_with(json_encoded(json!({"flavors": []}))),
        );
        let err = nova
            .boot("foo.cern.ch", "m9.huge", "img-1", "", &BootOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn boot_dryrun() {
        let server = HttpServer::run();
        let nova = NovaClient::new(&session(&server), true).unwrap();
        server.expect(
            Expectation::matching(request::method_path("GET", "/compute/v2.1/flavors"))
                .respond_with(json_encoded(json!({"flavors": [{"id": "f1", "name": "m2.small"}]}))),
        );
        let id = nova
            .boot("foo.cern.ch", "m2.small", "img-1", "", &BootOptions::default())
            .unwrap();
        assert_eq!(id, None);
    }

    #[test]
    fn missing_server() {
        let server = HttpServer::run();
        let nova = NovaClient::new(&session(&server), false).unwrap();
        server.expect(
            Expectation::matching(request::method_path("GET", "/compute/v2.1/servers"))
                .respond_with(json_encoded(json!({"servers": [{"id": "s2", "name": "foo-old"}]}))),
        );
        assert_eq!(
            nova.get_server("foo.cern.ch").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn rebuild_reuses_image() {
        let server = HttpServer::run();
        let nova = NovaClient::new(&session(&server), false).unwrap();
        expect_lookup(&server, json!({"id": "img-7"}));
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/compute/v2.1/servers/s1/action"),
                request::body(json_decoded(eq(json!({"rebuild": {"imageRef": "img-7"}})))),
            ])
            .respond_with(status_code(202)),
        );
        nova.rebuild("foo.cern.ch", None).unwrap();
    }

    #[test]
    fn rebuild_explicit_image() {
        let server = HttpServer::run();
        let nova = NovaClient::new(&session(&server), false).unwrap();
        expect_lookup(&server, json!(""));
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/compute/v2.1/servers/s1/action"),
                request::body(json_decoded(eq(json!({"rebuild": {"imageRef": "img-8"}})))),
            ])
            .respond_with(status_code(202)),
        );
        nova.rebuild("foo.cern.ch", Some("img-8")).unwrap();
    }

    #[test]
    fn rebuild_volume_backed_refused() {
        let server = HttpServer::run();
        let nova = NovaClient::new(&session(&server), false).unwrap();
        expect_lookup(&server, json!(""));
        let err = nova.rebuild("foo.cern.ch", None).unwrap_err();
        assert!(matches!(err, error::Error::VolumeBacked { .. }));
        assert_eq!(err.exit_code(), aiconfig::exit::PRECONDITION);
    }

    #[test]
    fn attach_volume() {
        let server = HttpServer::run();
        let nova = NovaClient::new(&session(&server), false).unwrap();
        expect_lookup(&server, json!({"id": "img-7"}));
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/compute/v2.1/servers/s1/os-volume_attachments"),
                request::body(json_decoded(eq(json!({"volumeAttachment": {
                    "volumeId": "v1",
                    "device": "/dev/vdb",
                }})))),
            ])
            .respond_with(json_encoded(json!({"volumeAttachment": {"id": "a1"}}))),
        );
        let device = DeviceNames::default().next();
        nova.attach_volume("foo.cern.ch", "v1", device.as_deref())
            .unwrap();
    }

    #[test]
    fn delete_dryrun_only_looks() {
        let server = HttpServer::run();
        let nova = NovaClient::new(&session(&server), true).unwrap();
        expect_lookup(&server, json!({"id": "img-7"}));
        nova.delete("foo.cern.ch").unwrap();
    }

    #[test]
    fn delete() {
        let server = HttpServer::run();
        let nova = NovaClient::new(&session(&server), false).unwrap();
        expect_lookup(&server, json!({"id": "img-7"}));
        server.expect(
            Expectation::matching(request::method_path("DELETE", "/compute/v2.1/servers/s1"))
                .respond_with(status_code(204)),
        );
        nova.delete("foo.cern.ch").unwrap();
    }
}
