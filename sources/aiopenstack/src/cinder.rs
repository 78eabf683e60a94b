//! Block volume client.

use crate::api::ServiceApi;
use crate::error::{self, Component, Result};
use crate::session::Session;
use aihttp::Method;
use lazy_static::lazy_static;
use log::{debug, info};
use poll_until::{poll, Budget};
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use snafu::{ensure, OptionExt};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Catalog types of the volume service, newest API first.
const SERVICE_TYPES: &[&str] = &["volumev3", "volumev2", "volume"];
const GB_PER_TB: u64 = 1024;
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_READY_WAIT: Duration = Duration::from_secs(5);

lazy_static! {
    static ref SIZE: Regex = Regex::new(r"^([1-9][0-9]*)(GB|TB)$").unwrap();
}

/// Whether `size` is written as `<N>GB` or `<N>TB` with N a positive integer.
pub fn is_valid_size_format(size: &str) -> bool {
    SIZE.is_match(size)
}

/// A volume size in gigabytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeSize(u64);

impl VolumeSize {
    pub fn gigabytes(&self) -> u64 {
        self.0
    }
}

impl From<u64> for VolumeSize {
    fn from(gigabytes: u64) -> Self {
        Self(gigabytes)
    }
}

impl FromStr for VolumeSize {
    type Err = error::Error;

    fn from_str(size: &str) -> Result<Self> {
        let captures = SIZE
            .captures(size)
            .context(error::InvalidSizeSnafu { size })?;
        let number: u64 = captures[1]
            .parse()
            .ok()
            .context(error::InvalidSizeSnafu { size })?;
        let gigabytes = match &captures[2] {
            "TB" => number
                .checked_mul(GB_PER_TB)
                .context(error::InvalidSizeSnafu { size })?,
            _ => number,
        };
        Ok(Self(gigabytes))
    }
}

impl fmt::Display for VolumeSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}GB", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Volume {
    pub id: String,
    #[serde(default)]
    pub status: String,
    /// The service reports this as the string `"true"` or `"false"`.
    #[serde(default)]
    pub bootable: String,
    pub name: Option<String>,
    #[serde(default)]
    pub size: u64,
}

impl Volume {
    pub fn is_ready(&self, needs_to_be_bootable: bool) -> bool {
        self.status == "available" && (!needs_to_be_bootable || self.bootable == "true")
    }
}

#[derive(Debug, Deserialize)]
struct VolumeReply {
    volume: Volume,
}

/// Parameters of a new volume; only the size is required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVolume {
    pub size: VolumeSize,
    pub name: Option<String>,
    pub description: Option<String>,
    pub volume_type: Option<String>,
    pub image_ref: Option<String>,
}

impl NewVolume {
    pub fn new<S: Into<VolumeSize>>(size: S) -> Self {
        Self {
            size: size.into(),
            name: None,
            description: None,
            volume_type: None,
            image_ref: None,
        }
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_volume_type<S: Into<String>>(mut self, volume_type: S) -> Self {
        self.volume_type = Some(volume_type.into());
        self
    }

    pub fn with_image_ref<S: Into<String>>(mut self, image_ref: S) -> Self {
        self.image_ref = Some(image_ref.into());
        self
    }

    fn to_body(&self) -> Value {
        let mut volume = Map::new();
        volume.insert("size".to_string(), json!(self.size.gigabytes()));
        for (key, value) in [
            ("name", &self.name),
            ("description", &self.description),
            ("volume_type", &self.volume_type),
            ("imageRef", &self.image_ref),
        ] {
            if let Some(value) = value {
                volume.insert(key.to_string(), json!(value));
            }
        }
        json!({ "volume": volume })
    }
}

#[derive(Debug, Clone)]
pub struct CinderClient {
    api: ServiceApi,
    dryrun: bool,
}

impl CinderClient {
    pub fn new(session: &Session, dryrun: bool) -> Result<Self> {
        Ok(Self {
            api: ServiceApi::new(session, Component::Cinder, SERVICE_TYPES)?,
            dryrun,
        })
    }

    /// Requests a new volume. Returns None in dry-run mode.
    pub fn create(&self, request: &NewVolume) -> Result<Option<Volume>> {
        if self.dryrun {
            info!("Dry run: not creating {} volume", request.size);
            return Ok(None);
        }
        let url = self.api.url(&["volumes"])?;
        let response = self
            .api
            .send(Method::POST, &url, Some(&request.to_body()))?;
        let response = self.api.check(response, "volume creation")?;
        let reply: VolumeReply = self.api.json(&response, "volume creation")?;
        info!("Created volume {} ({})", reply.volume.id, request.size);
        Ok(Some(reply.volume))
    }

    pub fn get(&self, volume_id: &str) -> Result<Volume> {
        let url = self.api.url(&["volumes", volume_id])?;
        let reply: VolumeReply = self
            .api
            .get_json(&url, &format!("volume {}", volume_id))?;
        Ok(reply.volume)
    }

    pub fn delete(&self, volume_id: &str) -> Result<()> {
        if self.dryrun {
            info!("Dry run: not deleting volume {}", volume_id);
            return Ok(());
        }
        let url = self.api.url(&["volumes", volume_id])?;
        let response = self.api.send(Method::DELETE, &url, None)?;
        self.api
            .check(response, &format!("volume {}", volume_id))?;
        info!("Deleted volume {}", volume_id);
        Ok(())
    }

    /// Polls the volume every `wait` until it is available, and bootable if asked, failing once
    /// `timeout` has passed or if the volume goes into an error state.
    pub fn is_ready(
        &self,
        volume_id: &str,
        needs_to_be_bootable: bool,
        timeout: Duration,
        wait: Duration,
    ) -> Result<Volume> {
        let mut last: Option<Volume> = None;
        let probe = |attempt: u32| -> Result<Option<Volume>> {
            let volume = self.get(volume_id)?;
            debug!(
                "Volume {} attempt {}: status '{}', bootable '{}'",
                volume_id, attempt, volume.status, volume.bootable
            );
            ensure!(
                !volume.status.starts_with("error"),
                error::VolumeFailedSnafu {
                    id: volume_id,
                    status: &volume.status,
                }
            );
            if volume.is_ready(needs_to_be_bootable) {
                return Ok(Some(volume));
            }
            last = Some(volume);
            Ok(None)
        };
        let ready = poll(Budget::Deadline(timeout), wait, probe)?;

        match ready {
            Some(volume) => Ok(volume),
            None => {
                let (status, bootable) = last
                    .map(|volume| (volume.status, volume.bootable))
                    .unwrap_or_default();
                error::VolumeTimeoutSnafu {
                    id: volume_id,
                    timeout,
                    status,
                    bootable,
                }
                .fail()
            }
        }
    }
}
