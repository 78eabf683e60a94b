//! Image service client and latest-image selection.

use crate::api::ServiceApi;
use crate::error::{self, Component, Result};
use crate::session::Session;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use snafu::{OptionExt, ResultExt};
use std::collections::BTreeMap;
use url::Url;

pub const DEFAULT_EDITION: &str = "Base";
pub const DEFAULT_ARCHITECTURE: &str = "x86_64";
const PAGE_LIMIT: &str = "100";
const PUBLIC: &str = "public";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub visibility: String,
    /// Everything else, including the custom `os_*` and `release_date` properties.
    #[serde(flatten)]
    pub properties: BTreeMap<String, Value>,
}

impl Image {
    /// A property as text. Numbers are accepted since some images carry them unquoted.
    pub fn property(&self, key: &str) -> Option<String> {
        match self.properties.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// The `(minor version, release date)` ordering key, if both are present and parse.
    fn release_key(&self) -> Option<(i64, NaiveDateTime)> {
        let minor = self.property("os_distro_minor")?.trim().parse().ok()?;
        let date = parse_release_date(&self.property("release_date")?)?;
        Some((minor, date))
    }
}

fn parse_release_date(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(text) {
        return Some(date.naive_utc());
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(date) = NaiveDateTime::parse_from_str(text, format) {
            return Some(date);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Which images count as candidates for "latest".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageQuery {
    pub os_distro: String,
    pub os_distro_major: String,
    pub os_edition: String,
    pub architecture: String,
}

impl ImageQuery {
    pub fn new<S1, S2>(os_distro: S1, os_distro_major: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            os_distro: os_distro.into(),
            os_distro_major: os_distro_major.into(),
            os_edition: DEFAULT_EDITION.to_string(),
            architecture: DEFAULT_ARCHITECTURE.to_string(),
        }
    }

    pub fn with_edition<S: Into<String>>(mut self, edition: S) -> Self {
        self.os_edition = edition.into();
        self
    }

    pub fn with_architecture<S: Into<String>>(mut self, architecture: S) -> Self {
        self.architecture = architecture.into();
        self
    }

    fn matches(&self, image: &Image) -> bool {
        let is = |key: &str, expected: &str| image.property(key).as_deref() == Some(expected);
        image.visibility == PUBLIC
            && is("os_distro", &self.os_distro)
            && is("os_distro_major", &self.os_distro_major)
            && is("os_edition", &self.os_edition)
            && is("architecture", &self.architecture)
    }
}

/// Picks the matching image with the highest minor version, then the latest release date.
/// Images missing either value are never picked.
pub fn select_latest<'a>(images: &'a [Image], query: &ImageQuery) -> Option<&'a Image> {
    images
        .iter()
        .filter(|image| query.matches(image))
        .filter_map(|image| image.release_key().map(|key| (key, image)))
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, image)| image)
}

#[derive(Debug, Deserialize)]
struct ImagePage {
    #[serde(default)]
    images: Vec<Image>,
    next: Option<String>,
}

/// The image service's `next` link is a path such as `/v2/images?marker=..` that leaves out any
/// prefix the endpoint is mounted under, so it goes after the endpoint's path. A `/v2` already at
/// the end of that path isn't repeated.
fn next_url(base: &Url, next: &str) -> Result<Url> {
    if let Ok(absolute) = Url::parse(next) {
        return Ok(absolute);
    }
    let prefix = base.path().trim_end_matches('/');
    let prefix = prefix.strip_suffix("/v2").unwrap_or(prefix);
    base.join(&format!("{}/{}", prefix, next.trim_start_matches('/')))
        .context(error::NextLinkSnafu { link: next })
}

#[derive(Debug, Clone)]
pub struct GlanceClient {
    api: ServiceApi,
}

impl GlanceClient {
    pub fn new(session: &Session) -> Result<Self> {
        Ok(Self {
            api: ServiceApi::new(session, Component::Glance, &["image"])?,
        })
    }

    /// Lists every image visible to the project, following `next` links.
    pub fn list_images(&self) -> Result<Vec<Image>> {
        let mut images = Vec::new();
        let mut url = self
            .api
            .url_with_query(&["v2", "images"], &[("limit", PAGE_LIMIT)])?;
        loop {
            let page: ImagePage = self.api.get_json(&url, "image list")?;
            debug!("Got {} images", page.images.len());
            images.extend(page.images);
            let next = match page.next {
                Some(next) if !next.is_empty() => next,
                _ => break,
            };
            url = next_url(self.api.endpoint().base(), &next)?;
        }
        Ok(images)
    }

    pub fn get_latest_image(&self, query: &ImageQuery) -> Result<Image> {
        let images = self.list_images()?;
        let latest = select_latest(&images, query)
            .cloned()
            .context(error::NoImageSnafu {
                distro: &query.os_distro,
                major: &query.os_distro_major,
                edition: &query.os_edition,
                architecture: &query.architecture,
            })?;
        info!(
            "Latest {} {} image is {} ({})",
            query.os_distro, query.os_distro_major, latest.name, latest.id
        );
        Ok(latest)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::session::test_util::{catalog_with_image, session, session_with_catalog};
    use httptest::{matchers::*, responders::*, Expectation, Server};
    use serde_json::json;

    fn image(id: &str, minor: Option<&str>, date: Option<&str>) -> Image {
        let mut value = json!({
            "id": id,
            "name": format!("CC7 - x86_64 [{}]", id),
            "visibility": "public",
            "os_distro": "CC",
            "os_distro_major": "7",
            "os_edition": "Base",
            "architecture": "x86_64",
        });
        if let Some(minor) = minor {
            value["os_distro_minor"] = json!(minor);
        }
        if let Some(date) = date {
            value["release_date"] = json!(date);
        }
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn highest_minor_then_date() {
        let images = vec![
            image("a", Some("8"), Some("2020-01-01")),
            image("b", Some("9"), Some("2020-06-01")),
            image("c", Some("9"), Some("2020-10-02T12:00:00")),
            image("d", Some("10"), None),
            image("e", None, Some("2021-01-01")),
            image("f", Some("not a number"), Some("2022-01-01")),
        ];
        let query = ImageQuery::new("CC", "7");
        assert_eq!(select_latest(&images, &query).map(|i| i.id.as_str()), Some("c"));
    }

    #[test]
    fn minor_compares_numerically() {
        let images = vec![
            image("nine", Some("9"), Some("2021-01-01")),
            image("ten", Some("10"), Some("2020-01-01")),
        ];
        let query = ImageQuery::new("CC", "7");
        assert_eq!(select_latest(&images, &query).map(|i| i.id.as_str()), Some("ten"));
    }

    #[test]
    fn filters_exactly() {
        let mut private = image("private", Some("9"), Some("2020-01-01"));
        private.visibility = "private".to_string();
        let images = vec![private, image("base", Some("1"), Some("2019-01-01"))];
        let query = ImageQuery::new("CC", "7");
        assert_eq!(select_latest(&images, &query).map(|i| i.id.as_str()), Some("base"));

        assert!(select_latest(&images, &query.clone().with_edition("Test")).is_none());
        assert!(select_latest(&images, &query.clone().with_architecture("aarch64")).is_none());
        assert!(select_latest(&images, &ImageQuery::new("CC", "8")).is_none());
    }

    #[test]
    fn numeric_properties() {
        let image: Image = serde_json::from_value(json!({
            "id": "n",
            "visibility": "public",
            "os_distro": "RHEL",
            "os_distro_major": 8,
            "os_distro_minor": 4,
            "os_edition": "Base",
            "architecture": "x86_64",
            "release_date": "2021-05-18T00:00:00Z",
        }))
        .unwrap();
        let images = [image];
        assert!(select_latest(&images, &ImageQuery::new("RHEL", "8")).is_some());
    }

    #[test]
    fn follows_next_links() {
        let server = Server::run();
        let session = session(&server);
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/v2/images"),
                request::query(url_decoded(contains(("limit", "100")))),
                request::query(url_decoded(not(contains(key("marker"))))),
            ])
            .respond_with(json_encoded(json!({
                "images": [image("a", Some("8"), Some("2020-01-01"))],
                "next": "/v2/images?marker=a&limit=100",
            }))),
        );
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/v2/images"),
                request::query(url_decoded(contains(("marker", "a")))),
            ])
            .respond_with(json_encoded(json!({
                "images": [image("b", Some("9"), Some("2020-06-01"))],
            }))),
        );
        let glance = GlanceClient::new(&session).unwrap();
        let latest = glance.get_latest_image(&ImageQuery::new("CC", "7")).unwrap();
        assert_eq!(latest.id, "b");
    }

    #[test]
    fn follows_next_links_under_prefix() {
        let server = Server::run();
        let session = session_with_catalog(&server, catalog_with_image(&server, "/image/"));
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/image/v2/images"),
                request::query(url_decoded(not(contains(key("marker"))))),
            ])
            .times(1)
            .respond_with(json_encoded(json!({
                "images": [image("a", Some("8"), Some("2020-01-01"))],
                "next": "/v2/images?marker=a&limit=100",
            }))),
        );
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/image/v2/images"),
                request::query(url_decoded(contains(("marker", "a")))),
                request::query(url_decoded(contains(("limit", "100")))),
            ])
            .times(1)
            .respond_with(json_encoded(json!({
                "images": [image("b", Some("9"), Some("2020-06-01"))],
            }))),
        );
        let images = GlanceClient::new(&session).unwrap().list_images().unwrap();
        let ids: Vec<&str> = images.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn next_link_resolution() {
        let next = "/v2/images?marker=a&limit=100";
        for (base, expected) in [
            (
                "https://cloud.example.org/",
                "https://cloud.example.org/v2/images?marker=a&limit=100",
            ),
            (
                "https://cloud.example.org/image/",
                "https://cloud.example.org/image/v2/images?marker=a&limit=100",
            ),
            (
                "https://cloud.example.org/image",
                "https://cloud.example.org/image/v2/images?marker=a&limit=100",
            ),
            (
                "https://cloud.example.org/image/v2/",
                "https://cloud.example.org/image/v2/images?marker=a&limit=100",
            ),
        ] {
            let base = Url::parse(base).unwrap();
            assert_eq!(next_url(&base, next).unwrap().as_str(), expected);
        }

        let base = Url::parse("https://cloud.example.org/image/").unwrap();
        let absolute = "https://other.example.org/v2/images?marker=b";
        assert_eq!(next_url(&base, absolute).unwrap().as_str(), absolute);
    }

    #[test]
    fn no_candidate() {
        let server = Server::run();
        let session = session(&server);
        server.expect(
            Expectation::matching(request::method_path("GET", "/v2/images"))
                .respond_with(json_encoded(json!({"images": []}))),
        );
        let err = GlanceClient::new(&session)
            .unwrap()
            .get_latest_image(&ImageQuery::new("CC", "7"))
            .unwrap_err();
        assert!(matches!(err, error::Error::NoImage { .. }));
    }
}
