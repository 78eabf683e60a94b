//! Assembly of the user-data given to new virtual machines.
//!
//! The bundle is a MIME multipart document. Its first part is a shell script rendered from a
//! template; placeholders the caller has no value for are left exactly as written. Any files in
//! an optional snippets directory follow as additional parts, in filename order.

use lazy_static::lazy_static;
use log::{debug, info};
use rand::Rng;
use regex::{Captures, Regex};
use snafu::ResultExt;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Filename given to the rendered template.
pub const SCRIPT_FILENAME: &str = "bootstrap.sh";
pub const SCRIPT_CONTENT_TYPE: &str = "text/x-shellscript";
const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// First-line markers understood by cloud-init and the part content type each implies.
const CONTENT_MARKERS: &[(&str, &str)] = &[
    ("#!", "text/x-shellscript"),
    ("#cloud-config", "text/cloud-config"),
    ("#include", "text/x-include-url"),
    ("#cloud-boothook", "text/cloud-boothook"),
    ("#upstart-job", "text/upstart-job"),
    ("#part-handler", "text/part-handler"),
];

lazy_static! {
    static ref PLACEHOLDER: Regex =
        Regex::new(r"\$(?:(\$)|([_a-zA-Z][_a-zA-Z0-9]*)|\{([_a-zA-Z][_a-zA-Z0-9]*)\})").unwrap();
}

/// Replaces `$name` and `${name}` with values from `values`, and `$$` with `$`. Placeholders
/// without a value are kept as they are.
pub fn safe_substitute(template: &str, values: &HashMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            if caps.get(1).is_some() {
                return "$".to_string();
            }
            let name = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str())
                .unwrap_or_default();
            match values.get(name) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// The values the bootstrap template knows about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Placeholders {
    pub fqdn: Option<String>,
    pub hostgroup: Option<String>,
    pub environment: Option<String>,
    pub puppetmaster: Option<String>,
    pub caserver: Option<String>,
}

impl Placeholders {
    pub fn to_map(&self) -> HashMap<String, String> {
        [
            ("fqdn", &self.fqdn),
            ("hostgroup", &self.hostgroup),
            ("environment", &self.environment),
            ("puppetmaster", &self.puppetmaster),
            ("caserver", &self.caserver),
        ]
        .iter()
        .filter_map(|(name, value)| value.as_ref().map(|v| (name.to_string(), v.clone())))
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub filename: String,
    pub content_type: String,
    pub content: String,
}

impl Part {
    /// Builds a part whose content type is inferred from its first line.
    pub fn new<S1, S2>(filename: S1, content: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        let content = content.into();
        let content_type = guess_content_type(&content).to_string();
        Self {
            filename: filename.into(),
            content_type,
            content,
        }
    }
}

fn guess_content_type(content: &str) -> &'static str {
    let first_line = content.lines().next().unwrap_or_default();
    CONTENT_MARKERS
        .iter()
        .find(|(marker, _)| first_line.starts_with(marker))
        .map(|(_, content_type)| *content_type)
        .unwrap_or(DEFAULT_CONTENT_TYPE)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserData {
    parts: Vec<Part>,
}

impl UserData {
    /// Starts a bundle with the script rendered from the template at `path`.
    pub fn from_template<P: AsRef<Path>>(path: P, placeholders: &Placeholders) -> Result<Self> {
        let path = path.as_ref();
        let template = fs::read_to_string(path).context(error::ReadSnafu { path })?;
        Ok(Self::from_template_str(&template, placeholders))
    }

    pub fn from_template_str(template: &str, placeholders: &Placeholders) -> Self {
        let script = safe_substitute(template, &placeholders.to_map());
        Self {
            parts: vec![Part {
                filename: SCRIPT_FILENAME.to_string(),
                content_type: SCRIPT_CONTENT_TYPE.to_string(),
                content: script,
            }],
        }
    }

    pub fn add_part(&mut self, part: Part) {
        self.parts.push(part);
    }

    /// Appends every regular file in `dir`, sorted by filename.
    pub fn add_snippets_from_dir<P: AsRef<Path>>(&mut self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)
            .context(error::ReadDirSnafu { path: dir })?
            .collect::<std::io::Result<Vec<_>>>()
            .context(error::ReadDirSnafu { path: dir })?
            .into_iter()
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        paths.sort();

        for path in paths {
            let content = fs::read_to_string(&path).context(error::ReadSnafu { path: &path })?;
            let filename = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let part = Part::new(filename, content);
            debug!("Adding {} as {}", part.filename, part.content_type);
            self.parts.push(part);
        }
        info!("User-data has {} parts", self.parts.len());
        Ok(())
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// Renders the bundle as a MIME multipart document with a random boundary.
    pub fn to_mime(&self) -> String {
        let boundary = format!(
            "==============={:019}==",
            rand::thread_rng().gen_range(0..u64::MAX / 2)
        );
        self.to_mime_with_boundary(&boundary)
    }

    pub fn to_mime_with_boundary(&self, boundary: &str) -> String {
        let mut lines = vec![
            format!("Content-Type: multipart/mixed; boundary=\"{}\"", boundary),
            "MIME-Version: 1.0".to_string(),
            String::new(),
        ];
        for part in &self.parts {
            let (charset, encoding) = if part.content.is_ascii() {
                ("us-ascii", "7bit")
            } else {
                ("utf-8", "8bit")
            };
            lines.extend([
                format!("--{}", boundary),
                format!(
                    "Content-Type: {}; charset=\"{}\"",
                    part.content_type, charset
                ),
                "MIME-Version: 1.0".to_string(),
                format!("Content-Transfer-Encoding: {}", encoding),
                format!(
                    "Content-Disposition: attachment; filename=\"{}\"",
                    part.filename
                ),
                String::new(),
                part.content.trim_end_matches('\n').to_string(),
            ]);
        }
        lines.push(format!("--{}--", boundary));
        lines.push(String::new());
        lines.join("\n")
    }
}

pub mod error {
    use snafu::Snafu;
    use std::path::PathBuf;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub(super)))]
    pub enum Error {
        #[snafu(display("Unable to read user-data file '{}': {}", path.display(), source))]
        Read {
            path: PathBuf,
            source: std::io::Error,
        },

        #[snafu(display("Unable to list user-data snippets in '{}': {}", path.display(), source))]
        ReadDir {
            path: PathBuf,
            source: std::io::Error,
        },
    }
}

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
