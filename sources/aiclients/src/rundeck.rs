//! Client for the job runner.
//!
//! Jobs are referred to by alias; `[rundeck] job_<alias> = <job id>` options in the configuration
//! map aliases to the runner's job ids. Job definitions and submission replies are XML, execution
//! output is JSON.

use crate::error::{self, Result};
use crate::http::{ServiceHttp, JSON};
use aiconfig::{Config, Service};
use aihttp::Method;
use log::{debug, info};
use poll_until::{poll, Budget};
use serde::Deserialize;
use serde_json::Value;
use snafu::{OptionExt, ResultExt};
use std::collections::BTreeMap;
use std::io::Write;
use std::time::Duration;

const XML: &str = "application/xml";
const JOB_PREFIX: &str = "job_";
pub const DEFAULT_API_VERSION: u32 = 14;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Summary of a submitted execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRun {
    pub status: String,
    pub project: String,
    pub href: String,
    pub id: String,
    pub jobid: String,
}

#[derive(Debug, Deserialize)]
struct Executions {
    #[serde(default)]
    execution: Vec<Execution>,
}

#[derive(Debug, Deserialize)]
struct Execution {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@href", default)]
    href: String,
    #[serde(rename = "@status", default)]
    status: String,
    #[serde(rename = "@project", default)]
    project: String,
    job: Option<JobReference>,
}

#[derive(Debug, Deserialize)]
struct JobReference {
    #[serde(rename = "@id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct JobList {
    #[serde(default)]
    job: Vec<JobDefinition>,
}

#[derive(Debug, Deserialize)]
struct JobDefinition {
    sequence: Option<Sequence>,
}

#[derive(Debug, Deserialize)]
struct Sequence {
    #[serde(default)]
    command: Vec<Step>,
}

#[derive(Debug, Deserialize)]
struct Step {
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Output {
    #[serde(default)]
    offset: Value,
    #[serde(default)]
    last_modified: Value,
    #[serde(default)]
    completed: bool,
    exec_state: Option<String>,
    #[serde(default)]
    entries: Vec<OutputEntry>,
}

#[derive(Debug, Deserialize)]
struct OutputEntry {
    #[serde(default)]
    log: String,
    stepctx: Option<String>,
}

/// The runner sends some counters as strings and some as numbers.
fn value_text(value: &Value, default: &str) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => default.to_string(),
    }
}

/// Builds the runner's `-name value` argument string, quoting values that need it.
pub fn arg_string(args: &[(&str, &str)]) -> String {
    args.iter()
        .map(|(name, value)| {
            if value.is_empty() || value.chars().any(char::is_whitespace) {
                format!("-{} \"{}\"", name, value.replace('"', "\\\""))
            } else {
                format!("-{} {}", name, value)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Index into the job's steps for a `stepctx` like `2`, `2/1` or `2e@node`.
fn step_index(stepctx: &str) -> Option<usize> {
    let digits: String = stepctx.chars().take_while(char::is_ascii_digit).collect();
    digits.parse::<usize>().ok()?.checked_sub(1)
}

#[derive(Debug, Clone)]
pub struct RundeckClient {
    http: ServiceHttp,
    jobs: BTreeMap<String, String>,
    api_version: u32,
    poll_interval: Duration,
}

impl RundeckClient {
    pub fn new(config: &Config, dryrun: bool) -> Result<Self> {
        let service = Service::Rundeck;
        let section = service.section();
        let jobs = config
            .section_options(section)
            .into_iter()
            .filter_map(|(key, id)| {
                key.strip_prefix(JOB_PREFIX)
                    .map(|alias| (alias.to_string(), id.to_string()))
            })
            .collect();
        let api_version = match config.get_opt(section, &service.option("api_version")) {
            Some(_) => config
                .get_parsed(section, &service.option("api_version"))
                .context(error::ConfigSnafu { service })?,
            None => DEFAULT_API_VERSION,
        };
        let poll_interval = match config.get_opt(section, &service.option("poll_interval")) {
            Some(_) => Duration::from_secs(
                config
                    .get_parsed(section, &service.option("poll_interval"))
                    .context(error::ConfigSnafu { service })?,
            ),
            None => DEFAULT_POLL_INTERVAL,
        };
        let http = ServiceHttp::new(config, service, dryrun)?;
        Ok(Self::from_parts(http, jobs, api_version).with_poll_interval(poll_interval))
    }

    pub fn from_parts(http: ServiceHttp, jobs: BTreeMap<String, String>, api_version: u32) -> Self {
        Self {
            http,
            jobs,
            api_version,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn job_id(&self, alias: &str) -> Result<&str> {
        self.jobs
            .get(alias)
            .map(String::as_str)
            .with_context(|| error::InvalidInputSnafu {
                service: Service::Rundeck,
                reason: format!(
                    "unknown job '{}', known jobs: {}",
                    alias,
                    self.jobs.keys().cloned().collect::<Vec<_>>().join(", ")
                ),
            })
    }

    fn api_url(&self, rest: &[&str], query: &[(&str, &str)]) -> Result<url::Url> {
        let version = self.api_version.to_string();
        let mut segments = vec!["api", version.as_str()];
        segments.extend(rest);
        self.http.url_with_query(&segments, query)
    }

    fn parse_xml<T: serde::de::DeserializeOwned>(&self, text: &str, what: &str) -> Result<T> {
        quick_xml::de::from_str(text).context(error::XmlSnafu {
            service: Service::Rundeck,
            what,
        })
    }

    /// Submits the job known as `alias`. Returns None in dry-run mode.
    pub fn run_job(&self, alias: &str, args: &[(&str, &str)]) -> Result<Option<JobRun>> {
        let job_id = self.job_id(alias)?;
        let arg_string = arg_string(args);
        let url = self.api_url(&["job", job_id, "run"], &[("argString", arg_string.as_str())])?;
        let what = format!("run of job {}", alias);

        if self.http.dryrun() {
            info!("Dry run: not running job {} with '{}'", alias, arg_string);
            return Ok(None);
        }
        let response = self
            .http
            .send_with_headers(Method::POST, &url, &[("Accept", XML)], None)?;
        let response = self.http.check(response, &what)?;
        let executions: Executions = self.parse_xml(&response.text, &what)?;
        let execution = executions
            .execution
            .into_iter()
            .next()
            .context(error::UnexpectedResponseSnafu {
                service: Service::Rundeck,
                what: what.as_str(),
                reason: "no execution in reply",
            })?;
        let run = JobRun {
            status: execution.status,
            project: execution.project,
            href: execution.href,
            id: execution.id,
            jobid: execution
                .job
                .map(|job| job.id)
                .unwrap_or_else(|| job_id.to_string()),
        };
        info!("Started execution {} of job {}", run.id, alias);
        Ok(Some(run))
    }

    /// Descriptions of the job's steps, in step order.
    fn step_descriptions(&self, job_id: &str) -> Result<Vec<Option<String>>> {
        let what = format!("definition of job {}", job_id);
        let url = self.api_url(&["job", job_id], &[])?;
        let response = self
            .http
            .send_with_headers(Method::GET, &url, &[("Accept", XML)], None)?;
        let response = self.http.check(response, &what)?;
        let list: JobList = self.parse_xml(&response.text, &what)?;
        Ok(list
            .job
            .into_iter()
            .next()
            .and_then(|job| job.sequence)
            .map(|sequence| {
                sequence
                    .command
                    .into_iter()
                    .map(|step| step.description)
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Follows an execution's output until it completes, writing one line per entry to `sink`.
    /// Entries from a step with a description are prefixed with `[description] `. Returns the
    /// final execution state reported by the runner.
    pub fn show_execution(
        &self,
        exec_id: &str,
        job_id: &str,
        sink: &mut dyn Write,
    ) -> Result<Option<String>> {
        let steps = self.step_descriptions(job_id)?;
        let what = format!("output of execution {}", exec_id);
        let mut offset = "0".to_string();
        let mut lastmod = "0".to_string();

        let follow = |attempt: u32| -> Result<Option<Option<String>>> {
            let url = self.api_url(
                &["execution", exec_id, "output"],
                &[("offset", offset.as_str()), ("lastmod", lastmod.as_str())],
            )?;
            let response = self
                .http
                .send_with_headers(Method::GET, &url, &[("Accept", JSON)], None)?;
            let response = self.http.check(response, &what)?;
            let output: Output = self.http.json(&response, &what)?;
            debug!(
                "Poll {}: {} entries, completed: {}",
                attempt,
                output.entries.len(),
                output.completed
            );

            for entry in &output.entries {
                let description = entry
                    .stepctx
                    .as_deref()
                    .and_then(step_index)
                    .and_then(|index| steps.get(index))
                    .and_then(Option::as_deref);
                let line = entry.log.trim_end_matches('\n');
                match description {
                    Some(description) => writeln!(sink, "[{}] {}", description, line),
                    None => writeln!(sink, "{}", line),
                }
                .context(error::OutputSnafu {
                    service: Service::Rundeck,
                })?;
            }

            offset = value_text(&output.offset, &offset);
            lastmod = value_text(&output.last_modified, &lastmod);
            Ok(output.completed.then_some(output.exec_state))
        };
        let state = poll(Budget::Unbounded, self.poll_interval, follow)?;
        Ok(state.flatten())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::http::test_util::service_http;
    use aihttp::ErrorKind;
    use httptest::{matchers::*, responders::*, Expectation, Server};
    use serde_json::json;

    const REBOOT: &str = "0f5c6a38-0000-4000-8000-000000000001";

    fn client(server: &Server, dryrun: bool) -> RundeckClient {
        let jobs = [("reboot".to_string(), REBOOT.to_string())]
            .into_iter()
            .collect();
        RundeckClient::from_parts(service_http(server, Service::Rundeck, dryrun), jobs, 14)
            .with_poll_interval(Duration::ZERO)
    }

    const RUN_REPLY: &str = r#"<executions count="1">
  <execution id="1234" href="https://rundeck.example.org/execution/follow/1234" status="running" project="ai">
    <user>jdoe</user>
    <date-started unixtime="1697000000000">2026-10-18T09:00:00Z</date-started>
    <job id="0f5c6a38-0000-4000-8000-000000000001" averageDuration="1000">
      <name>reboot</name>
      <group>ai</group>
      <project>ai</project>
    </job>
    <description>reboot a host</description>
    <argstring>-host foo.example.org</argstring>
  </execution>
</executions>"#;

    const JOB_DEFINITION: &str = r#"<joblist>
  <job>
    <id>0f5c6a38-0000-4000-8000-000000000001</id>
    <name>reboot</name>
    <sequence keepgoing="false" strategy="node-first">
      <command>
        <description>Drain</description>
        <exec>drain.sh</exec>
      </command>
      <command>
        <description>Reboot</description>
        <exec>reboot.sh</exec>
      </command>
    </sequence>
  </job>
</joblist>"#;

    #[test]
    fn args() {
        assert_eq!(
            arg_string(&[("host", "foo.example.org"), ("reason", "kernel upgrade")]),
            "-host foo.example.org -reason \"kernel upgrade\""
        );
        assert_eq!(arg_string(&[]), "");
    }

    #[test]
    fn step_indices() {
        assert_eq!(step_index("1"), Some(0));
        assert_eq!(step_index("2/1"), Some(1));
        assert_eq!(step_index("3e@node"), Some(2));
        assert_eq!(step_index("0"), None);
        assert_eq!(step_index(""), None);
    }

    #[test]
    fn run_job() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", format!("/api/14/job/{}/run", REBOOT)),
                request::query(url_decoded(contains(("argString", "-host foo.example.org")))),
                request::headers(contains(("accept", "application/xml"))),
            ])
            .respond_with(status_code(200).body(RUN_REPLY)),
        );
        let run = client(&server, false)
            .run_job("reboot", &[("host", "foo.example.org")])
            .unwrap()
            .unwrap();
        assert_eq!(
            run,
            JobRun {
                status: "running".to_string(),
                project: "ai".to_string(),
                href: "https://rundeck.example.org/execution/follow/1234".to_string(),
                id: "1234".to_string(),
                jobid: REBOOT.to_string(),
            }
        );
    }

    #[test]
    fn run_job_dryrun() {
        let server = Server::run();
        assert_eq!(
            client(&server, true)
                .run_job("reboot", &[("host", "foo.example.org")])
                .unwrap(),
            None
        );
    }

    #[test]
    fn unknown_job() {
        let server = Server::run();
        let err = client(&server, false).run_job("explode", &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(err.to_string().contains("reboot"));
    }

    #[test]
    fn follows_output() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", format!("/api/14/job/{}", REBOOT)))
                .respond_with(status_code(200).body(JOB_DEFINITION)),
        );
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/api/14/execution/1234/output"),
                request::query(url_decoded(contains(("offset", "0")))),
                request::query(url_decoded(contains(("lastmod", "0")))),
            ])
            .respond_with(json_encoded(json!({
                "id": "1234",
                "offset": "100",
                "lastModified": 1697000000123u64,
                "completed": false,
                "execState": "running",
                "entries": [
                    {"log": "draining", "stepctx": "1", "level": "NORMAL"},
                    {"log": "no step here\n", "level": "NORMAL"},
                ],
            }))),
        );
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/api/14/execution/1234/output"),
                request::query(url_decoded(contains(("offset", "100")))),
                request::query(url_decoded(contains(("lastmod", "1697000000123")))),
            ])
            .respond_with(json_encoded(json!({
                "id": "1234",
                "offset": 180,
                "lastModified": "1697000000456",
                "completed": true,
                "execState": "succeeded",
                "entries": [
                    {"log": "rebooting", "stepctx": "2/1"},
                    {"log": "unknown step", "stepctx": "9"},
                ],
            }))),
        );

        let mut sink = Vec::new();
        let state = client(&server, false)
            .show_execution("1234", REBOOT, &mut sink)
            .unwrap();
        assert_eq!(state.as_deref(), Some("succeeded"));
        assert_eq!(
            String::from_utf8(sink).unwrap(),
            "[Drain] draining\nno step here\n[Reboot] rebooting\nunknown step\n"
        );
    }
}
