/*!
`aimsclient` drives the PXE boot server through its command line client, `aims2client`.

The CLI reports success with exit code 0 even when an operation failed, so a call only counts as
successful if it exits 0 *and* prints nothing on stderr.

```no_run
use aimsclient::{AimsClient, OperatingSystem};
use std::path::Path;

# fn main() -> aimsclient::Result<()> {
let aims = AimsClient::new(false);
let os = OperatingSystem::new("CentOS", "7", "9");
aims.add_host("myhost.cern.ch", &os, "x86_64", None, Path::new("/tmp/myhost.ks"), &[])?;
aims.wait_for_readiness("myhost.cern.ch", None, None)?;
# Ok(())
# }
```
*/

#![deny(rust_2018_idioms)]

mod error;
mod runner;
mod target;

pub use error::{Error, Result};
pub use runner::{Binary, CommandRunner, Outcome, DEFAULT_PROGRAM};
pub use target::{pxe_target, OperatingSystem};

use log::{debug, info};
use poll_until::{poll, Budget};
use snafu::{ensure, OptionExt};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_ATTEMPTS: u32 = 12;
pub const DEFAULT_WAIT: Duration = Duration::from_secs(10);
/// Classifier value meaning "no kernel options from the classifier".
pub const NO_KERNEL_OPTIONS: &str = "none";
pub const DEFAULT_KERNEL_OPTIONS: &[&str] = &["text", "network", "ks.sendmac", "ksdevice=bootif"];
const CLASSIFIER_PARAMETERS: &str = "parameters";
const CLASSIFIER_KERNEL_OPTIONS: &str = "aims_kopts";
const SYNC_MARKER: &str = "PXE boot synced:";

/// Kernel options set for a host by the classifier, if any.
pub fn classifier_kernel_options(node: &serde_yaml::Value) -> Option<&str> {
    node.get(CLASSIFIER_PARAMETERS)?
        .get(CLASSIFIER_KERNEL_OPTIONS)?
        .as_str()
}

/// Classifier options first (unless they are `none`), then the caller's, then the defaults.
pub fn kernel_options(classifier: Option<&str>, user: &[String]) -> Vec<String> {
    let mut options = Vec::new();
    if let Some(classifier) = classifier {
        if classifier.trim() != NO_KERNEL_OPTIONS {
            options.extend(classifier.split_whitespace().map(str::to_string));
        }
    }
    options.extend(user.iter().cloned());
    options.extend(DEFAULT_KERNEL_OPTIONS.iter().map(|o| o.to_string()));
    options
}

/// True if `showhost` output lists at least one interface and all of them are synced.
pub fn is_synced(output: &str) -> bool {
    let mut statuses = output
        .lines()
        .filter_map(|line| line.split_once(SYNC_MARKER))
        .map(|(_, status)| status.trim())
        .peekable();
    statuses.peek().is_some() && statuses.all(|status| status == "Y")
}

pub struct AimsClient {
    runner: Box<dyn CommandRunner>,
    dryrun: bool,
}

impl AimsClient {
    pub fn new(dryrun: bool) -> Self {
        Self::with_runner(Box::new(Binary::default()), dryrun)
    }

    pub fn with_runner(runner: Box<dyn CommandRunner>, dryrun: bool) -> Self {
        Self { runner, dryrun }
    }

    fn invoke(&self, args: Vec<String>) -> Result<String> {
        let outcome = self.runner.run(&args)?;
        ensure!(
            outcome.is_success(),
            error::CommandFailedSnafu {
                program: self.runner.program(),
                args,
                code: outcome.code,
                stderr: outcome.stderr.trim(),
            }
        );
        Ok(outcome.stdout)
    }

    /// Runs a write-side command, unless this is a dry run.
    fn change(&self, args: Vec<String>) -> Result<()> {
        if self.dryrun {
            info!(
                "Would have run {} {}",
                self.runner.program(),
                args.join(" ")
            );
            return Ok(());
        }
        self.invoke(args)?;
        Ok(())
    }

    /// Registers `fqdn` with its kickstart and enables PXE boot into the matching target.
    pub fn add_host(
        &self,
        fqdn: &str,
        os: &OperatingSystem,
        architecture: &str,
        classifier: Option<&serde_yaml::Value>,
        kickstart: &Path,
        user_kernel_options: &[String],
    ) -> Result<()> {
        ensure!(
            kickstart.is_file(),
            error::KickstartSnafu { path: kickstart }
        );
        let target = pxe_target(os, architecture)?;
        let kopts = kernel_options(
            classifier.and_then(classifier_kernel_options),
            user_kernel_options,
        )
        .join(" ");
        debug!("Kernel options for {}: {}", fqdn, kopts);
        self.change(vec![
            "addhost".to_string(),
            "--hostname".to_string(),
            fqdn.to_string(),
            "--kickstart".to_string(),
            kickstart.display().to_string(),
            "--kopts".to_string(),
            kopts,
            "--pxe".to_string(),
            "--name".to_string(),
            target.clone(),
        ])?;
        info!("Registered {} for PXE boot into {}", fqdn, target);
        Ok(())
    }

    pub fn pxe_on(&self, fqdn: &str, target: &str) -> Result<()> {
        self.change(vec![
            "pxeon".to_string(),
            fqdn.to_string(),
            target.to_string(),
        ])
    }

    pub fn pxe_off(&self, fqdn: &str) -> Result<()> {
        self.change(vec!["pxeoff".to_string(), fqdn.to_string()])
    }

    pub fn remove_host(&self, fqdn: &str) -> Result<()> {
        self.change(vec!["remhost".to_string(), fqdn.to_string()])
    }

    /// The server's full record for `fqdn`. Runs in dry-run mode too.
    pub fn show_host(&self, fqdn: &str) -> Result<String> {
        self.invoke(vec![
            "showhost".to_string(),
            fqdn.to_string(),
            "--full".to_string(),
        ])
    }

    /// Calls `show_host` until every interface reports `PXE boot synced: Y`.
    pub fn wait_for_readiness(
        &self,
        fqdn: &str,
        attempts: Option<u32>,
        wait: Option<Duration>,
    ) -> Result<()> {
        if self.dryrun {
            info!("Would have waited for {} to be ready for PXE boot", fqdn);
            return Ok(());
        }
        let attempts = attempts.unwrap_or(DEFAULT_ATTEMPTS);
        let wait = wait.unwrap_or(DEFAULT_WAIT);
        let mut last_output = String::new();
        poll(Budget::Attempts(attempts), wait, |attempt| -> Result<Option<()>> {
            let output = self.show_host(fqdn)?;
            let synced = is_synced(&output);
            debug!("Attempt {}: {} synced: {}", attempt, fqdn, synced);
            last_output = output;
            Ok(synced.then_some(()))
        })?
        .context(error::NotReadySnafu {
            fqdn,
            attempts,
            output: last_output.trim(),
        })?;
        info!("{} is ready for PXE boot", fqdn);
        Ok(())
    }
}
