use crate::error::{self, Result};
use log::trace;
use snafu::ResultExt;
use std::process::Command;

pub const DEFAULT_PROGRAM: &str = "aims2client";

/// What a finished command printed and how it exited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl Outcome {
    /// The PXE server CLI exits 0 even when it fails, so anything on stderr counts as failure too.
    pub fn is_success(&self) -> bool {
        self.code == Some(0) && self.stderr.trim().is_empty()
    }
}

/// Runs the PXE server CLI with the given arguments.
pub trait CommandRunner {
    fn program(&self) -> &str;
    fn run(&self, args: &[String]) -> Result<Outcome>;
}

/// Runs the real binary, found on `PATH` unless given as a path.
#[derive(Debug, Clone)]
pub struct Binary {
    program: String,
}

impl Binary {
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for Binary {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

impl CommandRunner for Binary {
    fn program(&self) -> &str {
        &self.program
    }

    fn run(&self, args: &[String]) -> Result<Outcome> {
        trace!("calling {} with '{:?}'", self.program, args);
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .context(error::SpawnSnafu {
                program: &self.program,
                args: args.to_vec(),
            })?;
        Ok(Outcome {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into(),
            stderr: String::from_utf8_lossy(&output.stderr).into(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn success_needs_clean_stderr() {
        let clean = Outcome {
            code: Some(0),
            stdout: "ok\n".to_string(),
            stderr: "\n".to_string(),
        };
        assert!(clean.is_success());
        let noisy = Outcome {
            stderr: "Host not found\n".to_string(),
            ..clean.clone()
        };
        assert!(!noisy.is_success());
        let failed = Outcome {
            code: Some(1),
            ..clean.clone()
        };
        assert!(!failed.is_success());
        let killed = Outcome { code: None, ..clean };
        assert!(!killed.is_success());
    }

    #[test]
    fn missing_binary() {
        let err = Binary::new("/nonexistent/aims2client")
            .run(&["showhost".to_string()])
            .unwrap_err();
        assert!(matches!(err, error::Error::Spawn { .. }));
    }
}
