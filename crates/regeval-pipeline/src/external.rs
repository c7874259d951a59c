//! Running external tools from command templates.

use std::collections::BTreeMap;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::{debug, warn};

use crate::config::CommandTemplate;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Values substituted for `{name}` tokens in command arguments.
pub type Placeholders = BTreeMap<String, String>;

/// Replace every `{key}` in `template` with its value.
///
/// The template is scanned once; substituted values are never expanded
/// again. Unknown placeholders are left untouched.
pub fn expand(template: &str, values: &Placeholders) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let known = after
            .find('}')
            .and_then(|close| values.get(&after[..close]).map(|value| (close, value)));
        match known {
            Some((close, value)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Format a parameter value the way external tools expect it on the command line.
pub fn format_param(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// How an external process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Success,
    /// Nonzero exit code, or `None` when terminated by a signal.
    Failed(Option<i32>),
    TimedOut,
}

impl ExitOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExitOutcome::Success)
    }

    fn from_status(status: ExitStatus) -> Self {
        if status.success() {
            ExitOutcome::Success
        } else {
            ExitOutcome::Failed(status.code())
        }
    }
}

/// Result of one external invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Invocation {
    pub outcome: ExitOutcome,
    pub elapsed: Duration,
}

/// A fully expanded command ready to run.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedCommand {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Option<Duration>,
}

impl PreparedCommand {
    /// Expand `template`; `seed_args` are included only when `with_seed` is set.
    pub fn from_template(
        template: &CommandTemplate,
        values: &Placeholders,
        with_seed: bool,
        default_timeout_secs: Option<f64>,
    ) -> Self {
        let seed_args: &[String] = if with_seed { &template.seed_args } else { &[] };
        Self {
            program: expand(&template.program, values),
            args: template
                .args
                .iter()
                .chain(seed_args)
                .map(|arg| expand(arg, values))
                .collect(),
            timeout: template.timeout(default_timeout_secs),
        }
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run to completion, killing the process once the timeout elapses.
    ///
    /// Returns `Err` only when the process cannot be started or waited on.
    pub fn run(&self) -> Result<Invocation> {
        debug!("running {}", self.command_line());
        let start = Instant::now();
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to start {}", self.program))?;

        let outcome = match self.timeout {
            None => ExitOutcome::from_status(
                child
                    .wait()
                    .with_context(|| format!("failed to wait for {}", self.program))?,
            ),
            Some(limit) => self.wait_with_timeout(&mut child, start, limit)?,
        };

        let elapsed = start.elapsed();
        debug!("{} finished in {:.3}s: {outcome:?}", self.program, elapsed.as_secs_f64());
        Ok(Invocation { outcome, elapsed })
    }

    fn wait_with_timeout(
        &self,
        child: &mut Child,
        start: Instant,
        limit: Duration,
    ) -> Result<ExitOutcome> {
        loop {
            if let Some(status) = child
                .try_wait()
                .with_context(|| format!("failed to poll {}", self.program))?
            {
                return Ok(ExitOutcome::from_status(status));
            }
            if start.elapsed() >= limit {
                warn!(
                    "{} exceeded {:.1}s, killing it",
                    self.program,
                    limit.as_secs_f64()
                );
                // The process may exit between the poll and the kill.
                if let Err(err) = child.kill() {
                    debug!("kill {}: {err}", self.program);
                }
                child
                    .wait()
                    .with_context(|| format!("failed to reap {}", self.program))?;
                return Ok(ExitOutcome::TimedOut);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}
