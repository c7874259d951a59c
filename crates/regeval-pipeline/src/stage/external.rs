use std::fs;
use std::io::ErrorKind;

use anyhow::{Context, Result};
use log::{debug, warn};

use super::{RegistrationAlgorithm, StageOutcome, StageRequest};
use crate::config::CommandTemplate;
use crate::external::{ExitOutcome, Placeholders, PreparedCommand, format_param};

/// An algorithm run as an external executable that writes a transform file.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalAlgorithm {
    pub command: CommandTemplate,
    pub default_timeout_secs: Option<f64>,
}

impl ExternalAlgorithm {
    pub fn new(command: CommandTemplate, default_timeout_secs: Option<f64>) -> Self {
        Self {
            command,
            default_timeout_secs,
        }
    }

    fn placeholders(request: &StageRequest<'_>) -> Placeholders {
        let mut values: Placeholders = request
            .params
            .iter()
            .map(|(name, value)| (name.clone(), format_param(*value)))
            .collect();
        let mut path = |key: &str, p: &std::path::Path| {
            values.insert(key.to_string(), p.to_string_lossy().into_owned());
        };
        path("scan_a", request.scan_a);
        path("scan_b", request.scan_b);
        path("output", request.output);
        if let Some(seed) = request.seed {
            path("seed", seed);
        }
        values
    }
}

impl RegistrationAlgorithm for ExternalAlgorithm {
    fn run(&self, request: &StageRequest<'_>) -> Result<StageOutcome> {
        match fs::remove_file(request.output) {
            Ok(()) => debug!("removed stale {}", request.output.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to remove stale {}", request.output.display())
                });
            }
        }

        let command = PreparedCommand::from_template(
            &self.command,
            &Self::placeholders(request),
            request.seed.is_some(),
            self.default_timeout_secs,
        );
        let invocation = command.run()?;
        if invocation.outcome == ExitOutcome::TimedOut {
            return Ok(StageOutcome::failed(invocation.elapsed));
        }

        let file = match regeval_core::read_transform_file(request.output) {
            Ok(file) => file,
            Err(err) => {
                warn!("{}: no estimate ({err})", self.command.program);
                return Ok(StageOutcome::failed(invocation.elapsed));
            }
        };

        let success = invocation.outcome.is_success() && file.transform.is_finite();
        let aux = file
            .data
            .iter()
            .chain(file.aux.iter().flatten())
            .copied()
            .collect();
        Ok(StageOutcome {
            estimate: Some(file.transform),
            aux,
            elapsed: invocation.elapsed,
            success,
        })
    }
}
