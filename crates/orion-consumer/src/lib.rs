//! Consumer: executes a single reserved trial as a black-box child process
//! (spec §4.7).
//!
//! Grounded on `original_source/src/orion/core/worker/consumer.py`'s
//! `consume`/`_consume`/`interact_with_script`/`launch_process` pipeline,
//! rewritten without exceptions-as-control-flow: the two "this trial did
//! not complete normally" cases (`InterruptTrial`, `SuspendTrial` in the
//! original) become variants of [`Outcome`] returned up the call chain and
//! translated to a trial status once, at the worker loop boundary, per the
//! design note in spec §9.

use orion_error::{OrionError, Result};
use orion_space::Template;
use orion_trial::{Trial, TrialResult};
use orion_types::{ResultKind, Value};
use std::collections::HashMap;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, error, warn};

/// How a trial's execution ended (spec §4.7 step 4-5).
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed(Vec<TrialResult>),
    Broken,
    Interrupted,
    Suspended,
}

/// Executes one trial's script inside a scoped working directory
/// (`<tmp>/<experiment_name>/<trial_id>/`, removed on every exit path).
pub struct Consumer<'a> {
    experiment_name: String,
    script_path: String,
    template: &'a Template,
    base_tmp_dir: std::path::PathBuf,
}

impl<'a> Consumer<'a> {
    #[must_use]
    pub fn new(experiment_name: impl Into<String>, script_path: impl Into<String>, template: &'a Template) -> Self {
        Self {
            experiment_name: experiment_name.into(),
            script_path: script_path.into(),
            template,
            base_tmp_dir: std::env::temp_dir().join("orion"),
        }
    }

    /// Step 1-5 of spec §4.7: scoped directory, template rehydration, child
    /// process launch, exit-code handling, signal handling.
    pub fn consume(&self, trial: &Trial) -> Result<Outcome> {
        let experiment_dir = self.base_tmp_dir.join(&self.experiment_name);
        std::fs::create_dir_all(&experiment_dir).map_err(|e| OrionError::Io { context: format!("creating {}", experiment_dir.display()), source: e })?;

        let trial_dir = tempfile::Builder::new()
            .prefix(&format!("{}-", trial.id))
            .tempdir_in(&experiment_dir)
            .map_err(|e| OrionError::Io { context: "creating trial working directory".into(), source: e })?;

        let results_path = trial_dir.path().join("results.out");
        std::fs::write(&results_path, b"").map_err(|e| OrionError::Io { context: format!("creating {}", results_path.display()), source: e })?;

        let params: HashMap<String, Value> = trial.params.iter().map(|p| (p.name.clone(), p.value.clone())).collect();
        let args = self.template.build_to(&params)?;

        debug!(trial_id = %trial.id, dir = %trial_dir.path().display(), "orion.consumer::consume launching trial");
        let outcome = self.launch_and_wait(&args, &results_path)?;

        // `trial_dir` drops here, removing the scoped directory on every
        // return path including the `?` above.
        Ok(outcome)
    }

    fn launch_and_wait(&self, args: &[String], results_path: &Path) -> Result<Outcome> {
        let mut child = Command::new(&self.script_path)
            .args(args)
            .env("ORION_RESULTS_PATH", results_path)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| OrionError::Io { context: format!("spawning {}", self.script_path), source: e })?;

        #[cfg(unix)]
        if let Some(outcome) = wait_with_signal_handling(&mut child)? {
            return Ok(outcome);
        }

        let status = child.wait().map_err(|e| OrionError::Io { context: "waiting for child process".into(), source: e })?;

        match status.code() {
            Some(0) => Ok(Outcome::Completed(parse_results(results_path))),
            Some(2) => {
                error!("orion.consumer::consume child exited 2 (cli misuse), propagating");
                Err(OrionError::Internal("consumer script exited with code 2".into()))
            }
            Some(code) => {
                warn!(code, "orion.consumer::consume child exited non-zero, marking broken");
                Ok(Outcome::Broken)
            }
            None => Ok(Outcome::Broken),
        }
    }
}

fn parse_results(path: &Path) -> Vec<TrialResult> {
    let Ok(contents) = std::fs::read_to_string(path) else { return Vec::new() };
    if contents.trim().is_empty() {
        return Vec::new();
    }
    #[derive(serde::Deserialize)]
    struct RawResult {
        name: String,
        #[serde(rename = "type")]
        kind: String,
        value: Value,
    }
    let Ok(raw): std::result::Result<Vec<RawResult>, _> = serde_json::from_str(&contents) else {
        warn!("orion.consumer::parse_results unparseable results file, treating as empty");
        return Vec::new();
    };
    raw.into_iter()
        .map(|r| TrialResult {
            name: r.name,
            kind: match r.kind.as_str() {
                "gradient" => ResultKind::Gradient,
                "statistic" => ResultKind::Statistic,
                "constraint" => ResultKind::Constraint,
                _ => ResultKind::Objective,
            },
            value: r.value,
        })
        .collect()
}

#[cfg(unix)]
fn wait_with_signal_handling(child: &mut std::process::Child) -> Result<Option<Outcome>> {
    use nix::sys::signal::{self, SigHandler, Signal};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    static TERMINATED: AtomicBool = AtomicBool::new(false);
    extern "C" fn on_sigterm(_: i32) {
        TERMINATED.store(true, Ordering::SeqCst);
    }

    // SAFETY: `on_sigterm` only stores to an atomic; it performs no
    // allocation or non-reentrant work, satisfying async-signal-safety.
    unsafe {
        signal::signal(Signal::SIGTERM, SigHandler::Handler(on_sigterm))
            .map_err(|e| OrionError::Internal(format!("installing SIGTERM handler: {e}")))?;
    }

    loop {
        if let Some(status) = child.try_wait().map_err(|e| OrionError::Io { context: "polling child process".into(), source: e })? {
            let _ = status;
            return Ok(None);
        }
        if TERMINATED.swap(false, Ordering::SeqCst) {
            warn!("orion.consumer::consume received SIGTERM, interrupting trial");
            let _ = child.kill();
            let _ = child.wait();
            return Ok(Some(Outcome::Interrupted));
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orion_space::TemplateSlot;
    use orion_trial::Param;
    use orion_types::ParamKind;

    fn echo_template() -> Template {
        Template { slots: vec![TemplateSlot::Literal("-c".into())] }
    }

    #[test]
    fn consume_marks_nonzero_exit_as_broken() {
        let template = echo_template();
        let consumer = Consumer::new("exp", "false", &template);
        let trial = Trial::new("exp", vec![Param { name: "lr".into(), kind: ParamKind::Real, value: Value::Real(0.1) }]);
        let outcome = consumer.consume(&trial).unwrap();
        assert_eq!(outcome, Outcome::Broken);
    }

    #[test]
    fn consume_marks_zero_exit_as_completed_with_empty_results() {
        let template = Template::default();
        let consumer = Consumer::new("exp", "true", &template);
        let trial = Trial::new("exp", vec![Param { name: "lr".into(), kind: ParamKind::Real, value: Value::Real(0.1) }]);
        let outcome = consumer.consume(&trial).unwrap();
        assert_eq!(outcome, Outcome::Completed(Vec::new()));
    }

    #[test]
    fn parse_results_handles_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.out");
        std::fs::write(&path, b"").unwrap();
        assert!(parse_results(&path).is_empty());
    }

    #[test]
    fn parse_results_reads_json_objective() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.out");
        std::fs::write(&path, br#"[{"name":"loss","type":"objective","value":0.5}]"#).unwrap();
        let results = parse_results(&path);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].kind, ResultKind::Objective);
    }
}
