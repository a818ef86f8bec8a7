//! `orion` command-line entry point: `hunt` (run/resume an experiment, the
//! worker loop entry point) and `list` (enumerate experiments).
//!
//! Grounded on `fsqlite-harness/src/bin/benchmark_corpus_manifest.rs`'s
//! hand-rolled `parse_args`/`run`/`main` shape — the corpus never reaches
//! for `clap`, so neither does this.

use orion::{
    detect_conflicts, init_logging, workon, AdapterChain, BranchingFlags, ChangeType, ConflictKind,
    Conflicts, Consumer, EvcTree, Experiment, ExperimentConfig, ExperimentConfigView,
    ExperimentQuery, ExperimentRecord, MaxObservedLie, MemoryStorage, OrionError, Producer,
    RandomSearch, Refers, Resolution, ResolutionParams, SpaceBuilder, StorageBackend,
};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

fn print_help() {
    let help = "\
orion — black-box hyperparameter optimization

USAGE:
    orion hunt --name NAME [OPTIONS] -- SCRIPT [ANNOTATED ARGS...]
    orion list [--name NAME] [--user USER]

HUNT OPTIONS:
    --name NAME            Experiment name (required)
    --user USER            Experiment owner (default: current user)
    --max-trials N         Stop once N trials have completed
    --max-broken N         Trials allowed to fail before the experiment is broken (default: 10)
    --pool-size N          Max concurrent workers (default: 1)
    --worker-trials N      This worker's own trial quota (default: unlimited)

    Annotated args after `--` may declare dimensions (`--lr~loguniform(1e-5,1)`)
    or branching markers (`OLD~>NEW`, `NAME~+DEFAULT`, `NAME~-DEFAULT`).

    Branching flags (spec §6), needed when re-running `--name NAME` against
    a changed space/script/algorithm and no marker resolves the conflict:
    --branch NAME                   New experiment name for this version
    --algorithm-change               Acknowledge an algorithm change
    --code-change-type TYPE          unsure | noeffect | break
    --cli-change-type TYPE           unsure | noeffect | break
    --config-change-type TYPE        unsure | noeffect | break

    -h, --help             Show this help
";
    println!("{help}");
}

struct HuntConfig {
    name: String,
    user: String,
    max_trials: Option<u64>,
    max_broken: u32,
    pool_size: u32,
    worker_trials: Option<u64>,
    script_and_args: Vec<String>,
    branching: BranchingFlags,
}

fn parse_change_type(flag: &str, raw: &str) -> Result<ChangeType, String> {
    match raw {
        "unsure" => Ok(ChangeType::Unsure),
        "noeffect" => Ok(ChangeType::NoEffect),
        "break" => Ok(ChangeType::Break),
        other => Err(format!("{flag} expects unsure|noeffect|break, got: {other}")),
    }
}

fn parse_hunt_args(args: &[String]) -> Result<HuntConfig, String> {
    let mut name = None;
    let mut user = env::var("USER").unwrap_or_else(|_| "anonymous".to_owned());
    let mut max_trials = None;
    let mut max_broken = 10u32;
    let mut pool_size = 1u32;
    let mut worker_trials = None;
    let mut script_and_args = Vec::new();
    let mut branching = BranchingFlags::default();

    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "--name" => {
                index += 1;
                name = Some(require_value(args, index, "--name")?.clone());
            }
            "--user" => {
                index += 1;
                user = require_value(args, index, "--user")?.clone();
            }
            "--max-trials" => {
                index += 1;
                max_trials = Some(parse_u64(require_value(args, index, "--max-trials")?)?);
            }
            "--max-broken" => {
                index += 1;
                max_broken = parse_u64(require_value(args, index, "--max-broken")?)? as u32;
            }
            "--pool-size" => {
                index += 1;
                pool_size = parse_u64(require_value(args, index, "--pool-size")?)? as u32;
            }
            "--worker-trials" => {
                index += 1;
                worker_trials = Some(parse_u64(require_value(args, index, "--worker-trials")?)?);
            }
            "--branch" => {
                index += 1;
                branching.branch = Some(require_value(args, index, "--branch")?.clone());
            }
            "--algorithm-change" => {
                branching.algorithm_change = true;
            }
            "--code-change-type" => {
                index += 1;
                branching.code_change_type = Some(parse_change_type("--code-change-type", require_value(args, index, "--code-change-type")?)?);
            }
            "--cli-change-type" => {
                index += 1;
                branching.cli_change_type = Some(parse_change_type("--cli-change-type", require_value(args, index, "--cli-change-type")?)?);
            }
            "--config-change-type" => {
                index += 1;
                branching.config_change_type = Some(parse_change_type("--config-change-type", require_value(args, index, "--config-change-type")?)?);
            }
            "--" => {
                script_and_args = args[index + 1..].to_vec();
                break;
            }
            unknown => return Err(format!("unknown hunt option: {unknown}")),
        }
        index += 1;
    }

    let name = name.ok_or_else(|| "hunt requires --name".to_owned())?;
    if script_and_args.is_empty() {
        return Err("hunt requires a script after `--`".to_owned());
    }

    Ok(HuntConfig { name, user, max_trials, max_broken, pool_size, worker_trials, script_and_args, branching })
}

fn require_value<'a>(args: &'a [String], index: usize, flag: &str) -> Result<&'a String, String> {
    args.get(index).ok_or_else(|| format!("{flag} requires a value"))
}

fn parse_u64(raw: &str) -> Result<u64, String> {
    raw.parse::<u64>().map_err(|_| format!("invalid numeric value: {raw}"))
}

/// Rebuilds the slice of a prior experiment version's configuration that
/// conflict detection compares, from its persisted storage record (spec
/// §4.2's detector inputs).
fn experiment_config_view_from_record(record: &ExperimentRecord) -> Result<ExperimentConfigView, String> {
    let space_tokens: Vec<String> = record.config["space"]
        .as_str()
        .unwrap_or_default()
        .split_whitespace()
        .map(str::to_owned)
        .collect();
    let (space, _) = SpaceBuilder::build(&space_tokens).map_err(|e| e.to_string())?;
    let cli_tokens = record.config["metadata"]["user_args"]
        .as_array()
        .map(|values| values.iter().filter_map(|v| v.as_str().map(str::to_owned)).collect())
        .unwrap_or_default();
    Ok(ExperimentConfigView {
        name: record.name.clone(),
        space,
        algorithm: record.config["algorithm"].to_string(),
        code_hash: None,
        cli_tokens,
        script_config_hash: None,
    })
}

/// Rebuilds a prior version's place in the EVC tree from its persisted
/// record (spec §3 Experiment `refers`; adapter chains are not persisted,
/// only root/parent linkage, since only the newly branched edge's chain is
/// needed to adapt trials going forward).
fn refers_from_record(record: &ExperimentRecord) -> Refers {
    Refers {
        root_id: record.config["refers"]["root_id"].as_str().unwrap_or(&record.id).to_owned(),
        parent_id: record.config["refers"]["parent_id"].as_str().map(str::to_owned),
        adapter_chain: AdapterChain::default(),
    }
}

/// Finds the latest registered version of `name` owned by `user`, if any,
/// from the full version list (spec §4.4: "the EVC tree is built from
/// these").
fn latest_version(storage: &dyn StorageBackend, name: &str, user: &str) -> Option<ExperimentRecord> {
    let mut versions: Vec<ExperimentRecord> =
        Experiment::fetch_versions(storage, name).into_iter().filter(|r| r.user == user).collect();
    versions.sort_by_key(|r| r.version);
    versions.pop()
}

/// Runs conflict detection against the previous version and resolves it
/// into `(name, version, refers)` for the new one (spec §4.2, §4.4). Marker
/// and branching-flag resolutions are discovered non-interactively; an
/// unresolved conflict is fatal (spec §7 `ConflictUnresolvable`).
fn resolve_branch(
    prior: &ExperimentRecord,
    new_view: &ExperimentConfigView,
    tokens: &[String],
    flags: &BranchingFlags,
) -> Result<(String, u32, Refers), String> {
    let old_view = experiment_config_view_from_record(prior)?;
    let old_refers = refers_from_record(prior);

    let mut conflicts = Conflicts::from_detected(detect_conflicts(&old_view, new_view));

    // A same-named re-run that otherwise matches is a resume, not a branch:
    // resolve the always-present ExperimentName conflict implicitly rather
    // than demanding `--branch` just to continue an unchanged experiment.
    if old_view.name == new_view.name {
        if let Some(idx) = conflicts.all().iter().position(|c| c.kind == ConflictKind::ExperimentName) {
            conflicts
                .try_resolve(idx, ResolutionParams::ExperimentName { new_name: new_view.name.clone() })
                .map_err(|e| e.to_string())?;
        }
    }

    for (index, params) in conflicts.discover_markers(tokens, flags) {
        conflicts.try_resolve(index, params).map_err(|e| e.to_string())?;
    }

    if !conflicts.are_resolved() {
        return Err(OrionError::ConflictUnresolvable {
            reason: format!(
                "{} unresolved conflict(s) branching experiment '{}'; supply a marker or branching flag",
                conflicts.get_remaining().len(),
                new_view.name,
            ),
        }
        .to_string());
    }

    let adapter_chain = AdapterChain::new(conflicts.get_resolutions().iter().filter_map(Resolution::adapter).collect());
    let new_name = conflicts
        .get_resolutions()
        .iter()
        .find_map(|r| match &r.params {
            ResolutionParams::ExperimentName { new_name } => Some(new_name.clone()),
            _ => None,
        })
        .unwrap_or_else(|| old_view.name.clone());
    let version = if new_name == old_view.name { prior.version + 1 } else { 1 };
    let refers = Refers { root_id: old_refers.root_id.clone(), parent_id: Some(prior.id.clone()), adapter_chain };

    let tree = EvcTree::build(&[(prior.id.clone(), old_refers), ("__pending__".to_owned(), refers.clone())]);
    info!(
        parent_id = %prior.id,
        root_id = %refers.root_id,
        child_count = tree.node(&prior.id).map(|n| n.children.len()).unwrap_or_default(),
        "orion.cli::run_hunt linked new version into the EVC tree",
    );

    Ok((new_name, version, refers))
}

fn run_hunt(args: &[String]) -> Result<ExitCode, String> {
    let config = parse_hunt_args(args)?;
    let script = config.script_and_args[0].clone();
    let (space, template) = SpaceBuilder::build(&config.script_and_args[1..])
        .map_err(|e| e.to_string())?;

    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryStorage::new());
    let prior = latest_version(storage.as_ref(), &config.name, &config.user);

    let new_view = ExperimentConfigView {
        name: config.name.clone(),
        space: space.clone(),
        algorithm: serde_json::json!({"kind": "random"}).to_string(),
        code_hash: None,
        cli_tokens: config.script_and_args.clone(),
        script_config_hash: None,
    };

    let (name, version, refers) = match &prior {
        None => (config.name.clone(), 1, Refers { root_id: String::new(), parent_id: None, adapter_chain: AdapterChain::default() }),
        Some(record) => resolve_branch(record, &new_view, &config.script_and_args, &config.branching)?,
    };

    let mut experiment_config = ExperimentConfig {
        name,
        version,
        user: config.user,
        space,
        algorithm: serde_json::json!({"kind": "random"}),
        max_trials: config.max_trials,
        max_broken: config.max_broken,
        pool_size: config.pool_size,
        metadata: serde_json::json!({"user_script": script, "user_args": config.script_and_args}),
        refers,
    };
    if experiment_config.refers.root_id.is_empty() {
        experiment_config.refers.root_id = experiment_config.code_hash();
    }

    let experiment = Experiment::create(experiment_config, storage.clone()).map_err(|e| e.to_string())?;

    let mut producer = Producer::new(
        experiment.id(),
        &experiment.config.space,
        experiment.config.pool_size as usize,
        Box::new(RandomSearch::new(experiment.id())),
        Box::new(MaxObservedLie),
        storage.as_ref(),
    );
    let consumer = Consumer::new(experiment.config.name.clone(), script.clone(), &template);

    let exit = workon(&experiment, &mut producer, &consumer, storage.as_ref(), 60_000, config.worker_trials);
    let code = exit.exit_code();
    if code != 0 {
        eprintln!("orion: worker exited with code {code}");
    }
    Ok(ExitCode::from(code as u8))
}

fn run_list(args: &[String]) -> Result<ExitCode, String> {
    let mut name = None;
    let mut user = None;
    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "--name" => {
                index += 1;
                name = Some(require_value(args, index, "--name")?.clone());
            }
            "--user" => {
                index += 1;
                user = Some(require_value(args, index, "--user")?.clone());
            }
            unknown => return Err(format!("unknown list option: {unknown}")),
        }
        index += 1;
    }

    let storage = MemoryStorage::new();
    let experiments = storage.fetch_experiments(&ExperimentQuery { name, user });
    for record in experiments {
        println!("{} v{} ({})", record.name, record.version, record.user);
    }
    Ok(ExitCode::SUCCESS)
}

fn run(args: &[String]) -> Result<ExitCode, String> {
    match args.first().map(String::as_str) {
        Some("hunt") => run_hunt(&args[1..]),
        Some("list") => run_list(&args[1..]),
        Some("-h" | "--help") | None => {
            print_help();
            Ok(ExitCode::SUCCESS)
        }
        Some(unknown) => Err(format!("unknown subcommand: {unknown}")),
    }
}

fn main() -> ExitCode {
    init_logging();
    let args: Vec<String> = env::args().skip(1).collect();
    match run(&args) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("orion: error: {error}");
            ExitCode::from(2)
        }
    }
}
