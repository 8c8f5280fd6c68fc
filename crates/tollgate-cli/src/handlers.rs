//! Command handlers.

use crate::config::{CliConfig, OutputFormat};
use anyhow::Context;
use console::style;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tollgate_bundle::BundleClient;
use tollgate_core::branch::{self, BranchRule};
use tollgate_core::checkrun::CheckRunResult;
use tollgate_core::events::{EventKind, TriggerEvent};
use tollgate_core::ids::RunHandle;
use tollgate_core::pipeline::PipelineDefinition;
use tollgate_scheduler::{
    Collaborators, DecisionSource, Orchestrator, TriggerDecision, TriggerEvaluator, TriggerOutcome,
    WatchOutcome,
};
use tracing::{info, warn};

pub fn load_rules(path: &Path) -> anyhow::Result<Vec<BranchRule>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("read rules {}", path.display()))?;
    serde_yaml::from_str(&content).with_context(|| format!("parse rules {}", path.display()))
}

pub fn load_definition(path: &Path) -> anyhow::Result<PipelineDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("read definition {}", path.display()))?;
    PipelineDefinition::parse(&content).with_context(|| format!("parse definition {}", path.display()))
}

/// Read an event file. JSON files parse as YAML too.
pub fn load_event(path: &Path) -> anyhow::Result<TriggerEvent> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("read event {}", path.display()))?;
    let event: TriggerEvent =
        serde_yaml::from_str(&content).with_context(|| format!("parse event {}", path.display()))?;
    event.validate()?;
    Ok(event)
}

/// Decide whether `definition` runs for an event of `kind` on `reference`.
pub fn decide(
    definition: &PipelineDefinition,
    rules: &[BranchRule],
    reference: &str,
    kind: EventKind,
) -> (BranchRule, TriggerDecision) {
    let rule = branch::resolve(reference, rules);
    let decision = TriggerEvaluator::new().evaluate(definition, reference, kind, &rule);
    (rule, decision)
}

/// `definition` re-serialized with every `action_types` action unbounded.
pub fn rewritten(definition: &PipelineDefinition, action_types: &[String]) -> anyhow::Result<String> {
    Ok(definition.with_unbounded_timeouts(action_types).to_yaml()?)
}

fn emit<T: Serialize>(output: OutputFormat, value: &T, table: impl FnOnce()) -> anyhow::Result<()> {
    match output {
        OutputFormat::Table => table(),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}

fn yes_no(flag: bool) -> console::StyledObject<&'static str> {
    if flag { style("yes").green() } else { style("no").red() }
}

/// Show the rule governing a reference.
pub fn resolve(rules: &Path, reference: &str, output: OutputFormat) -> anyhow::Result<()> {
    let rules = load_rules(rules)?;
    let rule = branch::resolve(reference, &rules);

    emit(output, &rule, || match rule.workspace {
        Some(workspace) => {
            println!(
                "{} {} → {} (rule {})",
                style("✓").green(),
                style(reference).bold(),
                style(workspace).cyan(),
                rule.rule
            );
            println!("  trigger pipeline: {}", yes_no(rule.is_trigger_pipeline));
            println!("  need approval:    {}", yes_no(rule.need_approval));
            println!("  protected:        {}", yes_no(rule.is_protect));
        }
        None => println!("{} No rule matches {}", style("!").yellow(), style(reference).bold()),
    })
}

#[derive(Serialize)]
struct Evaluation<'a> {
    reference: &'a str,
    kind: String,
    trigger: bool,
    decided_by: &'static str,
    extend_deploy_timeout: bool,
    rule: &'a BranchRule,
}

/// Evaluate one definition file against a rule set.
pub fn evaluate(
    definition: &Path,
    rules: &Path,
    reference: &str,
    kind: EventKind,
    output: OutputFormat,
) -> anyhow::Result<()> {
    let parsed = load_definition(definition)?;
    let rules = load_rules(rules)?;
    let (rule, decision) = decide(&parsed, &rules, reference, kind);

    let decided_by = match decision.source {
        DecisionSource::Definition => "definition",
        DecisionSource::BranchRule => "branch rule",
    };
    let evaluation = Evaluation {
        reference,
        kind: kind.to_string(),
        trigger: decision.trigger,
        decided_by,
        extend_deploy_timeout: decision.extend_deploy_timeout,
        rule: &rule,
    };

    emit(output, &evaluation, || {
        let verdict = if decision.trigger {
            style("runs").green()
        } else {
            style("does not run").red()
        };
        println!(
            "{} {} on {} {} (decided by {})",
            style("▶").cyan(),
            style(definition.display()).bold(),
            kind,
            verdict,
            decided_by
        );
        if decision.extend_deploy_timeout {
            println!("  deploy timeouts are unbounded: {} needs approval", reference);
        }
    })
}

/// Print a definition with deploy timeouts unbounded.
pub fn rewrite(definition: &Path, action_types: &[String], config: &CliConfig) -> anyhow::Result<()> {
    let parsed = load_definition(definition)?;
    let action_types = if action_types.is_empty() {
        &config.tollgate.deploy_action_types[..]
    } else {
        action_types
    };
    print!("{}", rewritten(&parsed, action_types)?);
    Ok(())
}

#[derive(Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
enum OutcomeView<'a> {
    Dispatched {
        pipeline: &'a str,
        run: RunHandle,
        watched: bool,
    },
    Skipped {
        pipeline: &'a str,
        reason: &'a str,
    },
    Failed {
        pipeline: &'a str,
        error: &'a str,
    },
}

impl<'a> From<&'a TriggerOutcome> for OutcomeView<'a> {
    fn from(outcome: &'a TriggerOutcome) -> Self {
        match outcome {
            TriggerOutcome::Dispatched {
                pipeline,
                run,
                watched,
            } => OutcomeView::Dispatched {
                pipeline,
                run: *run,
                watched: *watched,
            },
            TriggerOutcome::Skipped { pipeline, reason } => OutcomeView::Skipped { pipeline, reason },
            TriggerOutcome::Failed { pipeline, error } => OutcomeView::Failed { pipeline, error },
        }
    }
}

pub fn watch_label(outcome: &WatchOutcome) -> &'static str {
    match outcome {
        WatchOutcome::Completed(CheckRunResult::Success) => "success",
        WatchOutcome::Completed(CheckRunResult::Failure) => "failure",
        WatchOutcome::Completed(CheckRunResult::Timeout) => "timeout",
        WatchOutcome::Completed(CheckRunResult::Cancelled) => "cancelled",
        WatchOutcome::ReportFailed => "report failed",
        WatchOutcome::CloseFailed => "close failed",
        WatchOutcome::Shutdown => "interrupted",
    }
}

/// Run one event through the trigger flow against the platform.
pub async fn trigger(
    config: &CliConfig,
    event_path: &Path,
    wait: bool,
    output: OutputFormat,
) -> anyhow::Result<()> {
    let event = load_event(event_path)?;
    let client = Arc::new(BundleClient::new(&config.bundle).context("build bundle client")?);
    let orchestrator = Arc::new(Orchestrator::new(
        Collaborators {
            engine: client.clone(),
            rules: client.clone(),
            reviews: client.clone(),
            definitions: client.clone(),
            apps: client,
        },
        &config.tollgate,
    ));

    let outcomes = orchestrator
        .handle_event(&event)
        .await
        .with_context(|| format!("handle {} event for app {}", event.kind(), event.app_id()))?;
    let views: Vec<OutcomeView<'_>> = outcomes.iter().map(OutcomeView::from).collect();
    emit(output, &views, || {
        for outcome in &outcomes {
            match outcome {
                TriggerOutcome::Dispatched { pipeline, run, .. } => {
                    println!("{} {} → run {}", style("✓").green(), style(pipeline).bold(), run)
                }
                TriggerOutcome::Skipped { pipeline, reason } => {
                    println!("{} {} skipped: {}", style("-").dim(), pipeline, reason)
                }
                TriggerOutcome::Failed { pipeline, error } => {
                    println!("{} {} failed: {}", style("✗").red(), style(pipeline).bold(), error)
                }
            }
        }
    })?;

    let watched = outcomes
        .iter()
        .filter(|o| matches!(o, TriggerOutcome::Dispatched { watched: true, .. }))
        .count();
    if !wait || watched == 0 {
        return Ok(());
    }

    info!(watched, "Waiting for merge request runs to finish");
    let interrupt = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping watchers");
                orchestrator.shutdown();
            }
        })
    };
    let finished = orchestrator.wait_for_watches().await;
    interrupt.abort();

    let labels: Vec<&str> = finished.iter().map(watch_label).collect();
    emit(output, &labels, || {
        for label in &labels {
            println!("  check run: {label}");
        }
    })?;

    let unreported = finished
        .iter()
        .filter(|o| matches!(o, WatchOutcome::ReportFailed | WatchOutcome::CloseFailed))
        .count();
    if unreported > 0 {
        anyhow::bail!("{unreported} run result(s) could not be reported to the review request");
    }
    Ok(())
}

/// Show the effective configuration.
pub fn show_config(config: &CliConfig, path: Option<&Path>) -> anyhow::Result<()> {
    println!("Current configuration:");
    print!("{}", serde_yaml::to_string(config)?);

    match path.map(Path::to_path_buf).or_else(CliConfig::default_path) {
        Some(path) if path.exists() => println!("\nConfig file: {}", path.display()),
        _ => println!("\nConfig file: (none, using defaults)"),
    }
    Ok(())
}
