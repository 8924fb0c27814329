use crate::cli::{Cli, Commands, TargetArgs};
use crate::config::{ClusterKind, Config};
use crate::health::{HealthCheckSuite, ResourceProbeRunner};
use crate::observability::{Observer, ObserverEvent, create_observer};
use crate::plan::{
    Orchestrator, Plan, ResourceStepRunner, StepExecutor, TeardownRollback,
};
use crate::report::{FinalReport, RenderOptions, ReportFormatter, RunReport};
use crate::resource::{CliResourceClient, ResourceClient};
use anyhow::{Context, Result, anyhow};
use std::fmt::Write;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Run the selected command and return the process exit code.
///
/// Errors returned from here happen before any step runs (bad flags, bad
/// config, an invalid plan); the caller maps them to exit code 2.
pub async fn dispatch(cli: Cli, mut config: Config) -> Result<u8> {
    match &cli.command {
        Commands::Deploy(args) => {
            apply_target_args(&mut config, &args.target)?;
            if let Some(parallelism) = args.parallelism {
                config.parallelism = parallelism;
            }
        }
        Commands::Teardown(args) => apply_target_args(&mut config, &args.target)?,
        Commands::Validate(args) => {
            apply_target_args(&mut config, &args.target)?;
            if let Some(parallelism) = args.parallelism {
                config.parallelism = parallelism;
            }
        }
    }
    config.validate()?;

    let formatter = ReportFormatter::new(RenderOptions {
        color: !cli.no_color && console::colors_enabled(),
        ..RenderOptions::default()
    });

    if let Commands::Deploy(args) = &cli.command
        && args.dry_run
    {
        let plan = deploy_plan_checked(&config, args.resume_from.as_deref())?;
        print!("{}", describe_plan(&plan));
        return Ok(0);
    }
    if let Commands::Teardown(args) = &cli.command
        && args.dry_run
    {
        print!("{}", describe_plan(&crate::app::topology::teardown_plan(&config, args.purge)?));
        return Ok(0);
    }

    let client: Arc<dyn ResourceClient> = Arc::new(CliResourceClient::new(config.tools.clone()));
    let observer = create_observer(&config.observability);
    let cancel = CancellationToken::new();
    let _stop_watchers = cancel.clone().drop_guard();
    spawn_cancel_watchers(&cancel, config.run_timeout());

    let report = match &cli.command {
        Commands::Deploy(args) => {
            deploy(&config, client, observer, args.resume_from.as_deref(), &cancel).await?
        }
        Commands::Teardown(args) => teardown(&config, client, observer, args.purge, &cancel).await?,
        Commands::Validate(_) => validate(&config, client, observer, &cancel).await?,
    };

    println!("{}", formatter.render(&report, cli.output)?);
    Ok(report.exit_code())
}

/// Layer command-line overrides over file and environment values.
pub fn apply_target_args(config: &mut Config, args: &TargetArgs) -> Result<()> {
    if let Some(endpoint) = &args.endpoint {
        config.endpoint.clone_from(endpoint);
    }
    if let Some(namespace) = &args.namespace {
        config.namespace.clone_from(namespace);
    }
    if let Some(release) = &args.release {
        config.release.clone_from(release);
    }
    if let Some(kind) = &args.cluster_kind {
        config.cluster_kind = ClusterKind::from_str(kind)
            .map_err(|_| anyhow!("unknown cluster kind '{kind}'"))?;
    }
    if let Some(secs) = args.timeout {
        config.timeout_secs = secs;
    }
    Ok(())
}

fn deploy_plan_checked(config: &Config, resume_from: Option<&str>) -> Result<Plan> {
    let plan = crate::app::topology::deploy_plan(config).context("invalid deploy plan")?;
    if let Some(id) = resume_from
        && plan.position(id).is_none()
    {
        return Err(anyhow!(
            "cannot resume plan {}: unknown step '{id}'",
            plan.id
        ));
    }
    Ok(plan)
}

fn validation_suite(
    config: &Config,
    client: Arc<dyn ResourceClient>,
    observer: Arc<dyn Observer>,
) -> Result<HealthCheckSuite> {
    let checks = crate::app::topology::validation_checks(config);
    let probes = Arc::new(ResourceProbeRunner::new(client));
    Ok(HealthCheckSuite::new(checks, probes, observer)
        .context("invalid health check graph")?
        .with_parallelism(config.parallelism))
}

fn orchestrator(
    config: &Config,
    client: &Arc<dyn ResourceClient>,
    observer: &Arc<dyn Observer>,
) -> Orchestrator {
    let runner = Arc::new(ResourceStepRunner::new(Arc::clone(client)));
    let executor = StepExecutor::new(runner, Arc::clone(observer));
    Orchestrator::new(executor, Arc::clone(observer)).with_parallelism(config.parallelism)
}

/// Install, then validate once every group has run. A fatal failure rolls
/// back what was applied.
pub async fn deploy(
    config: &Config,
    client: Arc<dyn ResourceClient>,
    observer: Arc<dyn Observer>,
    resume_from: Option<&str>,
    cancel: &CancellationToken,
) -> Result<FinalReport> {
    let plan = deploy_plan_checked(config, resume_from)?;
    let suite = validation_suite(config, Arc::clone(&client), Arc::clone(&observer))?;

    let mut orchestrator = orchestrator(config, &client, &observer)
        .with_rollback(Arc::new(TeardownRollback::new(
            Arc::clone(&client),
            config.step_timeout(),
        )))
        .with_validator(Arc::new(suite));
    if let Some(id) = resume_from {
        orchestrator = orchestrator.resume_from(id);
    }

    info!(namespace = %config.namespace, release = %config.release, cluster = %config.cluster_kind, "deploy");
    orchestrator.execute(&plan, cancel).await
}

pub async fn teardown(
    config: &Config,
    client: Arc<dyn ResourceClient>,
    observer: Arc<dyn Observer>,
    purge: bool,
    cancel: &CancellationToken,
) -> Result<FinalReport> {
    let plan = crate::app::topology::teardown_plan(config, purge).context("invalid teardown plan")?;
    info!(namespace = %config.namespace, release = %config.release, purge, "teardown");
    orchestrator(config, &client, &observer)
        .execute(&plan, cancel)
        .await
}

/// Health checks only, against whatever is currently deployed.
pub async fn validate(
    config: &Config,
    client: Arc<dyn ResourceClient>,
    observer: Arc<dyn Observer>,
    cancel: &CancellationToken,
) -> Result<FinalReport> {
    let suite = validation_suite(config, client, Arc::clone(&observer))?;

    let mut report = RunReport::new(crate::app::topology::VALIDATE_PLAN);
    report.start();
    observer.record_event(&ObserverEvent::RunStart {
        run_id: report.run_id().to_string(),
        plan: report.plan_id().to_string(),
        steps: 0,
    });

    for outcome in suite.run(cancel).await {
        report.record_check(outcome)?;
    }
    if cancel.is_cancelled() {
        report.abort("run cancelled");
    } else {
        report.complete();
    }

    observer.record_event(&ObserverEvent::RunEnd {
        run_id: report.run_id().to_string(),
        state: report.state(),
        duration: report.elapsed(),
    });
    observer.flush();
    Ok(report.finish())
}

/// Cancel the run on Ctrl-C or when the run deadline passes. Watchers end
/// once the token is cancelled.
fn spawn_cancel_watchers(cancel: &CancellationToken, run_timeout: Option<Duration>) {
    let token = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            () = token.cancelled() => {}
            signal = tokio::signal::ctrl_c() => {
                if signal.is_ok() {
                    warn!("interrupt received, cancelling run");
                    token.cancel();
                }
            }
        }
    });

    if let Some(after) = run_timeout {
        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(after) => {
                    warn!(after_secs = after.as_secs(), "run deadline exceeded, cancelling run");
                    token.cancel();
                }
            }
        });
    }
}

/// Human-readable plan for `--dry-run`.
pub fn describe_plan(plan: &Plan) -> String {
    let mut out = format!("plan {}: {}\n", plan.id, plan.description);
    for range in plan.groups() {
        let group = plan.steps[range.start].group.as_deref();
        if let Some(group) = group {
            let _ = writeln!(out, "  [{group}] (parallel)");
        }
        for step in &plan.steps[range] {
            let indent = if group.is_some() { "    " } else { "  " };
            let _ = writeln!(
                out,
                "{indent}{} ({}, timeout {}s, {} attempt(s)): {}",
                step.id,
                step.failure,
                step.timeout.as_secs(),
                step.retry.max_attempts,
                step.action
            );
            if let Some(precondition) = &step.precondition {
                let _ = writeln!(out, "{indent}  only if {precondition}");
            }
        }
    }
    out
}
