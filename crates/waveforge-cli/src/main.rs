//! `engine`: the CLI surface over the four library crates. Running a workflow file,
//! validating it, managing cron schedules, and running the message-trigger listener
//! all live here; every other crate stays free of YAML parsing and argument handling.

mod config;
mod loader;
mod output;

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use waveforge_core::model::{ExecutionPolicy, WorkflowSchedule};
use waveforge_cron::{default_store_path, CronExpression, Orchestrator, SchedulePersistence};
use waveforge_cron::{JsonFileSchedules, OrchestratorEvent};
use waveforge_exec::{ExecutorDispatcher, NoopWebhookNotifier, OverallStatus, RunOptions, Runner};
use waveforge_triggers::{HttpTriggerListener, MatchOutcome, MessageSource, TriggerDispatcher, TriggerMatcher, TriggerRule};

use output::OutputFormat;

const EXIT_OK: u8 = 0;
const EXIT_VALIDATION: u8 = 1;
const EXIT_EXECUTION: u8 = 2;
const EXIT_CANCELLED: u8 = 3;

const KNOWN_SUBCOMMANDS: &[&str] = &["run", "validate", "schedule", "trigger", "help"];

#[derive(Parser)]
#[command(name = "engine", version, about = "Runs and schedules YAML-defined workflows")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a workflow. This is also what a bare `engine <workflow.yaml>` expands to.
    Run(RunArgs),

    /// Parse and validate a workflow without executing it.
    Validate { workflow: String },

    /// Manage cron-scheduled workflow runs.
    Schedule {
        #[command(subcommand)]
        command: ScheduleCommand,
    },

    /// Manage and run message-based workflow triggers.
    Trigger {
        #[command(subcommand)]
        command: TriggerCommand,
    },
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Path to the workflow YAML file.
    workflow: String,

    /// Enable debug-level logging.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Build and print the execution plan without running any task.
    #[arg(short = 'n', long = "dry-run")]
    dry_run: bool,

    /// Suppress the per-task results table; still prints the summary line.
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,

    /// Overrides the workflow's `defaultTimeoutMs`, in seconds.
    #[arg(short = 't', long = "timeout", value_name = "SECONDS")]
    timeout_secs: Option<u64>,

    /// Working directory tasks run from (default: the current directory).
    #[arg(short = 'C', long = "chdir", value_name = "DIR")]
    working_directory: Option<String>,

    /// Additional environment variable, repeatable.
    #[arg(short = 'e', long = "env", value_name = "NAME=VALUE")]
    env: Vec<String>,

    /// Workflow parameter, available to `${{ params.* }}`, repeatable.
    #[arg(long = "param", value_name = "name=value")]
    param: Vec<String>,

    /// Emit the run summary as JSON instead of text.
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum ScheduleCommand {
    /// Register a new cron schedule for a workflow.
    Add {
        workflow: String,
        /// 5- or 6-field cron expression.
        #[arg(long)]
        cron: String,
        #[arg(long)]
        name: String,
        /// Accepted for forward compatibility; schedules run on UTC regardless.
        #[arg(long)]
        timezone: Option<String>,
        #[arg(short = 'e', long = "env", value_name = "NAME=VALUE")]
        env: Vec<String>,
    },
    /// List every registered schedule.
    List,
    /// Delete a schedule.
    Remove { id: String },
    /// Re-enable a disabled schedule.
    Enable { id: String },
    /// Disable a schedule without deleting it.
    Disable { id: String },
    /// Start the 60-second tick loop and run due schedules until interrupted.
    Run,
}

#[derive(Subcommand)]
enum TriggerCommand {
    /// Start the HTTP listener and dispatch matched messages to their workflows.
    Run {
        #[arg(long)]
        config: String,
    },
    /// Check that every rule in a trigger config compiles.
    Validate { config: String },
    /// List the rules in a trigger config.
    List {
        #[arg(long)]
        config: String,
    },
    /// Evaluate a single message against a trigger config without dispatching.
    Test {
        message: String,
        #[arg(long, value_parser = ["telegram", "discord", "slack", "http"])]
        source: String,
        #[arg(long)]
        config: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    let mut argv: Vec<String> = std::env::args().collect();
    if let Some(first) = argv.get(1) {
        let looks_like_flag = first.starts_with('-');
        if !looks_like_flag && !KNOWN_SUBCOMMANDS.contains(&first.as_str()) {
            argv.insert(1, "run".to_string());
        }
    }
    let cli = Cli::parse_from(argv);

    let verbose = matches!(&cli.command, Command::Run(args) if args.verbose);
    config::init_logging(verbose);

    let code = match cli.command {
        Command::Run(args) => cmd_run(args).await,
        Command::Validate { workflow } => cmd_validate(&workflow),
        Command::Schedule { command } => cmd_schedule(command).await,
        Command::Trigger { command } => cmd_trigger(command).await,
    };
    ExitCode::from(code)
}

fn parse_key_values(items: &[String]) -> Result<BTreeMap<String, String>, String> {
    let mut map = BTreeMap::new();
    for item in items {
        let (key, value) = item
            .split_once('=')
            .ok_or_else(|| format!("'{item}' is not in NAME=VALUE form"))?;
        map.insert(key.to_string(), value.to_string());
    }
    Ok(map)
}

async fn cmd_run(args: RunArgs) -> u8 {
    let engine_config = config::EngineConfig::from_env();

    let mut workflow = match loader::load_workflow(&args.workflow) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("error: {e}");
            return EXIT_VALIDATION;
        }
    };

    if let Some(secs) = args.timeout_secs {
        workflow.default_timeout_ms = secs * 1000;
    } else if let Some(ms) = engine_config.default_timeout_ms {
        workflow.default_timeout_ms = ms;
    }
    if workflow.default_shell.is_none() {
        workflow.default_shell = engine_config.default_shell.clone();
    }

    let env = match parse_key_values(&args.env) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("error: {e}");
            return EXIT_VALIDATION;
        }
    };
    let params = match parse_key_values(&args.param) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("error: {e}");
            return EXIT_VALIDATION;
        }
    };

    let working_directory = args.working_directory.clone().or_else(|| engine_config.default_working_dir.clone());

    let options = RunOptions {
        run_id: None,
        working_directory,
        params,
        additional_environment: env,
        dry_run: args.dry_run,
        step_mode: false,
    };

    let dispatcher = ExecutorDispatcher::default();
    let notifier = NoopWebhookNotifier;
    let runner = Runner::new(&dispatcher, &notifier);

    let cancellation = CancellationToken::new();
    let signal_token = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received interrupt, cancelling the run");
            signal_token.cancel();
        }
    });

    let workflow_name = workflow.name.clone();
    let format = OutputFormat::from_flag(args.json);

    match runner.run(Arc::new(workflow), options, cancellation).await {
        Ok((summary, _publisher)) => {
            if format.is_json() {
                format.print_value(&summary);
            } else {
                if !args.quiet {
                    print_results_table(&summary.results);
                }
                output::print_summary_line(
                    &workflow_name,
                    summary.status,
                    summary.succeeded,
                    summary.failed,
                    summary.skipped,
                    summary.duration_ms,
                );
            }
            match summary.status {
                OverallStatus::Succeeded | OverallStatus::Pending => EXIT_OK,
                OverallStatus::Failed => EXIT_EXECUTION,
                OverallStatus::Cancelled => EXIT_CANCELLED,
            }
        }
        Err(e) => {
            eprintln!("error: {e}");
            EXIT_VALIDATION
        }
    }
}

fn print_results_table(results: &[waveforge_core::model::TaskResult]) {
    if results.is_empty() {
        return;
    }
    output::print_table_header(&[("TASK", 24), ("STATUS", 10), ("EXIT", 6), ("DURATION", 10)]);
    for result in results {
        let status = format!("{:?}", result.status).to_uppercase();
        let exit = result.exit_code.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string());
        let duration = format!("{:.2}s", result.duration_ms as f64 / 1000.0);
        output::print_table_row(&[
            (result.task_id.as_str(), 24),
            (status.as_str(), 10),
            (exit.as_str(), 6),
            (duration.as_str(), 10),
        ]);
    }
}

fn cmd_validate(path: &str) -> u8 {
    let workflow = match loader::load_workflow(path) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("error: {e}");
            return EXIT_VALIDATION;
        }
    };

    match waveforge_core::build_execution_plan(&workflow) {
        Ok(plan) => {
            let always_note = if plan.always_tasks.is_empty() {
                String::new()
            } else {
                format!(", {} always-task(s)", plan.always_tasks.len())
            };
            println!(
                "{path} is valid: {} task(s) across {} wave(s){always_note}",
                plan.total_tasks(),
                plan.waves.len(),
            );
            EXIT_OK
        }
        Err(e) => {
            eprintln!("{path} is invalid: {e}");
            EXIT_VALIDATION
        }
    }
}

fn build_orchestrator() -> Result<Arc<Orchestrator>, String> {
    let store = JsonFileSchedules::open(default_store_path()).map_err(|e| e.to_string())?;
    let orchestrator = Orchestrator::new(
        Arc::new(store),
        Arc::new(loader::YamlWorkflowLoader),
        Arc::new(ExecutorDispatcher::default()),
        Arc::new(NoopWebhookNotifier),
    );
    Ok(Arc::new(orchestrator))
}

async fn cmd_schedule(command: ScheduleCommand) -> u8 {
    match command {
        ScheduleCommand::Add { workflow, cron, name, timezone, env } => {
            if timezone.is_some() {
                tracing::warn!("--timezone is accepted but schedules are always evaluated in UTC");
            }
            let input_parameters = match parse_key_values(&env) {
                Ok(m) => m,
                Err(e) => {
                    eprintln!("error: {e}");
                    return EXIT_VALIDATION;
                }
            };
            let expr = match CronExpression::parse(&cron) {
                Ok(e) => e,
                Err(e) => {
                    eprintln!("error: {e}");
                    return EXIT_VALIDATION;
                }
            };
            if let Err(e) = expr.ensure_reachable(Utc::now()) {
                eprintln!("error: {e}");
                return EXIT_VALIDATION;
            }
            if !std::path::Path::new(&workflow).exists() {
                eprintln!("error: workflow file '{workflow}' does not exist");
                return EXIT_VALIDATION;
            }

            let schedule = WorkflowSchedule {
                id: uuid::Uuid::new_v4().to_string(),
                workflow_path: workflow,
                cron_expression: cron,
                name: Some(name),
                description: None,
                enabled: true,
                created_at: Utc::now(),
                last_run_at: None,
                next_run_at: expr.next_occurrence(Utc::now()),
                input_parameters,
                execution_policy: ExecutionPolicy::default(),
            };

            let store = match JsonFileSchedules::open(default_store_path()) {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("error: {e}");
                    return EXIT_EXECUTION;
                }
            };
            let id = schedule.id.clone();
            match store.save(schedule).await {
                Ok(()) => {
                    println!("scheduled '{id}' ({})", expr.describe());
                    EXIT_OK
                }
                Err(e) => {
                    eprintln!("error: {e}");
                    EXIT_EXECUTION
                }
            }
        }
        ScheduleCommand::List => {
            let store = match JsonFileSchedules::open(default_store_path()) {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("error: {e}");
                    return EXIT_EXECUTION;
                }
            };
            let schedules = match store.get_all().await {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("error: {e}");
                    return EXIT_EXECUTION;
                }
            };
            if schedules.is_empty() {
                println!("no schedules registered");
                return EXIT_OK;
            }
            output::print_table_header(&[("ID", 36), ("NAME", 16), ("CRON", 14), ("ENABLED", 8), ("NEXT RUN", 24)]);
            for s in &schedules {
                let name = s.name.clone().unwrap_or_default();
                let next = s.next_run_at.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".to_string());
                output::print_table_row(&[
                    (s.id.as_str(), 36),
                    (name.as_str(), 16),
                    (s.cron_expression.as_str(), 14),
                    (if s.enabled { "yes" } else { "no" }, 8),
                    (next.as_str(), 24),
                ]);
            }
            EXIT_OK
        }
        ScheduleCommand::Remove { id } => {
            let store = match JsonFileSchedules::open(default_store_path()) {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("error: {e}");
                    return EXIT_EXECUTION;
                }
            };
            match store.delete(&id).await {
                Ok(()) => {
                    println!("removed '{id}'");
                    EXIT_OK
                }
                Err(e) => {
                    eprintln!("error: {e}");
                    EXIT_VALIDATION
                }
            }
        }
        ScheduleCommand::Enable { id } => set_schedule_enabled(&id, true).await,
        ScheduleCommand::Disable { id } => set_schedule_enabled(&id, false).await,
        ScheduleCommand::Run => {
            let orchestrator = match build_orchestrator() {
                Ok(o) => o,
                Err(e) => {
                    eprintln!("error: {e}");
                    return EXIT_EXECUTION;
                }
            };
            let mut events = orchestrator.subscribe();
            tokio::spawn(async move {
                while let Ok(event) = events.recv().await {
                    log_orchestrator_event(&event);
                }
            });

            let ticker = tokio::spawn(Arc::clone(&orchestrator).run_ticker());
            println!("schedule tick loop running, press Ctrl-C to stop");
            let _ = tokio::signal::ctrl_c().await;
            println!("shutting down");
            orchestrator.shutdown().await;
            let _ = ticker.await;
            EXIT_OK
        }
    }
}

async fn set_schedule_enabled(id: &str, enabled: bool) -> u8 {
    let store = match JsonFileSchedules::open(default_store_path()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return EXIT_EXECUTION;
        }
    };
    let mut schedule = match store.get(id).await {
        Ok(Some(s)) => s,
        Ok(None) => {
            eprintln!("error: schedule '{id}' not found");
            return EXIT_VALIDATION;
        }
        Err(e) => {
            eprintln!("error: {e}");
            return EXIT_EXECUTION;
        }
    };
    schedule.enabled = enabled;
    match store.save(schedule).await {
        Ok(()) => {
            println!("{} '{id}'", if enabled { "enabled" } else { "disabled" });
            EXIT_OK
        }
        Err(e) => {
            eprintln!("error: {e}");
            EXIT_EXECUTION
        }
    }
}

fn log_orchestrator_event(event: &OrchestratorEvent) {
    match event {
        OrchestratorEvent::ScheduledRunTriggered { schedule_id, run_id, is_manual, .. } => {
            tracing::info!(schedule_id, run_id, manual = is_manual, "run triggered");
        }
        OrchestratorEvent::ScheduledRunCompleted { schedule_id, status, duration_ms, error } => {
            tracing::info!(schedule_id, ?status, duration_ms, error = error.as_deref(), "run completed");
        }
    }
}

async fn cmd_trigger(command: TriggerCommand) -> u8 {
    match command {
        TriggerCommand::Run { config } => cmd_trigger_run(&config).await,
        TriggerCommand::Validate { config } => {
            let parsed = match loader::load_trigger_config(&config) {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("error: {e}");
                    return EXIT_VALIDATION;
                }
            };
            match TriggerMatcher::new(parsed.rules.clone()) {
                Ok(_) => {
                    println!("{config} is valid: {} rule(s)", parsed.rules.len());
                    EXIT_OK
                }
                Err(e) => {
                    eprintln!("{config} is invalid: {e}");
                    EXIT_VALIDATION
                }
            }
        }
        TriggerCommand::List { config } => {
            let parsed = match loader::load_trigger_config(&config) {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("error: {e}");
                    return EXIT_VALIDATION;
                }
            };
            if parsed.rules.is_empty() {
                println!("no rules defined");
                return EXIT_OK;
            }
            output::print_table_header(&[("NAME", 20), ("TYPE", 10), ("SOURCES", 20), ("WORKFLOW", 30)]);
            for rule in &parsed.rules {
                let kind = format!("{:?}", rule.kind).to_lowercase();
                let sources = rule.sources.iter().map(|s| format!("{s:?}").to_lowercase()).collect::<Vec<_>>().join(",");
                output::print_table_row(&[
                    (rule.name.as_str(), 20),
                    (kind.as_str(), 10),
                    (sources.as_str(), 20),
                    (rule.workflow_path.as_str(), 30),
                ]);
            }
            EXIT_OK
        }
        TriggerCommand::Test { message, source, config } => {
            let parsed = match loader::load_trigger_config(&config) {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("error: {e}");
                    return EXIT_VALIDATION;
                }
            };
            let matcher = match TriggerMatcher::new(parsed.rules.clone()) {
                Ok(m) => m,
                Err(e) => {
                    eprintln!("error: {e}");
                    return EXIT_VALIDATION;
                }
            };
            let source = parse_message_source(&source);
            let incoming = waveforge_triggers::IncomingMessage {
                message_id: uuid::Uuid::new_v4().to_string(),
                source,
                text: message,
                sender_username: None,
                sender_user_id: None,
                channel_id: None,
                channel_name: None,
                received_at: Utc::now(),
                metadata: BTreeMap::new(),
                raw_payload: None,
            };
            match matcher.evaluate(&incoming) {
                MatchOutcome::Matched(m) => {
                    println!("matched rule '{}' -> {}", m.rule_name, m.workflow_path);
                    for (key, value) in &m.captures {
                        println!("  {key} = {value}");
                    }
                    EXIT_OK
                }
                MatchOutcome::Cooldown { rule_name, remaining } => {
                    println!("rule '{rule_name}' matched but is cooling down for another {}s", remaining.as_secs());
                    EXIT_OK
                }
                MatchOutcome::NoMatch => {
                    println!("no rule matched");
                    EXIT_OK
                }
            }
        }
    }
}

fn parse_message_source(s: &str) -> MessageSource {
    match s {
        "telegram" => MessageSource::Telegram,
        "discord" => MessageSource::Discord,
        "slack" => MessageSource::Slack,
        _ => MessageSource::Http,
    }
}

async fn cmd_trigger_run(config_path: &str) -> u8 {
    let parsed = match loader::load_trigger_config(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return EXIT_VALIDATION;
        }
    };
    let rules_by_name: BTreeMap<String, TriggerRule> = parsed.rules.iter().map(|r| (r.name.clone(), r.clone())).collect();
    let matcher = match TriggerMatcher::new(parsed.rules.clone()) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("error: {e}");
            return EXIT_VALIDATION;
        }
    };

    let addr: SocketAddr = match parsed.listen_addr.parse() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("error: invalid listen address '{}': {e}", parsed.listen_addr);
            return EXIT_VALIDATION;
        }
    };

    let orchestrator = match build_orchestrator() {
        Ok(o) => o,
        Err(e) => {
            eprintln!("error: {e}");
            return EXIT_EXECUTION;
        }
    };
    let dispatcher = TriggerDispatcher::new(Arc::clone(&orchestrator));

    let listener = HttpTriggerListener::new(addr, parsed.slack_signing_secret.clone());
    if let Err(e) = listener.start().await {
        eprintln!("error: {e}");
        return EXIT_EXECUTION;
    }
    println!("trigger listener bound on {addr}, press Ctrl-C to stop");

    let mut messages = listener.subscribe();
    let mut events = orchestrator.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            log_orchestrator_event(&event);
        }
    });

    loop {
        tokio::select! {
            message = messages.recv() => {
                let Ok(message) = message else { continue };
                match matcher.evaluate(&message) {
                    MatchOutcome::Matched(matched) => {
                        let Some(rule) = rules_by_name.get(&matched.rule_name) else { continue };
                        match dispatcher.dispatch(rule, &matched, &message).await {
                            Ok(run_id) => {
                                tracing::info!(rule = %matched.rule_name, run_id, "dispatched workflow run");
                                if let Some(reply) = dispatcher.resolve_response(rule, &matched, &run_id, &message) {
                                    let _ = listener.send_response(&message, &reply).await;
                                }
                            }
                            Err(e) => tracing::warn!(rule = %matched.rule_name, error = %e, "failed to dispatch"),
                        }
                    }
                    MatchOutcome::Cooldown { rule_name, remaining } => {
                        tracing::debug!(rule = %rule_name, remaining_secs = remaining.as_secs(), "rule matched but cooling down");
                    }
                    MatchOutcome::NoMatch => {}
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    println!("shutting down");
    listener.stop().await;
    orchestrator.shutdown().await;
    EXIT_OK
}
