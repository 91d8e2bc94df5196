//! Vibeflow - phase workflow engine for AI coding assistants.
//!
//! Tracks which development phase a conversation is in and prints the
//! instructions for it.

#![allow(clippy::single_match_else)]

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vibeflow::workflow::{bundled_names, read_override, GraphSource, WorkflowLoader};
use vibeflow::{
    ConversationIdentity, DefinitionError, EngineError, StartOptions, TransitionRequest,
    WorkflowEngine,
};

/// Phase workflow engine for AI coding assistants
#[derive(Parser)]
#[command(name = "vibeflow")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Project directory
    #[arg(short, long, global = true, default_value = ".")]
    project: PathBuf,

    /// Conversation id (default: derived from project and branch)
    #[arg(short, long, global = true, env = "VIBE_CONVERSATION_ID")]
    conversation: Option<String>,

    /// Git branch of the conversation
    #[arg(short, long, global = true)]
    branch: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List available workflows
    Workflows {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Only show workflows of this domain
        #[arg(short, long)]
        domain: Option<String>,
    },

    /// Start a conversation
    Start {
        /// Workflow to follow (default: from config)
        #[arg(short, long)]
        workflow: Option<String>,

        /// Plan file path (default: derived from the branch)
        #[arg(long)]
        plan: Option<PathBuf>,
    },

    /// Resolve the next phase and print its instructions
    Next {
        /// Trigger to fire (default: proceed)
        #[arg(short, long, conflicts_with = "to")]
        signal: Option<String>,

        /// Jump directly to a phase
        #[arg(short, long)]
        to: Option<String>,

        /// Reason for a direct jump
        #[arg(short, long, requires = "to")]
        reason: Option<String>,

        /// Show the result without committing it
        #[arg(long)]
        dry_run: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show the current phase of a conversation
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Reset a conversation to the initial phase
    Reset {
        /// Switch to another workflow
        #[arg(short, long)]
        workflow: Option<String>,

        /// Confirm the reset
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Validate a workflow document
    Validate {
        /// Document to validate (default: project override and bundled workflows)
        file: Option<PathBuf>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose { EnvFilter::new("debug") } else { EnvFilter::new("warn") };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(filter)
        .init();

    let context = CliContext::new(&cli)?;

    match cli.command {
        Commands::Workflows { format, domain } => {
            cmd_workflows(&context, &format, domain.as_deref())?;
        }
        Commands::Start { workflow, plan } => {
            cmd_start(&context, workflow, plan)?;
        }
        Commands::Next { signal, to, reason, dry_run, format } => {
            let request = match (to, signal) {
                (Some(target), _) => TransitionRequest::JumpTo { target, reason },
                (None, Some(signal)) => TransitionRequest::signal(signal),
                (None, None) => TransitionRequest::proceed(),
            };
            cmd_next(&context, &request, dry_run, &format)?;
        }
        Commands::Status { format } => {
            cmd_status(&context, &format)?;
        }
        Commands::Reset { workflow, yes } => {
            cmd_reset(&context, workflow.as_deref(), yes)?;
        }
        Commands::Validate { file } => {
            cmd_validate(&context, file.as_deref())?;
        }
        Commands::Completions { shell } => {
            cmd_completions(shell);
        }
    }

    Ok(())
}

/// Values shared by every command.
struct CliContext {
    project: PathBuf,
    identity: ConversationIdentity,
    branch: Option<String>,
}

impl CliContext {
    fn new(cli: &Cli) -> Result<Self> {
        let project = std::fs::canonicalize(&cli.project)
            .with_context(|| format!("Project directory not found: {}", cli.project.display()))?;
        let identity = match &cli.conversation {
            Some(id) => ConversationIdentity::new(id.clone(), project.clone()),
            None => ConversationIdentity::derive(project.clone(), cli.branch.as_deref()),
        };
        Ok(Self { project, identity, branch: cli.branch.clone() })
    }

    fn engine(&self) -> Result<WorkflowEngine> {
        WorkflowEngine::open(&self.project)
    }
}

/// List available workflows.
fn cmd_workflows(context: &CliContext, format: &str, domain: Option<&str>) -> Result<()> {
    let engine = context.engine()?;
    let workflows: Vec<_> = engine
        .list_workflows()?
        .into_iter()
        .filter(|w| domain.map_or(true, |d| w.domain.as_deref() == Some(d)))
        .collect();

    match format {
        "json" => {
            let json = serde_json::to_string_pretty(&workflows)?;
            println!("{json}");
        }
        _ => {
            for workflow in &workflows {
                let complexity =
                    workflow.complexity.map(|c| format!(" [{c}]")).unwrap_or_default();
                println!(
                    "{}{} - {}",
                    workflow.name,
                    complexity,
                    workflow.description.as_deref().unwrap_or("")
                );
            }
            println!("\nTotal: {} workflows", workflows.len());
        }
    }

    Ok(())
}

/// Start a conversation.
fn cmd_start(context: &CliContext, workflow: Option<String>, plan: Option<PathBuf>) -> Result<()> {
    let engine = context.engine()?;
    let options = StartOptions {
        workflow,
        git_branch: context.branch.clone(),
        plan_file_path: plan,
    };
    let state = engine.start(&context.identity, options)?;

    println!("Conversation: {}", state.conversation_id);
    println!("Workflow:     {}", state.workflow_name);
    println!("Phase:        {}", state.current_phase);
    if let Some(plan) = state.plan_file() {
        println!("Plan file:    {}", plan.display());
    }

    let graph = engine.graph(&state.workflow_name)?;
    if let Some(phase) = graph.state(&state.current_phase) {
        println!("\n{}", phase.default_instructions);
    }
    Ok(())
}

/// Resolve the next phase.
fn cmd_next(
    context: &CliContext,
    request: &TransitionRequest,
    dry_run: bool,
    format: &str,
) -> Result<()> {
    let engine = context.engine()?;

    if dry_run {
        let resolution = engine.preview(&context.identity, request)?;
        match format {
            "json" => println!("{}", serde_json::to_string_pretty(&resolution)?),
            _ => {
                println!("[DRY RUN] {} -> {}", resolution.from_phase, resolution.next_phase);
                println!("\n{}", resolution.instructions);
            }
        }
        return Ok(());
    }

    let step = match engine.resolve_next(&context.identity, request) {
        Ok(step) => step,
        Err(EngineError::Resolution(err)) => {
            anyhow::bail!("{err}\nThe conversation stays in its current phase.")
        }
        Err(err) => return Err(err.into()),
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&step)?),
        _ => {
            if step.changed() {
                println!("Phase: {} -> {}", step.previous_phase, step.phase);
            } else {
                println!("Phase: {}", step.phase);
            }
            if let Some(reason) = &step.transition_reason {
                println!("Reason: {reason}");
            }
            if let Some(plan) = &step.plan_file_path {
                println!("Plan file: {}", plan.display());
            }
            println!("\n{}", step.instructions);
        }
    }
    Ok(())
}

/// Show the current phase.
fn cmd_status(context: &CliContext, format: &str) -> Result<()> {
    let engine = context.engine()?;
    let status = engine.status(&context.identity)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&status)?),
        _ => {
            let state = &status.state;
            println!("Conversation: {}", state.conversation_id);
            println!("Workflow:     {}", state.workflow_name);
            println!("Phase:        {}", state.current_phase);
            if let Some(description) = &status.phase_description {
                println!("              {description}");
            }
            println!("Updated:      {}", state.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));

            if !status.transitions.is_empty() {
                println!("\nTransitions:");
                for transition in &status.transitions {
                    println!("  {} -> {}", transition.trigger, transition.target);
                }
            }
            println!("\nPhases: {}", status.phases.join(", "));
            println!("\n{}", status.instructions);
        }
    }
    Ok(())
}

/// Reset a conversation.
fn cmd_reset(context: &CliContext, workflow: Option<&str>, yes: bool) -> Result<()> {
    if !yes {
        anyhow::bail!(
            "Resetting discards the progress of {}. Re-run with --yes to confirm.",
            context.identity.conversation_id
        );
    }

    let engine = context.engine()?;
    let state = engine.reset(&context.identity, workflow)?;
    println!("Reset {} to {} ({})", state.conversation_id, state.current_phase, state.workflow_name);
    Ok(())
}

/// Validate workflow documents and report every problem found.
fn cmd_validate(context: &CliContext, file: Option<&Path>) -> Result<()> {
    let engine = context.engine()?;
    let loader = WorkflowLoader::new()
        .with_required_states(engine.config().workflows.required_states.clone());

    let mut results = Vec::new();
    match file {
        Some(path) => results.push((path.display().to_string(), loader.load_file(path).map(|_| ()))),
        None => {
            for name in bundled_names() {
                results.push((name.clone(), loader.load_bundled(&name).map(|_| ())));
            }
            if let Some(source) = read_override(&context.project)? {
                let label = source.path.display().to_string();
                let result = loader
                    .parse_str(&source.content, GraphSource::Custom(source.path))
                    .map(|_| ());
                results.push((label, result));
            }
        }
    }

    let mut failed = 0;
    for (label, result) in &results {
        match result {
            Ok(()) => println!("✓ {label}"),
            Err(err) => {
                failed += 1;
                println!("✗ {label}");
                print_definition_error(err);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} workflow documents are invalid", results.len());
    }
    println!("\nAll {} workflow documents are valid", results.len());
    Ok(())
}

fn print_definition_error(err: &DefinitionError) {
    let issues = err.issues();
    if issues.is_empty() {
        println!("    {err}");
    } else {
        for issue in issues {
            println!("    {issue}");
        }
    }
}

/// Generate shell completions.
fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "vibeflow", &mut io::stdout());
}
