mod workspace;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio_util::sync::CancellationToken;

use reef_core::differ::{DiffAction, ResourceDiff};
use reef_core::interpreter::Lifecycle;
use reef_core::provider::{Diagnostic, Provider, ProviderError};
use reef_core::resource::{Attributes, Value, attributes_from_json, attributes_to_json};
use reef_core::schema::ResourceSchema;
use reef_provider_digitalocean::DigitalOceanProvider;
use reef_provider_digitalocean::config::CombinedConfig;

use crate::workspace::{Workspace, load_state, save_state};

#[derive(Parser)]
#[command(name = "reef")]
#[command(about = "Manage DigitalOcean resources one instance at a time", long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, short, global = true, default_value = "reef.json")]
    config: PathBuf,

    /// Path to the state file
    #[arg(long, short, global = true, default_value = "reef.state.json")]
    state: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the schema catalogue as JSON
    Schema {
        /// Only print the schema of this resource kind or data source
        kind: Option<String>,
    },
    /// Show the planned change without applying it
    Plan,
    /// Apply the planned change and record the new state
    Apply {
        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
    /// Re-read the stored instance and record drift
    Refresh,
    /// Adopt an existing remote object into the state file
    Import {
        /// Resource kind, e.g. `record`
        kind: String,
        /// Import id, e.g. `example.com,12345678`
        id: String,
    },
    /// Delete the stored instance
    Destroy {
        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
    /// Evaluate a data source
    Query {
        /// Data source name, e.g. `droplets`
        kind: String,
        /// Query attributes as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Interrupted, cancelling...".yellow());
            on_interrupt.cancel();
        }
    });

    let result = match cli.command {
        Commands::Schema { kind } => run_schema(kind.as_deref()),
        Commands::Plan => run_plan(&cli.config, &cli.state, cancel).await,
        Commands::Apply { auto_approve } => run_apply(&cli.config, &cli.state, auto_approve, cancel).await,
        Commands::Refresh => run_refresh(&cli.config, &cli.state, cancel).await,
        Commands::Import { kind, id } => run_import(&cli.config, &cli.state, &kind, &id, cancel).await,
        Commands::Destroy { auto_approve } => run_destroy(&cli.config, &cli.state, auto_approve, cancel).await,
        Commands::Query { kind, args } => run_query(&cli.config, &kind, &args, cancel).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Render a provider error the way the host would show its diagnostic
fn diagnostic(err: &ProviderError) -> String {
    let diag = Diagnostic::from(err);
    let mut out = diag.summary;
    if let Some(attribute) = diag.attribute {
        out.push_str(&format!(" (attribute: {attribute})"));
    }
    if let Some(detail) = diag.detail {
        out.push_str(&format!("\n  caused by: {detail}"));
    }
    out
}

async fn configure(config: &Path, cancel: CancellationToken) -> Result<(Workspace, Lifecycle<CombinedConfig>), String> {
    let workspace = Workspace::load(config)?;
    let lifecycle = Lifecycle::configure(&DigitalOceanProvider, &workspace.provider)
        .await
        .map_err(|e| diagnostic(&e))?
        .with_cancellation(cancel);
    Ok((workspace, lifecycle))
}

fn run_schema(kind: Option<&str>) -> Result<(), String> {
    let provider = DigitalOceanProvider;
    let json = match kind {
        None => serde_json::json!({
            "provider": provider.schema().to_json(),
            "resources": provider
                .resource_types()
                .iter()
                .map(|r| (r.name().to_string(), r.schema().to_json()))
                .collect::<serde_json::Map<_, _>>(),
            "data_sources": provider
                .data_sources()
                .iter()
                .map(|d| (d.name().to_string(), d.schema().to_json()))
                .collect::<serde_json::Map<_, _>>(),
        }),
        Some(kind) => provider
            .resource_types()
            .iter()
            .find(|r| r.name() == kind)
            .map(|r| r.schema().to_json())
            .or_else(|| {
                provider
                    .data_sources()
                    .iter()
                    .find(|d| d.name() == kind)
                    .map(|d| d.schema().to_json())
            })
            .ok_or_else(|| format!("unknown resource kind or data source '{kind}'"))?,
    };
    println!("{}", serde_json::to_string_pretty(&json).map_err(|e| e.to_string())?);
    Ok(())
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{s}\""),
        other => other.to_json().to_string(),
    }
}

fn print_plan(diff: &ResourceDiff, schema: &ResourceSchema, id: Option<&str>) {
    let label = match id {
        Some(id) => format!("{} ({})", diff.kind, id),
        None => diff.kind.clone(),
    };
    let symbol = match diff.action {
        DiffAction::NoChange => {
            println!("{}", "No changes. Infrastructure is up-to-date.".green());
            return;
        }
        DiffAction::Create => "+".green().bold(),
        DiffAction::Update => "~".yellow().bold(),
        DiffAction::Replace => "-/+".magenta().bold(),
        DiffAction::Delete => "-".red().bold(),
    };

    println!("{}", "Execution Plan:".cyan().bold());
    println!();
    println!("  {} {}", symbol, label.bold());

    let old = diff.prior.as_ref().map(|p| schema.redact(p)).unwrap_or_default();
    let new = schema.redact(&diff.planned);
    let mut changes: Vec<_> = diff.changes.iter().collect();
    changes.sort_by(|a, b| a.name.cmp(&b.name));
    for change in changes {
        let before = old.get(&change.name).map(format_value);
        let after = if change.computed {
            Some("(known after apply)".to_string())
        } else {
            new.get(&change.name).map(format_value)
        };
        let line = match (before, after) {
            (None, Some(after)) => format!("{}: {}", change.name, after.green()),
            (Some(before), None) => format!("{}: {}", change.name, before.red()),
            (Some(before), Some(after)) => format!("{}: {} => {}", change.name, before.red(), after.green()),
            (None, None) => change.name.clone(),
        };
        if change.requires_replace {
            println!("      {} {}", line, "(forces replacement)".magenta());
        } else {
            println!("      {line}");
        }
    }
    println!();
}

fn confirm(question: &str) -> Result<bool, String> {
    println!("{}", question.yellow().bold());
    println!("  {}", "Only 'yes' will be accepted to approve.".yellow());
    print!("\n  Enter a value: ");
    std::io::Write::flush(&mut std::io::stdout()).map_err(|e| e.to_string())?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input).map_err(|e| e.to_string())?;
    println!();
    Ok(input.trim() == "yes")
}

async fn run_plan(config: &Path, state: &Path, cancel: CancellationToken) -> Result<(), String> {
    let (workspace, lifecycle) = configure(config, cancel).await?;
    let desired = workspace.require_resource()?;
    let current = load_state(state)?;
    let diff = lifecycle
        .plan(Some(desired), current.as_ref())
        .map_err(|e| diagnostic(&e))?;
    let schema = lifecycle.resource_schema(&diff.kind).map_err(|e| diagnostic(&e))?;
    print_plan(&diff, &schema, current.as_ref().map(|s| s.id.as_str()));
    Ok(())
}

async fn run_apply(config: &Path, state: &Path, auto_approve: bool, cancel: CancellationToken) -> Result<(), String> {
    let (workspace, lifecycle) = configure(config, cancel).await?;
    let desired = workspace.require_resource()?;
    let current = load_state(state)?;
    let diff = lifecycle
        .plan(Some(desired), current.as_ref())
        .map_err(|e| diagnostic(&e))?;
    let schema = lifecycle.resource_schema(&diff.kind).map_err(|e| diagnostic(&e))?;
    print_plan(&diff, &schema, current.as_ref().map(|s| s.id.as_str()));
    if !diff.is_change() {
        return Ok(());
    }
    if !auto_approve && !confirm("Do you want to perform this action?")? {
        println!("{}", "Apply cancelled.".yellow());
        return Ok(());
    }

    println!("{}", "Applying changes...".cyan().bold());
    match lifecycle.apply(&diff, current.as_ref()).await {
        Ok(new_state) => {
            save_state(state, new_state.as_ref())?;
            match new_state {
                Some(s) => println!("  {} {} ({})", "✓".green(), s.kind, s.id),
                None => println!("  {} {} removed", "✓".green(), diff.kind),
            }
            println!();
            println!("{}", "Apply complete!".green().bold());
            Ok(())
        }
        Err(failure) => {
            if let Some(partial) = &failure.partial {
                save_state(state, Some(partial))?;
                println!(
                    "  {} {} ({}) recorded in {} despite the failure",
                    "!".yellow().bold(),
                    partial.kind,
                    partial.id,
                    state.display()
                );
            }
            Err(diagnostic(&failure.error))
        }
    }
}

async fn run_refresh(config: &Path, state: &Path, cancel: CancellationToken) -> Result<(), String> {
    let (_, lifecycle) = configure(config, cancel).await?;
    let Some(current) = load_state(state)? else {
        println!("{}", "No resource in state.".yellow());
        return Ok(());
    };
    let refreshed = lifecycle.refresh(&current).await.map_err(|e| diagnostic(&e))?;
    save_state(state, refreshed.as_ref())?;
    match refreshed {
        Some(s) if s == current => println!("{}", "State is up-to-date.".green()),
        Some(s) => println!("{} {} ({})", "Refreshed".green(), s.kind, s.id),
        None => println!(
            "{} {} no longer exists and was removed from state",
            "Drift:".yellow().bold(),
            current.resource_id()
        ),
    }
    Ok(())
}

async fn run_import(config: &Path, state: &Path, kind: &str, id: &str, cancel: CancellationToken) -> Result<(), String> {
    let (_, lifecycle) = configure(config, cancel).await?;
    if let Some(existing) = load_state(state)? {
        return Err(format!(
            "{} already holds {}; destroy or remove it before importing",
            state.display(),
            existing.resource_id()
        ));
    }
    let imported = lifecycle.import(kind, id).await.map_err(|e| diagnostic(&e))?;
    save_state(state, Some(&imported))?;
    println!("{} {} ({})", "Imported".green().bold(), imported.kind, imported.id);
    Ok(())
}

async fn run_destroy(config: &Path, state: &Path, auto_approve: bool, cancel: CancellationToken) -> Result<(), String> {
    let (workspace, lifecycle) = configure(config, cancel).await?;
    let Some(mut current) = load_state(state)? else {
        println!("{}", "No resources to destroy.".green());
        return Ok(());
    };
    if let Some(resource) = workspace.resource.as_ref().filter(|r| r.kind == current.kind) {
        current.timeouts = resource.timeouts.clone();
    }

    println!("  {} {}", "-".red().bold(), current.resource_id());
    println!();
    if !auto_approve && !confirm("Do you really want to destroy this resource?")? {
        println!("{}", "Destroy cancelled.".yellow());
        return Ok(());
    }

    lifecycle.destroy(&current).await.map_err(|e| diagnostic(&e))?;
    save_state(state, None)?;
    println!("{}", "Destroy complete!".green().bold());
    Ok(())
}

async fn run_query(config: &Path, kind: &str, args: &str, cancel: CancellationToken) -> Result<(), String> {
    let (_, lifecycle) = configure(config, cancel).await?;
    let json: serde_json::Value = serde_json::from_str(args).map_err(|e| format!("invalid --args JSON: {e}"))?;
    let query: Attributes = attributes_from_json(&json);
    let result = lifecycle
        .read_data_source(kind, &query)
        .await
        .map_err(|e| diagnostic(&e))?;
    let schema = lifecycle.data_source_schema(kind).map_err(|e| diagnostic(&e))?;
    let output = attributes_to_json(&schema.redact(&result.attributes));
    println!("{}", serde_json::to_string_pretty(&output).map_err(|e| e.to_string())?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_includes_attribute() {
        let err = ProviderError::validation("name must not be empty").with_attribute("name");
        let rendered = diagnostic(&err);
        assert!(rendered.contains("name must not be empty"));
        assert!(rendered.ends_with("(attribute: name)"));
    }

    #[test]
    fn strings_are_quoted_in_plans() {
        assert_eq!(format_value(&Value::from("nyc3")), "\"nyc3\"");
        assert_eq!(format_value(&Value::from(3i64)), "3");
    }

    #[test]
    fn cli_parses_global_paths() {
        let cli = Cli::try_parse_from(["reef", "--state", "x.json", "import", "record", "example.com,1"]).unwrap();
        assert_eq!(cli.state, PathBuf::from("x.json"));
        assert!(matches!(cli.command, Commands::Import { ref kind, .. } if kind == "record"));
    }
}
