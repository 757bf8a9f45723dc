mod resource_file;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;

use meridian_core::differ::{Diff, diff};
use meridian_core::provider::Provider;
use meridian_core::resource::{Resource, ResourceId, State, Value};
use meridian_core::schema::ResourceSchema;
use meridian_provider_aviatrix::provider as aviatrix;
use meridian_provider_aviatrix::{AviatrixProvider, ProviderConfig};

#[derive(Parser)]
#[command(name = "meridian")]
#[command(about = "Declarative management of transit network connections", long_about = None)]
struct Cli {
    #[command(flatten)]
    controller: ControllerArgs,

    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ControllerArgs {
    /// Controller host name or IP address
    #[arg(long, env = "AVIATRIX_CONTROLLER_IP", global = true)]
    controller_ip: Option<String>,

    /// Controller user name
    #[arg(long, env = "AVIATRIX_USERNAME", global = true)]
    username: Option<String>,

    /// Controller password
    #[arg(long, env = "AVIATRIX_PASSWORD", global = true, hide_env_values = true)]
    password: Option<String>,

    /// Skip verification of the controller's TLS certificate
    #[arg(long, env = "MERIDIAN_INSECURE_TLS", global = true)]
    insecure: bool,
}

impl ControllerArgs {
    fn to_config(&self) -> ProviderConfig {
        ProviderConfig::new(
            self.controller_ip.clone().unwrap_or_default(),
            self.username.clone().unwrap_or_default(),
            self.password.clone().unwrap_or_default(),
        )
        .with_verify_tls(!self.insecure)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the resource file without contacting the controller
    Validate {
        /// Path to resource file
        #[arg(default_value = "main.json")]
        file: PathBuf,
    },
    /// Show execution plan without applying changes
    Plan {
        /// Path to resource file
        #[arg(default_value = "main.json")]
        file: PathBuf,
    },
    /// Apply changes to reach the desired state
    Apply {
        /// Path to resource file
        #[arg(default_value = "main.json")]
        file: PathBuf,
    },
    /// Destroy all resources defined in the resource file
    Destroy {
        /// Path to resource file
        #[arg(default_value = "main.json")]
        file: PathBuf,

        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
    /// Read an existing remote object and print it as a resource block
    Import {
        /// Resource type (e.g., vgw_conn)
        resource_type: String,
        /// Name to give the resource in the resource file
        name: String,
        /// Remote identifier (e.g., conn1~vpc-123)
        identifier: String,
    },
    /// Generate shell completions
    Completions {
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Validate { file } => run_validate(&file),
        Commands::Plan { file } => run_plan(&file, &cli.controller).await,
        Commands::Apply { file } => run_apply(&file, &cli.controller).await,
        Commands::Destroy { file, auto_approve } => {
            run_destroy(&file, auto_approve, &cli.controller).await
        }
        Commands::Import {
            resource_type,
            name,
            identifier,
        } => run_import(&resource_type, &name, &identifier, &cli.controller).await,
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "meridian", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

async fn connect(args: &ControllerArgs) -> Result<AviatrixProvider, String> {
    let config = args.to_config();
    let provider = AviatrixProvider::connect(&config)
        .await
        .map_err(|e| e.to_string())?;
    println!(
        "{}",
        format!("Using controller {}", config.controller_ip).cyan()
    );
    Ok(provider)
}

fn load_and_validate(file: &Path) -> Result<Vec<Resource>, String> {
    let resources = resource_file::load(file)?;
    validate_resources(&resources)?;
    Ok(resources)
}

fn validate_resources(resources: &[Resource]) -> Result<(), String> {
    let errors: Vec<String> = resources
        .iter()
        .filter_map(|resource| aviatrix::validate(resource).err())
        .map(|e| e.to_string())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("\n"))
    }
}

fn get_schemas(provider: &dyn Provider) -> HashMap<String, ResourceSchema> {
    provider
        .resource_types()
        .iter()
        .map(|t| (t.name().to_string(), t.schema()))
        .collect()
}

fn run_validate(file: &Path) -> Result<(), String> {
    let resources = resource_file::load(file)?;

    println!("{}", "Validating...".cyan());

    validate_resources(&resources)?;

    println!(
        "{}",
        format!("✓ {} resources validated successfully.", resources.len())
            .green()
            .bold()
    );

    for resource in &resources {
        println!("  • {}", resource.id);
    }

    Ok(())
}

// =============================================================================
// Plan
// =============================================================================

/// A desired resource together with what it takes to reach it
struct PlannedChange {
    identifier: String,
    diff: Diff,
}

impl PlannedChange {
    fn id(&self) -> &ResourceId {
        match &self.diff {
            Diff::Create(r) => &r.id,
            Diff::Update { id, .. } | Diff::Replace { id, .. } | Diff::NoChange(id) => id,
        }
    }
}

async fn create_plan(
    provider: &dyn Provider,
    resources: &[Resource],
) -> Result<Vec<PlannedChange>, String> {
    let schemas = get_schemas(provider);
    let mut plan = Vec::with_capacity(resources.len());

    for resource in resources {
        let schema = schemas
            .get(&resource.id.resource_type)
            .ok_or_else(|| format!("Unknown resource type: {}", resource.id.resource_type))?;
        let identifier = provider
            .identifier_for(resource)
            .map_err(|e| e.to_string())?;
        let current = provider
            .read(&resource.id, &identifier)
            .await
            .map_err(|e| e.to_string())?;

        let mut desired = resource.clone();
        schema.apply_defaults(&mut desired.attributes);
        log::debug!("{} is tracked as {}", resource.id, identifier);

        plan.push(PlannedChange {
            identifier,
            diff: diff(&desired, &current, schema),
        });
    }

    Ok(plan)
}

fn print_plan(plan: &[PlannedChange], schemas: &HashMap<String, ResourceSchema>) {
    if !plan.iter().any(|c| c.diff.is_change()) {
        println!("{}", "No changes. Infrastructure is up-to-date.".green());
        return;
    }

    println!("{}", "Execution Plan:".cyan().bold());
    println!();

    let (mut create, mut update, mut replace) = (0, 0, 0);
    for change in plan {
        match &change.diff {
            Diff::Create(r) => {
                create += 1;
                println!("  {} {}", "+".green().bold(), r.id.to_string().cyan().bold());
                let mut keys: Vec<_> = r.attributes.keys().collect();
                keys.sort();
                for key in keys {
                    println!(
                        "      {}: {}",
                        key,
                        format_value(&r.attributes[key]).green()
                    );
                }
            }
            Diff::Update {
                id,
                from,
                to,
                changed_attributes,
            } => {
                update += 1;
                println!("  {} {}", "~".yellow().bold(), id.to_string().cyan().bold());
                print_changed(from, to, changed_attributes, None);
            }
            Diff::Replace {
                id,
                from,
                to,
                changed_attributes,
            } => {
                replace += 1;
                println!(
                    "  {} {} {}",
                    "-/+".red().bold(),
                    id.to_string().cyan().bold(),
                    format!("({})", change.identifier).dimmed()
                );
                print_changed(from, to, changed_attributes, schemas.get(&id.resource_type));
            }
            Diff::NoChange(_) => {}
        }
    }

    println!();
    println!(
        "Plan: {} to create, {} to update, {} to replace.",
        create.to_string().green(),
        update.to_string().yellow(),
        replace.to_string().red()
    );
}

fn print_changed(
    from: &State,
    to: &Resource,
    changed_attributes: &[String],
    schema: Option<&ResourceSchema>,
) {
    for key in changed_attributes {
        let old = from
            .attributes
            .get(key)
            .map(format_value)
            .unwrap_or_else(|| "(none)".to_string());
        let new = to
            .attributes
            .get(key)
            .map(format_value)
            .unwrap_or_else(|| "(none)".to_string());
        let forces = schema
            .and_then(|s| s.attributes.get(key))
            .is_some_and(|a| a.force_new);
        println!(
            "      {}: {} → {}{}",
            key,
            old.red(),
            new.green(),
            if forces {
                " (forces replacement)".red().to_string()
            } else {
                String::new()
            }
        );
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s),
        Value::Int(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::List(items) => {
            let strs: Vec<_> = items.iter().map(format_value).collect();
            format!("[{}]", strs.join(", "))
        }
        Value::Map(map) => {
            let mut strs: Vec<_> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", k, format_value(v)))
                .collect();
            strs.sort();
            format!("{{{}}}", strs.join(", "))
        }
    }
}

async fn run_plan(file: &Path, args: &ControllerArgs) -> Result<(), String> {
    let resources = load_and_validate(file)?;
    let provider = connect(args).await?;
    let plan = create_plan(&provider, &resources).await?;
    print_plan(&plan, &get_schemas(&provider));
    Ok(())
}

// =============================================================================
// Apply
// =============================================================================

#[derive(Debug, Default, PartialEq, Eq)]
struct ApplySummary {
    succeeded: usize,
    failed: usize,
}

fn report_failure(id: &ResourceId, action: &str, error: &meridian_core::provider::ProviderError) {
    println!("  {} {} {} - {}", "✗".red(), action, id, error);
    if let Some(identifier) = error.partial_identifier() {
        println!(
            "    {}",
            format!(
                "{} exists remotely as {} but is not fully configured; apply again or import it",
                id, identifier
            )
            .yellow()
        );
    }
}

async fn apply_plan(provider: &dyn Provider, plan: &[PlannedChange]) -> ApplySummary {
    let mut summary = ApplySummary::default();

    for change in plan {
        let id = change.id();
        let result = match &change.diff {
            Diff::Create(resource) => provider.create(resource).await.map(|state| {
                log::info!("created {} as {:?}", id, state.identifier);
                ("create", state)
            }),
            Diff::Update { from, to, .. } => provider
                .update(id, &change.identifier, from, to)
                .await
                .map(|state| ("update", state)),
            Diff::Replace { from, to, .. } => {
                let old_identifier = from.identifier.as_deref().unwrap_or(&change.identifier);
                match provider.delete(id, old_identifier).await {
                    Ok(()) => provider.create(to).await.map(|state| ("replace", state)),
                    Err(e) => Err(e),
                }
            }
            Diff::NoChange(_) => continue,
        };

        match result {
            Ok((action, _)) => {
                println!("  {} {} {}", "✓".green(), action, id);
                summary.succeeded += 1;
            }
            Err(e) => {
                let action = match &change.diff {
                    Diff::Create(_) => "create",
                    Diff::Update { .. } => "update",
                    _ => "replace",
                };
                report_failure(id, action, &e);
                summary.failed += 1;
            }
        }
    }

    summary
}

async fn run_apply(file: &Path, args: &ControllerArgs) -> Result<(), String> {
    let resources = load_and_validate(file)?;
    let provider = connect(args).await?;
    let plan = create_plan(&provider, &resources).await?;

    if !plan.iter().any(|c| c.diff.is_change()) {
        println!("{}", "No changes needed.".green());
        return Ok(());
    }

    print_plan(&plan, &get_schemas(&provider));
    println!();
    println!("{}", "Applying changes...".cyan().bold());
    println!();

    let summary = apply_plan(&provider, &plan).await;

    println!();
    if summary.failed == 0 {
        println!(
            "{}",
            format!("Apply complete! {} changes applied.", summary.succeeded)
                .green()
                .bold()
        );
        Ok(())
    } else {
        Err(format!(
            "Apply failed. {} succeeded, {} failed.",
            summary.succeeded, summary.failed
        ))
    }
}

// =============================================================================
// Destroy
// =============================================================================

/// Resources that exist remotely, in reverse declaration order
async fn find_existing(
    provider: &dyn Provider,
    resources: &[Resource],
) -> Result<Vec<(ResourceId, String)>, String> {
    let mut existing = Vec::new();
    for resource in resources.iter().rev() {
        let identifier = provider
            .identifier_for(resource)
            .map_err(|e| e.to_string())?;
        let state = provider
            .read(&resource.id, &identifier)
            .await
            .map_err(|e| e.to_string())?;
        if state.exists {
            existing.push((resource.id.clone(), identifier));
        }
    }
    Ok(existing)
}

async fn destroy_all(provider: &dyn Provider, targets: &[(ResourceId, String)]) -> ApplySummary {
    let mut summary = ApplySummary::default();
    for (id, identifier) in targets {
        match provider.delete(id, identifier).await {
            Ok(()) => {
                println!("  {} destroy {}", "✓".green(), id);
                summary.succeeded += 1;
            }
            Err(e) => {
                report_failure(id, "destroy", &e);
                summary.failed += 1;
            }
        }
    }
    summary
}

async fn run_destroy(file: &Path, auto_approve: bool, args: &ControllerArgs) -> Result<(), String> {
    let resources = resource_file::load(file)?;
    if resources.is_empty() {
        println!("{}", "No resources defined in configuration.".yellow());
        return Ok(());
    }

    let provider = connect(args).await?;
    let targets = find_existing(&provider, &resources).await?;
    if targets.is_empty() {
        println!("{}", "No resources to destroy.".green());
        return Ok(());
    }

    println!("{}", "Destroy Plan:".red().bold());
    println!();
    for (id, identifier) in &targets {
        println!("  {} {} {}", "-".red().bold(), id, format!("({})", identifier).dimmed());
    }
    println!();
    println!("Plan: {} to destroy.", targets.len().to_string().red());
    println!();

    if !auto_approve {
        println!(
            "{}",
            "Do you really want to destroy all resources?"
                .yellow()
                .bold()
        );
        println!(
            "  {}",
            "This action cannot be undone. Type 'yes' to confirm.".yellow()
        );
        print!("\n  Enter a value: ");
        std::io::Write::flush(&mut std::io::stdout()).map_err(|e| e.to_string())?;

        let mut input = String::new();
        std::io::stdin()
            .read_line(&mut input)
            .map_err(|e| e.to_string())?;

        if input.trim() != "yes" {
            println!();
            println!("{}", "Destroy cancelled.".yellow());
            return Ok(());
        }
        println!();
    }

    println!("{}", "Destroying resources...".red().bold());
    println!();

    let summary = destroy_all(&provider, &targets).await;

    println!();
    if summary.failed == 0 {
        println!(
            "{}",
            format!("Destroy complete! {} resources destroyed.", summary.succeeded)
                .green()
                .bold()
        );
        Ok(())
    } else {
        Err(format!(
            "Destroy failed. {} succeeded, {} failed.",
            summary.succeeded, summary.failed
        ))
    }
}

// =============================================================================
// Import
// =============================================================================

async fn import_block(
    provider: &dyn Provider,
    id: &ResourceId,
    identifier: &str,
) -> Result<String, String> {
    let state = provider
        .import(id, identifier)
        .await
        .map_err(|e| e.to_string())?;
    Ok(resource_file::to_block_json(id, &state.attributes))
}

async fn run_import(
    resource_type: &str,
    name: &str,
    identifier: &str,
    args: &ControllerArgs,
) -> Result<(), String> {
    let provider = connect(args).await?;
    let id = ResourceId::new(resource_type, name);
    let block = import_block(&provider, &id, identifier).await?;
    println!("{}", block);
    Ok(())
}
