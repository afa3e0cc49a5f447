use clap::{Args as ClapArgs, Parser, ValueEnum};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use admissions_lite::config::{
    AllocatorConfig, AppConfig, IntakeConfig, LeadBackend, RestConfig, StateBackend,
};
use admissions_lite::server::Server;
use admissions_lite::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "admissions-lite")]
#[command(version)]
#[command(about = "Admission-lead intake with per-program round-robin assignment")]
#[command(propagate_version = true)]
struct Args {
    #[command(flatten)]
    store: StoreArgs,

    /// Output format
    #[arg(long, short = 'o', global = true, default_value = "table")]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the HTTP API
    Serve(ServeArgs),

    /// Assign the next team member for a program
    Assign {
        /// Program name, e.g. "LLB (Hons)"
        program: String,
    },

    /// Reset every program's round-robin cursor to zero
    Reset,

    /// Show the round-robin cursor of every program
    State,

    /// Show the team roster and programs
    Roster,

    /// Show leads currently assigned per program and member
    Stats,
}

// =============================================================================
// Arguments
// =============================================================================

#[derive(ClapArgs, Debug)]
struct StoreArgs {
    /// Team members in round-robin order (comma-separated)
    #[arg(long, env = "ADMISSIONS_ROSTER", global = true)]
    roster: Option<String>,

    /// Programs accepting leads (comma-separated)
    #[arg(long, env = "ADMISSIONS_PROGRAMS", global = true)]
    programs: Option<String>,

    /// Disable the workload override and use pure round-robin
    #[arg(long, global = true)]
    round_robin_only: bool,

    /// Skip a member once their load exceeds the minimum by more than this
    #[arg(long, default_value = "2", global = true)]
    rebalance_threshold: u64,

    /// Timeout for the workload query in milliseconds
    #[arg(long, default_value = "3000", global = true)]
    workload_timeout_ms: u64,

    /// Timeout for storing a submitted lead in milliseconds
    #[arg(long, default_value = "8000", global = true)]
    submit_timeout_ms: u64,

    /// Timeout for the duplicate phone lookup in milliseconds
    #[arg(long, default_value = "5000", global = true)]
    duplicate_check_timeout_ms: u64,

    /// JSON file holding the round-robin cursors
    #[arg(long, env = "ADMISSIONS_STATE_FILE", global = true)]
    state_file: Option<PathBuf>,

    /// Base URL of the hosted backend (leads are kept in memory when unset)
    #[arg(long, env = "ADMISSIONS_STORE_URL", global = true)]
    store_url: Option<String>,

    /// API key for the hosted backend
    #[arg(long, env = "ADMISSIONS_STORE_KEY", global = true, hide_env_values = true)]
    store_key: Option<String>,

    /// Keep the cursors in the backend's assignment_state table
    #[arg(long, requires = "store_url", conflicts_with = "state_file", global = true)]
    state_in_store: bool,
}

#[derive(ClapArgs, Debug)]
struct ServeArgs {
    /// Address to bind the HTTP API to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port for the HTTP API
    #[arg(long, default_value = "8080")]
    port: u16,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

// =============================================================================
// JSON Output Types
// =============================================================================

#[derive(Serialize)]
struct AssignOutput {
    program: String,
    member: String,
    rebalanced: bool,
    persisted: bool,
}

#[derive(Serialize)]
struct RosterOutput {
    roster: Vec<String>,
    programs: Vec<String>,
}

// =============================================================================
// Helper Functions
// =============================================================================

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn build_config(store: StoreArgs, listen_addr: SocketAddr) -> AppConfig {
    let defaults = AllocatorConfig::default();
    let allocator = AllocatorConfig {
        roster: store.roster.as_deref().map(parse_list).unwrap_or(defaults.roster),
        programs: store
            .programs
            .as_deref()
            .map(parse_list)
            .unwrap_or(defaults.programs),
        ..defaults
    }
    .with_workload_aware(!store.round_robin_only)
    .with_rebalance_threshold(store.rebalance_threshold)
    .with_workload_timeout_ms(store.workload_timeout_ms);

    let rest = store
        .store_url
        .map(|url| RestConfig::new(url, store.store_key.unwrap_or_default()));

    let leads = match &rest {
        Some(rest) => LeadBackend::Rest(rest.clone()),
        None => LeadBackend::Memory,
    };
    let state = match (store.state_in_store, rest, store.state_file) {
        (true, Some(rest), _) => StateBackend::Rest(rest),
        (_, _, Some(path)) => StateBackend::File(path),
        _ => StateBackend::Memory,
    };

    AppConfig {
        intake: IntakeConfig::default()
            .with_submit_timeout_ms(store.submit_timeout_ms)
            .with_duplicate_check_timeout_ms(store.duplicate_check_timeout_ms),
        ..AppConfig::new(listen_addr)
    }
    .with_allocator(allocator)
    .with_leads(leads)
    .with_state(state)
}

fn ephemeral_state_warning(state: &StateBackend, serving: bool) -> Option<&'static str> {
    match state {
        StateBackend::Memory if serving => {
            Some("No state file or backend table configured, cursors reset on restart")
        }
        StateBackend::Memory => Some(
            "No state file or backend table configured, cursors start at zero and are not saved",
        ),
        _ => None,
    }
}

fn log_state_backend(state: &StateBackend, serving: bool) {
    if let Some(warning) = ephemeral_state_warning(state, serving) {
        tracing::warn!("{}", warning);
        return;
    }
    match state {
        StateBackend::File(path) => tracing::info!(path = %path.display(), "Using state file"),
        StateBackend::Rest(_) => tracing::info!("Using backend assignment_state table"),
        StateBackend::Memory => {}
    }
}

// =============================================================================
// Command Handlers
// =============================================================================

async fn run_server(store: StoreArgs, args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let listen_addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let config = build_config(store, listen_addr);

    log_state_backend(&config.state, true);

    let server = Server::build(config).await?;
    let shutdown = install_shutdown_handler();
    server.run(shutdown).await?;
    Ok(())
}

async fn handle_assign(
    server: &Server,
    program: String,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match server.allocator.allocate(&program).await {
        Ok(allocation) => {
            match output_format {
                OutputFormat::Json => {
                    let output = AssignOutput {
                        program: allocation.program,
                        member: allocation.member,
                        rebalanced: allocation.rebalanced,
                        persisted: allocation.persisted,
                    };
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Table => {
                    println!("Program:     {}", allocation.program);
                    println!("Assigned to: {}", allocation.member);
                    if allocation.rebalanced {
                        println!("(round-robin candidate skipped for workload)");
                    }
                    if !allocation.persisted {
                        eprintln!("Warning: cursor could not be saved");
                    }
                }
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn handle_state(
    server: &Server,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = server.allocator.state().await;
    match output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&state)?),
        OutputFormat::Table => {
            let roster = server.allocator.current_roster();
            println!("{:<28} {:<8} NEXT", "PROGRAM", "CURSOR");
            for (program, cursor) in state.iter() {
                let next = roster.get(cursor).map(String::as_str).unwrap_or("-");
                println!("{:<28} {:<8} {}", program, cursor, next);
            }
        }
    }
    Ok(())
}

fn handle_roster(server: &Server, output_format: &OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let output = RosterOutput {
        roster: server.allocator.current_roster().to_vec(),
        programs: server.allocator.current_programs().to_vec(),
    };
    match output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&output)?),
        OutputFormat::Table => {
            println!("Team (round-robin order):");
            for (i, member) in output.roster.iter().enumerate() {
                println!("  {}. {}", i + 1, member);
            }
            println!("Programs:");
            for program in &output.programs {
                println!("  - {}", program);
            }
        }
    }
    Ok(())
}

async fn handle_stats(
    server: &Server,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let stats = server.allocator.assignment_stats().await?;
    match output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
        OutputFormat::Table => {
            for program in server.allocator.current_programs() {
                println!("{}", program);
                for member in server.allocator.current_roster() {
                    println!("  {:<24} {}", member, stats.count(program, member));
                }
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let command = match args.command {
        Commands::Serve(serve_args) => return run_server(args.store, serve_args).await,
        other => other,
    };

    // One-shot commands never bind, so any address will do.
    let config = build_config(args.store, AppConfig::default().listen_addr);
    if matches!(command, Commands::Assign { .. } | Commands::Reset | Commands::State) {
        log_state_backend(&config.state, false);
    }
    let server = Server::build(config).await?;

    match command {
        Commands::Assign { program } => handle_assign(&server, program, &args.output).await?,
        Commands::Reset => {
            server.allocator.reset().await;
            println!("Assignment state reset.");
        }
        Commands::State => handle_state(&server, &args.output).await?,
        Commands::Roster => handle_roster(&server, &args.output)?,
        Commands::Stats => handle_stats(&server, &args.output).await?,
        Commands::Serve(_) => {}
    }

    Ok(())
}
