use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use log::{error, info};
use serde::Serialize;

use scriptsmith::config::LogConfig;
use scriptsmith::db::{user_repo, Database};
use scriptsmith::requirement::{predefined, PREDEFINED};
use scriptsmith::{
    load_config, register_user, telemetry, Browser, Config, Orchestrator, ProjectSource, Records,
    Role, ScriptsmithError, TaskHandle, User, ValidationError,
};

#[derive(Parser, Debug)]
#[command(name = "scriptsmith")]
#[command(about = "Generate, run and debug browser test scripts from plain-language requirements")]
struct Cli {
    /// Path to a JSON config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Acting username
    #[arg(short, long, global = true, env = "SCRIPTSMITH_USER")]
    user: Option<String>,

    /// Password for the acting user. Without it the user is looked up by name only.
    #[arg(long, global = true, env = "SCRIPTSMITH_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate and run a test script for a requirement
    Generate {
        requirement: Option<String>,
        /// Use a predefined requirement instead (see `predefined`)
        #[arg(long, conflicts_with = "requirement")]
        predefined: Option<String>,
        #[arg(short, long, value_parser = parse_browser)]
        browser: Option<Browser>,
    },
    /// Queue feature code generation for a zipped project and run it
    Codegen {
        archive: PathBuf,
        requirement: String,
        #[arg(short, long, value_parser = parse_browser)]
        browser: Option<Browser>,
        /// Polling interval in milliseconds
        #[arg(long, default_value_t = 500)]
        interval_ms: u64,
        /// Print only the task id and final status, without progress lines.
        /// The command still exits once this process has finished the job;
        /// use `poll` from another shell to watch it.
        #[arg(long)]
        no_progress: bool,
    },
    /// Show the status of a queued task
    Poll { task_id: String },
    /// Search generation history
    History {
        #[arg(default_value = "")]
        query: String,
    },
    /// Write the script of a history record to a file
    Download {
        id: i64,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run a stored requirement again
    Rerun { id: i64 },
    /// List predefined requirements
    Predefined,
    /// Manage users
    User {
        #[command(subcommand)]
        action: UserAction,
    },
}

#[derive(Subcommand, Debug)]
enum UserAction {
    /// Create a user. The first user may be created without an acting admin.
    Add {
        username: String,
        #[arg(long, value_parser = parse_role)]
        role: Role,
        #[arg(long, env = "SCRIPTSMITH_NEW_PASSWORD", hide_env_values = true)]
        new_password: String,
    },
    /// Delete a user and their history
    Delete { id: i64 },
    List,
}

fn parse_browser(value: &str) -> Result<Browser, String> {
    Browser::parse(value).map_err(|e| e.to_string())
}

fn parse_role(value: &str) -> Result<Role, String> {
    Role::parse(value).map_err(|e| e.to_string())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                telemetry::init_tracing(&LogConfig::default());
                error!("Failed to load config: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => Config::default(),
    };

    telemetry::init_tracing(&config.log);

    match run(cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, config: &Config) -> scriptsmith::Result<()> {
    if let Command::Predefined = cli.command {
        for entry in PREDEFINED {
            println!("{:<16} {}", entry.key, entry.requirement);
        }
        return Ok(());
    }

    if let Command::User {
        action: UserAction::Add { username, role, new_password },
    } = &cli.command
    {
        if let Some(user) = bootstrap_first_user(config, username, new_password, *role)? {
            print_json(&user)?;
            return Ok(());
        }
    }

    if needs_workers(&cli.command) {
        let orchestrator = Orchestrator::open(config)?;
        let result = dispatch_generation(&orchestrator, cli, config);
        orchestrator.shutdown();
        result
    } else {
        dispatch_records(&Records::open(config)?, cli)
    }
}

/// Only generation commands start the worker pool and take over queued work.
fn needs_workers(command: &Command) -> bool {
    matches!(
        command,
        Command::Generate { .. } | Command::Codegen { .. } | Command::Rerun { .. }
    )
}

/// Creates the very first account without an acting user.
fn bootstrap_first_user(
    config: &Config,
    username: &str,
    password: &str,
    role: Role,
) -> scriptsmith::Result<Option<User>> {
    let path = config
        .resolved_database_path()
        .ok_or_else(|| ScriptsmithError::NotFound("database path".to_string()))?;
    let db = Database::open(&path)?;
    if !user_repo::list(&db)?.is_empty() {
        return Ok(None);
    }
    info!("No users yet, creating '{}' without an acting admin", username);
    register_user(&db, username, password, role).map(Some)
}

fn acting_user(records: &Records, cli: &Cli) -> scriptsmith::Result<User> {
    let username = cli
        .user
        .as_deref()
        .ok_or_else(|| ScriptsmithError::AccessDenied("--user is required".to_string()))?;
    match cli.password.as_deref() {
        Some(password) => records.authenticate(username, password),
        None => records.find_user(username),
    }
}

fn dispatch_generation(
    orchestrator: &Orchestrator,
    cli: Cli,
    config: &Config,
) -> scriptsmith::Result<()> {
    let user = acting_user(orchestrator.records(), &cli)?;

    match cli.command {
        Command::Generate {
            requirement,
            predefined: key,
            browser,
        } => {
            let requirement = match (requirement, key) {
                (_, Some(key)) => predefined(&key)?.to_string(),
                (Some(requirement), None) => requirement,
                (None, None) => return Err(ValidationError::EmptyRequirement.into()),
            };
            let browser = browser.unwrap_or(config.default_browser);
            let run = orchestrator.run_test_generation(&user, &requirement, browser)?;
            print_json(&run.history)?;
        }
        Command::Codegen {
            archive,
            requirement,
            browser,
            interval_ms,
            no_progress,
        } => {
            let bytes = std::fs::read(&archive).map_err(|e| {
                ScriptsmithError::NotFound(format!("archive '{}': {}", archive.display(), e))
            })?;
            let filename = archive
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let handle = orchestrator.enqueue_code_generation(
                &user,
                &requirement,
                browser.unwrap_or(config.default_browser),
                ProjectSource::Archive { filename, bytes },
            )?;
            println!("{}", handle);
            wait_for(
                orchestrator.records(),
                &handle,
                Duration::from_millis(interval_ms),
                !no_progress,
            )?;
        }
        Command::Rerun { id } => {
            let run = orchestrator.rerun(&user, id)?;
            print_json(&run.history)?;
        }
        _ => unreachable!("read-only commands are dispatched to dispatch_records"),
    }

    Ok(())
}

fn dispatch_records(records: &Records, cli: Cli) -> scriptsmith::Result<()> {
    let user = acting_user(records, &cli)?;

    match cli.command {
        Command::Poll { task_id } => {
            print_json(&records.poll(&TaskHandle::from(task_id))?)?;
        }
        Command::History { query } => {
            print_json(&records.search_history(&user, &query)?)?;
        }
        Command::Download { id, output } => {
            let attachment = records.download_script(&user, id)?;
            let path = output.unwrap_or_else(|| PathBuf::from(&attachment.filename));
            std::fs::write(&path, attachment.content).map_err(|e| {
                ScriptsmithError::NotFound(format!("cannot write '{}': {}", path.display(), e))
            })?;
            info!("Wrote {} ({})", path.display(), attachment.content_type);
        }
        Command::User { action } => match action {
            UserAction::Add {
                username,
                role,
                new_password,
            } => {
                let created = records.create_user(&user, &username, &new_password, role)?;
                print_json(&created)?;
            }
            UserAction::Delete { id } => records.delete_user(&user, id)?,
            UserAction::List => print_json(&records.list_users(&user)?)?,
        },
        Command::Predefined => {}
        Command::Generate { .. } | Command::Codegen { .. } | Command::Rerun { .. } => {
            unreachable!("generation commands are dispatched to dispatch_generation")
        }
    }

    Ok(())
}

fn wait_for(
    records: &Records,
    handle: &TaskHandle,
    interval: Duration,
    show_progress: bool,
) -> scriptsmith::Result<()> {
    let mut last_progress = None;
    loop {
        let status = records.poll(handle)?;
        if let Some(progress) = status.progress().filter(|_| show_progress) {
            if last_progress != Some(progress) {
                info!("[{}%] {}", progress, status.message().unwrap_or_default());
                last_progress = Some(progress);
            }
        }
        if status.is_settled() {
            return print_json(&status);
        }
        thread::sleep(interval);
    }
}

fn print_json<T: Serialize>(value: &T) -> scriptsmith::Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| ScriptsmithError::Task(scriptsmith::task::TaskError::Encode(e)))?;
    println!("{}", json);
    Ok(())
}
