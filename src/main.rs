use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;

use docver::utils::read_dir_files;
use docver::{format_entry, DeployConfig, DeployError, Deployer, GixBackend, OperationOptions, Outcome, Result};

#[derive(Parser)]
#[command(name = "docver")]
#[command(version)]
#[command(about = "Publish versioned documentation to a git branch", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Remote to synchronize with
    #[arg(short, long, global = true)]
    remote: Option<String>,

    /// Branch holding the published documentation
    #[arg(short, long, global = true)]
    branch: Option<String>,

    /// Directory inside the branch to publish under
    #[arg(long, global = true)]
    deploy_prefix: Option<String>,

    /// Fail instead of warning when the branch has diverged from the remote
    #[arg(long, global = true)]
    strict: bool,

    /// Do not fetch or compare with the remote branch
    #[arg(long, global = true)]
    ignore_remote_status: bool,

    /// Keep alias directories as copies of their version
    #[arg(long, global = true)]
    alias_copies: bool,

    /// Commit message to use instead of the generated one
    #[arg(short, long, global = true)]
    message: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List published versions
    List {
        /// Show only the version this id or alias refers to
        identifier: Option<String>,

        /// Print JSON instead of text
        #[arg(short, long, default_value_t = false)]
        json: bool,
    },

    /// Publish a built documentation directory as a version
    Deploy {
        /// Version id
        version: String,

        /// Aliases to point at this version
        aliases: Vec<String>,

        /// Display title (defaults to the version id)
        #[arg(short, long)]
        title: Option<String>,

        /// Directory containing the built documentation
        #[arg(short, long, default_value = "site")]
        source: PathBuf,
    },

    /// Remove published versions
    Delete {
        /// Version ids or aliases
        #[arg(required = true)]
        identifiers: Vec<String>,
    },

    /// Point aliases at a published version
    Alias {
        /// Version id or alias
        identifier: String,

        /// Aliases to add
        #[arg(required = true)]
        aliases: Vec<String>,
    },

    /// Change the title of a version
    Retitle {
        /// Version id or alias
        identifier: String,

        /// New title
        title: String,
    },

    /// Give a version a new id
    Rename {
        /// Version id or alias
        identifier: String,

        /// New version id
        new_version: String,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Config file settings with command-line overrides applied
fn settings(cli: &Cli) -> Result<DeployConfig> {
    let mut config = DeployConfig::load(cli.config.as_deref())?;

    if let Some(remote) = &cli.remote {
        config.remote = remote.clone();
    }
    if let Some(branch) = &cli.branch {
        config.branch = branch.clone();
    }
    if let Some(prefix) = &cli.deploy_prefix {
        config.deploy_prefix = prefix.clone();
    }
    config.strict |= cli.strict;
    config.ignore_remote_status |= cli.ignore_remote_status;
    config.alias_copies |= cli.alias_copies;

    config.validate()?;
    Ok(config)
}

fn run(cli: &Cli) -> Result<()> {
    let config = settings(cli)?;
    let backend = GixBackend::discover(std::env::current_dir()?, config.committer.clone())?;
    let deployer = Deployer::new(&backend, &config);
    let options = OperationOptions {
        strict: config.strict,
        ignore_remote_status: config.ignore_remote_status,
        message: cli.message.clone(),
    };

    match &cli.command {
        Commands::List { identifier, json } => match identifier {
            Some(identifier) => {
                let info = report(deployer.resolve(identifier, &options)?);
                if *json {
                    println!("{}", to_json(&info)?);
                } else {
                    println!("{}", format_entry(&info));
                }
            }
            None => {
                let infos = report(deployer.list(&options)?);
                if *json {
                    println!("{}", to_json(&infos)?);
                } else {
                    for info in &infos {
                        println!("{}", format_entry(info));
                    }
                }
            }
        },
        Commands::Deploy {
            version,
            aliases,
            title,
            source,
        } => {
            let files = read_dir_files(source)?;
            log::info!("deploying {} files from {}", files.len(), source.display());
            report(deployer.publish(version, title.as_deref(), aliases, &files, &options)?);
        }
        Commands::Delete { identifiers } => {
            report(deployer.delete(identifiers, &options)?);
        }
        Commands::Alias { identifier, aliases } => {
            report(deployer.alias(identifier, aliases, &options)?);
        }
        Commands::Retitle { identifier, title } => {
            report(deployer.retitle(identifier, title, &options)?);
        }
        Commands::Rename {
            identifier,
            new_version,
        } => {
            report(deployer.rename(identifier, new_version, &options)?);
        }
    }

    Ok(())
}

/// Print the outcome's warnings and hand back its value
fn report<T>(outcome: Outcome<T>) -> T {
    for warning in &outcome.warnings {
        eprintln!("warning: {}", warning);
    }
    outcome.value
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| DeployError::InvalidArgument(format!("cannot render JSON: {}", e)))
}
