//! texmerge command-line tool.
//!
//! Provides subcommands for inspecting and merging LaTeX documents section
//! by section, and for working with the branch / commit / merge-request
//! store kept under the configured data directory.

mod documents;
mod repo;
mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use texmerge_core::config::{AppConfig, DEFAULT_CONFIG_FILE};
use texmerge_core::Repository;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// texmerge command-line tool.
#[derive(Parser, Debug)]
#[command(
    name = "texmerge",
    version,
    about = "Section-addressable diff and three-way merge for LaTeX documents"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default configuration file and create the default branch.
    Init {
        /// Output path for the generated config file (defaults to --config).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a configuration file.
    Validate,

    /// Print a document with whitespace inside math collapsed.
    Normalize {
        /// LaTeX source file.
        file: PathBuf,
    },

    /// List the sections of a document.
    Sections {
        /// LaTeX source file.
        file: PathBuf,

        /// Only show the section containing this 1-based line.
        #[arg(long)]
        line: Option<usize>,

        /// Emit JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Show the heading tree of a document.
    Outline {
        /// LaTeX source file.
        file: PathBuf,

        /// Emit JSON instead of an indented tree.
        #[arg(long)]
        json: bool,
    },

    /// Compare two documents section by section.
    Diff {
        /// Left (old) document.
        left: PathBuf,

        /// Right (new) document.
        right: PathBuf,

        /// Emit JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Three-way merge of documents.
    Merge {
        /// Common ancestor document.
        #[arg(long)]
        base: PathBuf,

        /// Source ("left") document.
        #[arg(long)]
        left: PathBuf,

        /// Target ("right") document.
        #[arg(long)]
        right: PathBuf,

        /// Resolution for a conflicting section, as KEY=left|right|both.
        /// Sections without one take the right side.
        #[arg(short, long = "resolve", value_name = "KEY=SIDE")]
        resolutions: Vec<String>,

        /// Write the merged document here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Replace the body of one section, keeping every other line.
    Replace {
        /// LaTeX source file.
        file: PathBuf,

        /// Section key, e.g. `2.1:Setup`.
        key: String,

        /// File holding the new section body.
        #[arg(long)]
        content: PathBuf,

        /// Write the result here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Manage branches.
    Branch {
        #[command(subcommand)]
        action: BranchAction,
    },

    /// Commit a document snapshot onto a branch.
    Commit {
        /// Branch name (defaults to repository.default_branch).
        #[arg(short, long)]
        branch: Option<String>,

        /// Document to commit.
        #[arg(short, long)]
        file: PathBuf,

        /// Commit message.
        #[arg(short, long)]
        message: String,
    },

    /// Show the commit history of a branch.
    Log {
        /// Branch name (defaults to repository.default_branch).
        #[arg(short, long)]
        branch: Option<String>,

        /// Maximum number of commits to show.
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Print the document at a branch head.
    Show {
        /// Branch name (defaults to repository.default_branch).
        #[arg(short, long)]
        branch: Option<String>,
    },

    /// Manage merge requests.
    Mr {
        #[command(subcommand)]
        action: MrAction,
    },

    /// Show recent audit log entries.
    Audit {
        /// Maximum number of entries to show.
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },
}

#[derive(Subcommand, Debug)]
enum BranchAction {
    /// Create a branch, starting from another branch's head if given.
    Create {
        /// New branch name.
        name: String,

        /// Parent branch.
        #[arg(long)]
        from: Option<String>,
    },
    /// List all branches.
    List,
}

#[derive(Subcommand, Debug)]
enum MrAction {
    /// Open a merge request and compute its conflicts.
    Open {
        /// Source branch.
        #[arg(long)]
        source: String,

        /// Target branch (defaults to repository.default_branch).
        #[arg(long)]
        target: Option<String>,

        /// Title.
        #[arg(long)]
        title: String,
    },
    /// List merge requests.
    List {
        /// Filter by status: open, merged, closed.
        #[arg(short, long)]
        status: Option<String>,
    },
    /// Show a merge request and its conflicts.
    Show {
        /// Merge request ID.
        id: String,
    },
    /// Choose a side for one conflicting section.
    Resolve {
        /// Merge request ID.
        id: String,

        /// Section key.
        key: String,

        /// Resolution: left, right or both.
        #[arg(long)]
        accept: String,
    },
    /// Recompute conflicts against the current branch heads.
    Refresh {
        /// Merge request ID.
        id: String,
    },
    /// Merge into the target branch.
    Apply {
        /// Merge request ID.
        id: String,
    },
    /// Close without merging.
    Close {
        /// Merge request ID.
        id: String,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over the configured level; a broken config file falls
    // back to warn so `validate` can still report on it.
    let level = AppConfig::load_or_default(&cli.config)
        .map(|c| c.log.level)
        .unwrap_or_else(|_| "warn".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_target(false)
        .without_time()
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init { output } => cmd_init(output.as_deref().unwrap_or(cli.config.as_path())),
        Commands::Validate => cmd_validate(&cli.config),
        Commands::Normalize { file } => documents::cmd_normalize(&file),
        Commands::Sections { file, line, json } => documents::cmd_sections(&file, line, json),
        Commands::Outline { file, json } => documents::cmd_outline(&file, json),
        Commands::Diff { left, right, json } => documents::cmd_diff(&left, &right, json),
        Commands::Merge {
            base,
            left,
            right,
            resolutions,
            output,
        } => documents::cmd_merge(&base, &left, &right, &resolutions, output.as_deref()),
        Commands::Replace {
            file,
            key,
            content,
            output,
        } => documents::cmd_replace(&file, &key, &content, output.as_deref()),
        command => {
            // Everything else needs the config and the repository store
            let config = load_config(&cli.config)?;
            let repository = open_repository(&config)?;
            let default_branch = config.repository.default_branch.as_str();
            let author = config.repository.author.as_str();

            match command {
                Commands::Branch { action } => match action {
                    BranchAction::Create { name, from } => {
                        repo::cmd_branch_create(&repository, &name, from.as_deref(), author)
                    }
                    BranchAction::List => repo::cmd_branch_list(&repository),
                },
                Commands::Commit {
                    branch,
                    file,
                    message,
                } => repo::cmd_commit(
                    &repository,
                    branch.as_deref().unwrap_or(default_branch),
                    &file,
                    &message,
                    author,
                ),
                Commands::Log { branch, limit } => {
                    repo::cmd_log(&repository, branch.as_deref().unwrap_or(default_branch), limit)
                }
                Commands::Show { branch } => {
                    repo::cmd_show(&repository, branch.as_deref().unwrap_or(default_branch))
                }
                Commands::Mr { action } => match action {
                    MrAction::Open {
                        source,
                        target,
                        title,
                    } => repo::cmd_mr_open(
                        &repository,
                        &source,
                        target.as_deref().unwrap_or(default_branch),
                        &title,
                        author,
                    ),
                    MrAction::List { status } => repo::cmd_mr_list(&repository, status.as_deref()),
                    MrAction::Show { id } => repo::cmd_mr_show(&repository, &id),
                    MrAction::Resolve { id, key, accept } => {
                        repo::cmd_mr_resolve(&repository, &id, &key, &accept, author)
                    }
                    MrAction::Refresh { id } => repo::cmd_mr_refresh(&repository, &id),
                    MrAction::Apply { id } => repo::cmd_mr_apply(&repository, &id, author),
                    MrAction::Close { id } => repo::cmd_mr_close(&repository, &id, author),
                },
                Commands::Audit { limit } => repo::cmd_audit(&repository, limit),
                _ => unreachable!(),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn load_config(path: &Path) -> Result<AppConfig> {
    AppConfig::load_or_default(path).context("failed to load configuration file")
}

fn open_repository(config: &AppConfig) -> Result<Repository> {
    debug!(path = %config.database_path().display(), "opening repository");
    Repository::open_store(&config.store.data_dir).context("failed to open repository database")
}

// ---------------------------------------------------------------------------
// Config subcommands
// ---------------------------------------------------------------------------

fn cmd_init(output: &Path) -> Result<()> {
    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    std::fs::write(output, AppConfig::template()).context("failed to write config file")?;
    println!(
        "{}",
        style::success(&format!("Default configuration written to {}", output.display()))
    );

    let config = AppConfig::load_and_resolve(output).context("failed to load new configuration")?;
    let repository = open_repository(&config)?;
    let branch = &config.repository.default_branch;
    if repository.get_branch(branch).is_ok() {
        println!("{}", style::dim(&format!("Branch '{}' already exists", branch)));
    } else {
        repository
            .create_branch(branch, None, &config.repository.author)
            .context("failed to create default branch")?;
        println!("{}", style::success(&format!("Created branch '{}'", branch)));
    }

    println!();
    println!("Next steps:");
    println!("  1. Edit {} to set your author name", output.display());
    println!("  2. Commit a document: texmerge commit --file paper.tex --message \"First draft\"");

    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let config = AppConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  [OK] TOML structure is valid");

    let mut config = config;
    match config.resolve_env_vars() {
        Ok(()) => println!("  [OK] Environment variable references processed"),
        Err(e) => {
            println!("  [FAIL] {}", e);
            anyhow::bail!("configuration validation failed");
        }
    }

    match config.validate() {
        Ok(()) => println!("  [OK] All required fields are valid"),
        Err(e) => {
            println!("  [FAIL] Validation error: {}", e);
            anyhow::bail!("configuration validation failed");
        }
    }

    println!();
    println!("Configuration summary:");
    println!("  Data directory : {}", config.store.data_dir.display());
    println!("  Database       : {}", config.database_path().display());
    println!("  Log level      : {}", config.log.level);
    println!("  Default branch : {}", config.repository.default_branch);
    println!("  Author         : {}", config.repository.author);
    println!();
    println!("{}", style::success("Configuration is valid."));

    Ok(())
}
