// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};
use slipway::output::OutputMode;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "slipway")]
#[command(about = "Blue-green site deployments and editing-session previews")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print only final results
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Print JSON lines instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Config file (defaults to slipway.yml in the current directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else if self.quiet {
            OutputMode::Quiet
        } else {
            OutputMode::Normal
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new slipway.yml configuration file
    Init {
        /// Name of the first site
        #[arg(long)]
        site: Option<String>,

        /// Git remote of the first site
        #[arg(long)]
        repo: Option<String>,

        /// Overwrite an existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Build and deploy a site from its branch head
    Deploy { site: String },

    /// Stop a site's container
    Stop { site: String },

    /// Show sites and their serving containers
    Status,

    /// Manage editing sessions
    Session {
        #[command(subcommand)]
        command: SessionCommand,
    },

    /// Tear down expired sessions once
    Sweep,

    /// Run the session cleanup scheduler until interrupted
    Serve,
}

#[derive(Subcommand)]
pub enum SessionCommand {
    /// Open an editing session with a live preview
    Create {
        site: String,

        #[arg(long)]
        user: i64,

        /// Branch name stem
        #[arg(long)]
        branch: Option<String>,

        /// Lifetime in minutes
        #[arg(long)]
        expires: Option<u32>,

        /// Read-only preview instead of an editable session
        #[arg(long)]
        preview: bool,

        /// Keep the session past its expiry
        #[arg(long)]
        no_auto_cleanup: bool,
    },

    /// Commit the working tree on the session branch
    Commit {
        id: i64,

        #[arg(short, long)]
        message: Option<String>,

        #[arg(long)]
        author: Option<String>,
    },

    /// Merge the session into main and tear it down
    Promote {
        id: i64,

        /// Redeploy the site after merging
        #[arg(long)]
        deploy: bool,
    },

    /// Abandon the session and delete its branch
    Cancel { id: i64 },

    /// Show a session with its commits
    Show {
        id: i64,

        /// Git log entries to include
        #[arg(long, default_value_t = 10)]
        history: usize,
    },
}
