//! Command-line interface definition using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Build version string with git hash and build date.
fn version_string() -> &'static str {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    const GIT_HASH: &str = env!("GIT_HASH");
    const BUILD_DATE: &str = env!("BUILD_DATE");

    static VERSION_STRING: std::sync::OnceLock<String> = std::sync::OnceLock::new();
    VERSION_STRING.get_or_init(|| format!("{} ({}, {})", VERSION, GIT_HASH, BUILD_DATE))
}

/// daf - developer workflow orchestrator for AI coding sessions
#[derive(Parser, Debug)]
#[command(name = "daf")]
#[command(author, version = version_string(), about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit a machine-readable JSON envelope instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Path to the DevAIFlow home directory
    #[arg(long, env = "DEVAIFLOW_HOME", global = true)]
    pub home: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a session and launch the agent
    New {
        /// What the session sets out to do
        #[arg(short, long)]
        goal: String,

        /// Session name (derived from the goal if omitted)
        #[arg(short, long)]
        name: Option<String>,

        /// Repository directory to work in (default: current directory)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Branch to create or switch to
        #[arg(short, long)]
        branch: Option<String>,

        /// Workspace root the repository lives under
        #[arg(long)]
        workspace: Option<String>,

        /// Template to create the session from
        #[arg(long)]
        template: Option<String>,
    },

    /// Open a session and resume (or start) its agent conversation
    Open {
        /// Session name or issue key
        session: String,

        /// Work in a different repository directory
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Archive the current conversation and start a fresh one
        #[arg(long)]
        new_conversation: bool,
    },

    /// Complete a session
    Complete {
        /// Session name or issue key
        session: String,

        /// Commit outstanding changes first
        #[arg(long)]
        commit: bool,

        /// Commit message override
        #[arg(short, long)]
        message: Option<String>,

        /// PR/MR URL to record
        #[arg(long)]
        pr_url: Option<String>,

        /// Tracker comment override
        #[arg(long)]
        comment: Option<String>,

        /// Skip the tracker transition step
        #[arg(long)]
        skip_transition: bool,
    },

    /// Pause time tracking on a session
    Pause {
        /// Session name or issue key
        session: String,
    },

    /// Resume time tracking on a paused session
    Resume {
        /// Session name or issue key
        session: String,
    },

    /// Delete a session
    Delete {
        /// Session name or issue key
        session: String,

        /// Delete without confirmation
        #[arg(short, long)]
        force: bool,
    },

    /// List sessions
    List,

    /// Show a session with its notes
    Info {
        /// Session name or issue key
        session: String,
    },

    /// Show the session this shell runs inside, if any
    Active,

    /// Show tracked time for a session
    Time {
        /// Session name or issue key
        session: String,
    },

    /// Bind a session to a tracker issue
    Link {
        /// Session name
        session: String,

        /// Issue key (PREFIX-123)
        issue: String,

        /// Replace an existing binding without asking
        #[arg(short, long)]
        force: bool,
    },

    /// Release a session's tracker binding
    Unlink {
        /// Session name
        session: String,

        /// Unlink without confirmation
        #[arg(short, long)]
        force: bool,
    },

    /// Append a note to a session
    Note {
        /// Session name or issue key
        session: String,

        /// Note text
        text: String,

        /// Also post the note as a tracker comment
        #[arg(long)]
        push: bool,
    },

    /// Show a session's notes
    Notes {
        /// Session name or issue key
        session: String,
    },

    /// Create or update sessions from tracker issues
    Sync {
        /// Sprint name filter
        #[arg(long)]
        sprint: Option<String>,

        /// Issue type filter (repeatable)
        #[arg(long = "kind")]
        kinds: Vec<String>,

        /// Parent issue filter
        #[arg(long)]
        parent: Option<String>,

        /// Assignee filter
        #[arg(long)]
        assignee: Option<String>,
    },

    /// Create an investigation session (notes and time only)
    Investigate {
        /// Session name
        name: String,

        /// What to investigate
        goal: String,
    },

    /// Tracker issue operations
    #[command(subcommand)]
    Jira(JiraCommands),

    /// Configuration operations
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
pub enum JiraCommands {
    /// Start a ticket-creation session in a throwaway directory
    New {
        /// Issue type to draft (Story, Bug, ...)
        #[arg(short, long, default_value = "Story")]
        kind: String,

        /// Parent issue for the draft
        #[arg(short, long)]
        parent: Option<String>,

        /// What the ticket should capture
        goal: String,
    },

    /// Create a tracker issue
    Create {
        /// Issue type (Story, Bug, ...)
        #[arg(short, long, default_value = "Story")]
        kind: String,

        /// Project code override
        #[arg(short, long)]
        project: Option<String>,

        /// Issue summary
        #[arg(short, long)]
        summary: String,

        /// Issue description
        #[arg(short, long)]
        description: Option<String>,

        /// Additional fields as alias=value (repeatable)
        #[arg(short, long = "field")]
        fields: Vec<String>,
    },

    /// Update fields on a tracker issue
    Update {
        /// Issue key
        issue: String,

        /// Fields as alias=value (repeatable)
        #[arg(short, long = "field")]
        fields: Vec<String>,
    },

    /// Show a tracker issue
    View {
        /// Issue key
        issue: String,
    },

    /// Refresh the cached field catalog from the tracker
    Fields {
        /// Issue type to fetch fields for
        #[arg(short, long, default_value = "Story")]
        kind: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the resolved configuration
    Show,
}

impl Cli {
    /// Returns the home directory, using the default resolution when
    /// not specified.
    pub fn home(&self) -> PathBuf {
        self.home
            .clone()
            .unwrap_or_else(daf_config::paths::root_dir)
    }

    /// Default tracing level for the verbosity count.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_new() {
        let cli = Cli::parse_from(["daf", "new", "--goal", "fix it", "--name", "feat-x"]);
        match cli.command {
            Commands::New { goal, name, .. } => {
                assert_eq!(goal, "fix it");
                assert_eq!(name.as_deref(), Some("feat-x"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_global_json_flag() {
        let cli = Cli::parse_from(["daf", "list", "--json"]);
        assert!(cli.json);
    }

    #[test]
    fn test_parse_jira_create_fields() {
        let cli = Cli::parse_from([
            "daf", "jira", "create", "--summary", "s", "--field", "team=infra", "--field",
            "severity=high",
        ]);
        match cli.command {
            Commands::Jira(JiraCommands::Create { fields, .. }) => {
                assert_eq!(fields, vec!["team=infra", "severity=high"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_log_level_scales_with_verbosity() {
        let quiet = Cli::parse_from(["daf", "list"]);
        assert_eq!(quiet.log_level(), "warn");
        let loud = Cli::parse_from(["daf", "-vv", "list"]);
        assert_eq!(loud.log_level(), "debug");
    }
}
