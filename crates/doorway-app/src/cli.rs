use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// CLI arguments for doorway
#[derive(Parser, Debug)]
#[command(name = "doorway")]
#[command(about = "Drive telnet/ssh device sessions through jumphosts with FSM-based login")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose debug output (every FSM transition)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Directory for the application log and session logs
    #[arg(long, value_name = "DIR", env = "DOORWAY_LOG_DIR", global = true)]
    pub log_dir: Option<PathBuf>,

    /// Do not write JSON-lines session logs
    #[arg(long, global = true)]
    pub no_session_log: bool,

    /// Path to config file (default: ~/.doorway/config.toml)
    #[arg(long, value_name = "PATH", env = "DOORWAY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Generate shell completions
    #[arg(long, value_enum)]
    pub generate: Option<Shell>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect to one or more devices, print their prompts and disconnect
    Connect {
        /// Device chain: hop URLs separated by commas, jumphosts first
        /// (e.g. ssh://user:pw@jump,telnet://user:pw@10.0.0.1/enable)
        #[arg(value_name = "TARGET", required_unless_present = "chain")]
        targets: Vec<String>,

        /// Alternative chain to one device; repeat to try several
        #[arg(long = "chain", value_name = "URL,URL")]
        chain: Vec<String>,

        #[command(flatten)]
        session: SessionArgs,
    },
    /// Connect to a device, run one command and print its output
    Send {
        /// Device chain (see `connect`)
        #[arg(value_name = "TARGET")]
        target: String,

        /// Command to execute on the device
        command: String,

        /// Command timeout in seconds
        #[arg(long, value_name = "SECS", env = "DOORWAY_COMMAND_TIMEOUT")]
        command_timeout: Option<u64>,

        #[command(flatten)]
        session: SessionArgs,
    },
    /// Print the default pattern set as TOML, or write it to a file
    Patterns {
        /// Write to this file instead of stdout
        #[arg(short = 'o', long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

/// Options shared by commands that open sessions
#[derive(Args, Debug, Clone, Default)]
pub struct SessionArgs {
    /// Per-step FSM timeout in seconds
    #[arg(long, value_name = "SECS", env = "DOORWAY_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Give up reconnecting after this many seconds
    #[arg(long, value_name = "SECS", env = "DOORWAY_MAX_TIMEOUT")]
    pub max_timeout: Option<u64>,

    /// TOML file with device patterns
    #[arg(long, value_name = "FILE", env = "DOORWAY_PATTERNS")]
    pub patterns: Option<PathBuf>,

    /// Known prompt of the target; skips prompt detection
    #[arg(long, value_name = "PROMPT")]
    pub prompt: Option<String>,

    /// Replay a JSON step script instead of spawning telnet/ssh
    #[arg(long, value_name = "SCRIPT")]
    pub dry_run: Option<PathBuf>,
}
