//! CLI argument definitions for Passenger.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Passenger -- a self-hosted secret manager.
#[derive(Parser)]
#[command(
    name = "passenger",
    version,
    about = "Passenger -- command-line client for a self-hosted secret manager",
    long_about = "Talks to a Passenger server. The session token from `passenger login` \
                  is kept encrypted on disk and expires after five minutes."
)]
pub struct Cli {
    /// Log debug output to stderr.
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Set the URL of the Passenger server.
    #[command(visible_aliases = ["set-server", "set-url", "set-server-url"])]
    Server {
        /// Server URL, e.g. `https://pass.example.com`.
        url: String,
    },

    /// Show whether the server is initialized and the local session state.
    #[command(visible_aliases = ["check", "is-initialized"])]
    Status,

    /// Initialize the server with a master passphrase.
    #[command(visible_aliases = ["init", "initialize"])]
    Register,

    /// Confirm the recovery key issued at registration.
    #[command(visible_alias = "verify")]
    Validate {
        /// The recovery key. Prompted for when omitted.
        recovery: Option<String>,
    },

    /// Log in with the master passphrase and cache the session token.
    #[command(visible_aliases = ["sign-in", "log-in"])]
    Login,

    /// Forget the cached session token.
    #[command(visible_aliases = ["sign-out", "log-out"])]
    Logout,

    /// List stored accounts.
    #[command(visible_aliases = ["ls", "show-all", "fetch-all"])]
    List,

    /// Print the passphrase of an account.
    #[command(visible_aliases = ["fetch", "show", "passphrase", "pw"])]
    Get {
        /// Account ID.
        id: String,
    },

    /// Store a new account.
    #[command(visible_aliases = ["add", "new", "insert"])]
    Create(AccountArgs),

    /// Change fields of an account.
    #[command(visible_aliases = ["edit", "modify", "change"])]
    Update {
        /// Account ID.
        id: String,

        #[command(flatten)]
        fields: AccountArgs,

        /// Prompt for a new passphrase.
        #[arg(long)]
        change_passphrase: bool,
    },

    /// Delete an account.
    #[command(visible_aliases = ["remove", "rm", "del", "shred"])]
    Delete {
        /// Account ID.
        id: String,
    },

    /// Generate a random passphrase.
    #[command(visible_aliases = ["gen", "suggest", "random"])]
    Generate {
        /// Number of characters.
        #[arg(long, short, default_value_t = 32)]
        length: u32,
    },

    /// Suggest a look-alike variant of a passphrase.
    #[command(visible_aliases = ["alt", "alternative", "shuffle"])]
    Alternate {
        /// The passphrase to transform.
        passphrase: String,
    },

    /// Change the master passphrase.
    #[command(
        name = "master-passphrase",
        visible_aliases = ["change-passphrase", "change-master", "change-master-pass"]
    )]
    MasterPassphrase,

    /// Import accounts from a Firefox or Chromium CSV export.
    #[command(visible_aliases = ["import-csv", "load"])]
    Import {
        /// Path to the CSV file.
        #[arg(long, short, visible_alias = "input")]
        file: PathBuf,
    },

    /// Export every account as CSV.
    #[command(visible_aliases = ["export-csv", "dump"])]
    Export {
        /// Write to this file instead of stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

/// Account fields shared by `create` and `update`. Missing values are
/// prompted for on `create` and left unchanged on `update`.
#[derive(Args, Debug, Default)]
pub struct AccountArgs {
    /// Service name, e.g. `github`.
    #[arg(long, short)]
    pub platform: Option<String>,

    /// Username or email on the service.
    #[arg(long, short)]
    pub identifier: Option<String>,

    #[arg(long, short)]
    pub url: Option<String>,

    #[arg(long, short)]
    pub notes: Option<String>,
}
