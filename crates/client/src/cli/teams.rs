//! Team CLI commands.

use clap::{Parser, Subcommand};

use slawatch_core::cache::KeyPart;

use super::parse_key_part;

/// Team management commands.
#[derive(Debug, Parser)]
pub struct TeamsCommand {
    #[command(subcommand)]
    pub action: TeamsAction,
}

/// Available team actions.
#[derive(Debug, Subcommand)]
pub enum TeamsAction {
    /// List teams.
    List {
        /// Only teams of this tenant.
        #[arg(long, value_parser = parse_key_part)]
        tenant: Option<KeyPart>,
    },
    /// Create a new team.
    Create {
        /// Owning tenant ID.
        #[arg(long, value_parser = parse_key_part)]
        tenant: KeyPart,
        /// Team name.
        #[arg(long)]
        name: String,
    },
    /// Update a team.
    Update {
        /// Team ID.
        #[arg(value_parser = parse_key_part)]
        id: KeyPart,
        /// Owning tenant ID, to refresh its team views.
        #[arg(long, value_parser = parse_key_part)]
        tenant: Option<KeyPart>,
        /// New name.
        #[arg(long)]
        name: Option<String>,
        /// Activate or deactivate the team.
        #[arg(long)]
        active: Option<bool>,
    },
    /// Delete team by ID.
    Delete {
        /// Team ID.
        #[arg(value_parser = parse_key_part)]
        id: KeyPart,
        /// Owning tenant ID, to refresh its team views.
        #[arg(long, value_parser = parse_key_part)]
        tenant: Option<KeyPart>,
    },
}
