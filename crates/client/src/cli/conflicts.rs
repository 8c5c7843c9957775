//! Ownership conflict CLI commands.

use clap::{Parser, Subcommand};

use slawatch_core::cache::KeyPart;

use super::parse_key_part;

/// Ownership conflict commands.
#[derive(Debug, Parser)]
pub struct ConflictsCommand {
    #[command(subcommand)]
    pub action: ConflictsAction,
}

/// Available conflict actions.
#[derive(Debug, Subcommand)]
pub enum ConflictsAction {
    /// List ownership conflicts.
    List,
    /// Assign the contested resource to one team.
    Resolve {
        /// Conflict ID.
        #[arg(value_parser = parse_key_part)]
        id: KeyPart,
        /// Team that becomes the owner.
        #[arg(long, value_parser = parse_key_part)]
        owner: KeyPart,
    },
}
