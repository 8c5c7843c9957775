//! Role CLI commands.

use clap::{Parser, Subcommand};

use slawatch_core::cache::KeyPart;

use super::parse_key_part;

/// Role management commands.
#[derive(Debug, Parser)]
pub struct RolesCommand {
    #[command(subcommand)]
    pub action: RolesAction,
}

/// Available role actions.
#[derive(Debug, Subcommand)]
pub enum RolesAction {
    /// List all roles.
    List,
    /// Create a new role.
    Create {
        /// Role name.
        #[arg(long)]
        name: String,
        /// Optional description.
        #[arg(long)]
        description: Option<String>,
        /// Granted permission IDs (repeatable).
        #[arg(long = "permission", value_parser = parse_key_part)]
        permissions: Vec<KeyPart>,
    },
    /// Update a role.
    Update {
        /// Role ID.
        #[arg(value_parser = parse_key_part)]
        id: KeyPart,
        /// New name.
        #[arg(long)]
        name: Option<String>,
        /// New description.
        #[arg(long)]
        description: Option<String>,
        /// Replace granted permission IDs (repeatable).
        #[arg(long = "permission", value_parser = parse_key_part)]
        permissions: Option<Vec<KeyPart>>,
    },
    /// Delete role by ID.
    Delete {
        /// Role ID.
        #[arg(value_parser = parse_key_part)]
        id: KeyPart,
    },
}
