//! Tenant CLI commands.

use clap::{Parser, Subcommand};

use slawatch_core::cache::KeyPart;

use super::parse_key_part;

/// Tenant management commands.
#[derive(Debug, Parser)]
pub struct TenantsCommand {
    #[command(subcommand)]
    pub action: TenantsAction,
}

/// Available tenant actions.
#[derive(Debug, Subcommand)]
pub enum TenantsAction {
    /// List all tenants.
    List,
    /// Create a new tenant.
    Create {
        /// Tenant name.
        #[arg(long)]
        name: String,
    },
    /// Update a tenant.
    Update {
        /// Tenant ID.
        #[arg(value_parser = parse_key_part)]
        id: KeyPart,
        /// New name.
        #[arg(long)]
        name: Option<String>,
        /// Activate or deactivate the tenant.
        #[arg(long)]
        active: Option<bool>,
    },
    /// Delete tenant by ID.
    Delete {
        /// Tenant ID.
        #[arg(value_parser = parse_key_part)]
        id: KeyPart,
    },
}
