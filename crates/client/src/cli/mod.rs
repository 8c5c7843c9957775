//! CLI command definitions.

pub mod conflicts;
pub mod roles;
pub mod teams;
pub mod tenants;

use clap::{Parser, Subcommand, ValueEnum};

use slawatch_core::cache::KeyPart;

/// Admin console for the slawatch SLA-monitoring API.
#[derive(Debug, Parser)]
#[command(name = "slawatch")]
#[command(about = "Admin console for the slawatch API", long_about = None)]
pub struct Cli {
    /// Server base URL.
    #[arg(long, env = "SLAWATCH_URL", default_value = "http://localhost:3000")]
    pub base_url: String,

    /// Output format.
    #[arg(long, default_value = "pretty")]
    pub format: OutputFormat,

    /// Suppress non-essential output.
    #[arg(long)]
    pub quiet: bool,

    /// Emit logs as JSON lines.
    #[arg(long, env = "SLAWATCH_LOG_JSON")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Raw JSON output.
    Json,
    /// Human-readable output.
    #[default]
    Pretty,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Tenant management.
    Tenants(tenants::TenantsCommand),
    /// Team management.
    Teams(teams::TeamsCommand),
    /// Role management.
    Roles(roles::RolesCommand),
    /// List permissions.
    Permissions,
    /// List notification channels of a tenant.
    Channels {
        /// Tenant ID.
        #[arg(value_parser = parse_key_part)]
        tenant: KeyPart,
    },
    /// Ownership conflict resolution.
    Conflicts(conflicts::ConflictsCommand),
    /// Follow real-time changes and report what each one invalidates.
    Watch {
        /// Only follow changes of this tenant.
        #[arg(long, value_parser = parse_key_part)]
        tenant: Option<KeyPart>,
        /// Only follow changes of this team.
        #[arg(long, value_parser = parse_key_part)]
        team: Option<KeyPart>,
    },
}

/// Parses an entity id: integers stay numeric, anything else is a string.
pub fn parse_key_part(s: &str) -> Result<KeyPart, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("id must not be empty".to_string());
    }
    Ok(s.parse::<i64>()
        .map(KeyPart::Int)
        .unwrap_or_else(|_| KeyPart::Str(s.to_string())))
}
