//! slawatch CLI entry point.

use clap::Parser;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use slawatch_client::cli::{Cli, Commands};
use slawatch_client::engine::{ConsoleSession, EngineConfig};
use slawatch_client::output::{pretty, render};
use slawatch_client::{Console, SlawatchClient};
use slawatch_core::models::{UpdateRoleRequest, UpdateTeamRequest, UpdateTenantRequest};
use slawatch_core::notification::ViewContext;

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "slawatch_client=info,slawatch=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so command output stays pipeable.
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = EngineConfig::from_env();
    tracing::debug!(?config, "Engine configuration loaded");

    let console = Console::new(
        ConsoleSession::new(&config),
        SlawatchClient::new(&cli.base_url),
    );
    let format = cli.format;

    match cli.command {
        Commands::Tenants(tenants_cmd) => {
            use slawatch_client::cli::tenants::TenantsAction;
            match tenants_cmd.action {
                TenantsAction::List => {
                    let tenants = console.tenants().await?;
                    println!(
                        "{}",
                        render(tenants.as_slice(), format, pretty::format_tenants)
                    );
                }
                TenantsAction::Create { name } => {
                    let tenant = console.create_tenant(name).await?;
                    println!(
                        "{}",
                        render(&tenant, format, |t| format!(
                            "Created:\n{}",
                            pretty::format_tenant(t)
                        ))
                    );
                }
                TenantsAction::Update { id, name, active } => {
                    let tenant = console
                        .update_tenant(
                            id,
                            UpdateTenantRequest {
                                name,
                                is_active: active,
                            },
                        )
                        .await?;
                    println!(
                        "{}",
                        render(&tenant, format, |t| format!(
                            "Updated:\n{}",
                            pretty::format_tenant(t)
                        ))
                    );
                }
                TenantsAction::Delete { id } => {
                    console.delete_tenant(id.clone()).await?;
                    if !cli.quiet {
                        println!("Deleted tenant {}", id);
                    }
                }
            }
        }
        Commands::Teams(teams_cmd) => {
            use slawatch_client::cli::teams::TeamsAction;
            match teams_cmd.action {
                TeamsAction::List { tenant } => {
                    let teams = console.teams(tenant).await?;
                    println!("{}", render(teams.as_slice(), format, pretty::format_teams));
                }
                TeamsAction::Create { tenant, name } => {
                    let team = console.create_team(tenant, name).await?;
                    println!(
                        "{}",
                        render(&team, format, |t| format!(
                            "Created:\n{}",
                            pretty::format_team(t)
                        ))
                    );
                }
                TeamsAction::Update {
                    id,
                    tenant,
                    name,
                    active,
                } => {
                    let team = console
                        .update_team(
                            id,
                            tenant,
                            UpdateTeamRequest {
                                name,
                                is_active: active,
                            },
                        )
                        .await?;
                    println!(
                        "{}",
                        render(&team, format, |t| format!(
                            "Updated:\n{}",
                            pretty::format_team(t)
                        ))
                    );
                }
                TeamsAction::Delete { id, tenant } => {
                    console.delete_team(id.clone(), tenant).await?;
                    if !cli.quiet {
                        println!("Deleted team {}", id);
                    }
                }
            }
        }
        Commands::Roles(roles_cmd) => {
            use slawatch_client::cli::roles::RolesAction;
            use slawatch_core::models::CreateRoleRequest;
            match roles_cmd.action {
                RolesAction::List => {
                    let roles = console.roles().await?;
                    println!("{}", render(roles.as_slice(), format, pretty::format_roles));
                }
                RolesAction::Create {
                    name,
                    description,
                    permissions,
                } => {
                    let role = console
                        .create_role(CreateRoleRequest {
                            name,
                            description,
                            permission_ids: permissions,
                        })
                        .await?;
                    println!(
                        "{}",
                        render(&role, format, |r| format!(
                            "Created:\n{}",
                            pretty::format_role(r)
                        ))
                    );
                }
                RolesAction::Update {
                    id,
                    name,
                    description,
                    permissions,
                } => {
                    let role = console
                        .update_role(
                            id,
                            UpdateRoleRequest {
                                name,
                                description,
                                permission_ids: permissions,
                            },
                        )
                        .await?;
                    println!(
                        "{}",
                        render(&role, format, |r| format!(
                            "Updated:\n{}",
                            pretty::format_role(r)
                        ))
                    );
                }
                RolesAction::Delete { id } => {
                    console.delete_role(id.clone()).await?;
                    if !cli.quiet {
                        println!("Deleted role {}", id);
                    }
                }
            }
        }
        Commands::Permissions => {
            let permissions = console.permissions().await?;
            println!(
                "{}",
                render(permissions.as_slice(), format, pretty::format_permissions)
            );
        }
        Commands::Channels { tenant } => {
            let channels = console.notification_channels(tenant).await?;
            println!(
                "{}",
                render(channels.as_slice(), format, pretty::format_channels)
            );
        }
        Commands::Conflicts(conflicts_cmd) => {
            use slawatch_client::cli::conflicts::ConflictsAction;
            match conflicts_cmd.action {
                ConflictsAction::List => {
                    let conflicts = console.conflicts().await?;
                    println!(
                        "{}",
                        render(conflicts.as_slice(), format, pretty::format_conflicts)
                    );
                }
                ConflictsAction::Resolve { id, owner } => {
                    let conflict = console.resolve_conflict(id, owner).await?;
                    println!(
                        "{}",
                        render(&conflict, format, |c| format!(
                            "Resolved:\n{}",
                            pretty::format_conflict(c)
                        ))
                    );
                }
            }
        }
        Commands::Watch { tenant, team } => {
            let mut view = match tenant {
                Some(tenant_id) => ViewContext::for_tenant(tenant_id),
                None => ViewContext::all(),
            };
            if let Some(team_id) = team {
                view = view.with_team(team_id);
            }

            if !cli.quiet {
                eprintln!("Watching changes (Ctrl+C to stop)...");
            }

            let mut outcomes = console.session().realtime().subscribe_outcomes();
            let printer = tokio::spawn(async move {
                use tokio::sync::broadcast::error::RecvError;
                loop {
                    match outcomes.recv().await {
                        Ok(outcome) => {
                            println!("{}", render(&outcome, format, pretty::format_outcome))
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Output fell behind change stream");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            });

            console
                .watch(view, async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await;
            printer.abort();
        }
    }

    Ok(())
}
