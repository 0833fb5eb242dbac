use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use opzenix::cli::{self, ApprovalCommands, Commands, LockCommands, RoleCommands};
use opzenix::config::{self, Config};
use opzenix::events::ChangeFeed;
use opzenix::governance::permissions::{Action, Actor};
use opzenix::governance::service::GovernanceService;
use opzenix::models::approval::VoteDecision;
use opzenix::models::environment::Environment;
use opzenix::models::role::AccountRole;
use opzenix::notification::webhook::WebhookNotifier;
use opzenix::store::memory::MemoryStore;
use opzenix::store::postgres::PgStore;
use opzenix::store::GovernanceStore;
use opzenix::AppState;

/// Actor used for role changes made from the command line.
const CLI_ACTOR: &str = "cli";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse first so --help and usage errors never depend on configuration.
    let args = cli::Cli::parse();

    // Export spans over OTLP only when a collector endpoint is configured.
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::{trace as sdktrace, Resource};

    let telemetry_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic())
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "opzenix"),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .context("failed to install OpenTelemetry tracer")?;
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "opzenix=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry_layer)
        .init();

    let cfg = config::load()?;

    let result = match args.command {
        Some(Commands::Serve { port }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port).await
        }
        None => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
        Some(command) => {
            let governance = build_service(&cfg, true).await?;
            let result = handle_command(&governance, command).await;
            // The runtime stops when main returns; let deliveries finish first.
            let delivered = governance.flush_webhooks().await;
            if delivered > 0 {
                tracing::info!(delivered, "webhook deliveries completed");
            }
            result
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

async fn open_store(cfg: &Config, require_db: bool) -> anyhow::Result<Arc<dyn GovernanceStore>> {
    match &cfg.database_url {
        Some(url) => {
            tracing::info!("Connecting to database...");
            let db = PgStore::connect(url).await?;
            tracing::info!("Running migrations...");
            db.migrate().await?;
            Ok(Arc::new(db))
        }
        None if require_db => {
            anyhow::bail!("DATABASE_URL must be set for this command")
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store, state is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

async fn build_service(cfg: &Config, require_db: bool) -> anyhow::Result<GovernanceService> {
    let store = open_store(cfg, require_db).await?;
    let webhooks = WebhookNotifier::new(cfg.webhook_urls.clone(), cfg.webhook_secret.clone())?;
    let governance = GovernanceService::new(
        store,
        ChangeFeed::new(cfg.change_feed_capacity),
        cfg.rules,
    )
    .with_webhooks(webhooks);
    governance.seed_environment_locks().await?;
    Ok(governance)
}

async fn run_server(cfg: Config, port: u16) -> anyhow::Result<()> {
    let governance = build_service(&cfg, false).await?;
    tracing::info!(
        allow_self_approval = cfg.rules.allow_self_approval,
        allow_revote = cfg.rules.allow_revote,
        webhooks = cfg.webhook_urls.len(),
        "governance rules loaded"
    );

    let state = Arc::new(AppState {
        governance,
        config: cfg,
    });
    let app = opzenix::api::app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Opzenix listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("shutting down");
}

fn parse_env(raw: &str) -> anyhow::Result<Environment> {
    raw.parse().map_err(|e: String| anyhow::anyhow!(e))
}

async fn handle_command(governance: &GovernanceService, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Serve { .. } => anyhow::bail!("serve is not a one-shot command"),
        Commands::Role { command } => handle_role_command(governance, command).await,
        Commands::Approval { command } => handle_approval_command(governance, command).await,
        Commands::Lock { command } => handle_lock_command(governance, command).await,
        Commands::Can {
            user,
            action,
            environment,
        } => {
            let actor = governance.resolve_actor(&user).await?;
            let action: Action = action.parse().map_err(|e: String| anyhow::anyhow!(e))?;
            let environment = parse_env(&environment)?;
            let allowed = actor.can(action, environment);
            println!(
                "{} ({}) {} {:?} in {}",
                actor.user_id,
                actor.account_role(),
                if allowed { "MAY" } else { "may NOT" },
                action,
                environment
            );
            Ok(())
        }
    }
}

async fn handle_role_command(governance: &GovernanceService, command: RoleCommands) -> anyhow::Result<()> {
    match command {
        RoleCommands::Set { user, role } => {
            let role: AccountRole = role.parse().map_err(|e: String| anyhow::anyhow!(e))?;
            let system = Actor::new(CLI_ACTOR, AccountRole::Admin);
            let assignment = governance.assign_role(&system, &user, role).await?;
            println!("{} is now {}", assignment.user_id, assignment.account_role);
        }
        RoleCommands::Show { user } => {
            let actor = governance.resolve_actor(&user).await?;
            println!("{}", serde_json::to_string_pretty(&serde_json::json!({
                "user_id": actor.user_id,
                "account_role": actor.account_role(),
                "roles": actor.profile.roles,
                "default_mode": actor.profile.default_mode,
                "permissions": actor.permissions.matrix(),
            }))?);
        }
        RoleCommands::List => {
            let roles = governance.list_roles().await?;
            println!("{:<32} {:<10} {:<20}", "USER", "ROLE", "UPDATED");
            for r in roles {
                println!(
                    "{:<32} {:<10} {:<20}",
                    r.user_id,
                    r.account_role,
                    r.updated_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
    }
    Ok(())
}

async fn handle_approval_command(
    governance: &GovernanceService,
    command: ApprovalCommands,
) -> anyhow::Result<()> {
    match command {
        ApprovalCommands::List { status } => {
            let status = status
                .as_deref()
                .map(str::parse)
                .transpose()
                .map_err(|e: String| anyhow::anyhow!(e))?;
            let requests = governance.list_approvals(status).await?;
            println!(
                "{:<36} {:<8} {:<9} {:<7} {:<20}",
                "ID", "ENV", "STATUS", "VOTES", "TITLE"
            );
            for r in requests {
                println!(
                    "{:<36} {:<8} {:<9} {:<7} {:<20}",
                    r.id,
                    r.environment,
                    r.status.as_str(),
                    format!("{}/{}", r.current_approvals, r.required_approvals),
                    r.title
                );
            }
        }
        ApprovalCommands::Create {
            user,
            title,
            environment,
            required,
        } => {
            let actor = governance.resolve_actor(&user).await?;
            let request = governance
                .create_approval_request(&actor, &title, parse_env(&environment)?, required)
                .await?;
            println!("Created approval request {}", request.id);
        }
        ApprovalCommands::Approve {
            request_id,
            user,
            comment,
        } => vote(governance, &request_id, &user, VoteDecision::Approve, &comment).await?,
        ApprovalCommands::Reject {
            request_id,
            user,
            comment,
        } => vote(governance, &request_id, &user, VoteDecision::Reject, &comment).await?,
    }
    Ok(())
}

async fn vote(
    governance: &GovernanceService,
    request_id: &str,
    user: &str,
    decision: VoteDecision,
    comment: &str,
) -> anyhow::Result<()> {
    let id = Uuid::parse_str(request_id).context("invalid request id")?;
    let actor = governance.resolve_actor(user).await?;
    let receipt = governance.cast_vote(&actor, id, decision, comment).await?;
    println!(
        "Request {} is {} ({}/{})",
        receipt.request.id,
        receipt.request.status.as_str(),
        receipt.request.current_approvals,
        receipt.request.required_approvals
    );
    Ok(())
}

async fn handle_lock_command(governance: &GovernanceService, command: LockCommands) -> anyhow::Result<()> {
    match command {
        LockCommands::List => {
            let locks = governance.list_locks().await?;
            println!("{:<8} {:<8} {:<9} {:<20}", "ENV", "LOCKED", "REQUIRES", "LAST CHANGE BY");
            for l in locks {
                let by = if l.is_locked { &l.locked_by } else { &l.unlocked_by };
                println!(
                    "{:<8} {:<8} {:<9} {:<20}",
                    l.environment,
                    l.is_locked,
                    l.required_role,
                    by.as_deref().unwrap_or("-")
                );
            }
        }
        LockCommands::Lock {
            environment,
            user,
            reason,
        } => {
            let actor = governance.resolve_actor(&user).await?;
            let lock = governance
                .lock_environment(&actor, parse_env(&environment)?, reason)
                .await?;
            println!("{} locked", lock.environment);
        }
        LockCommands::Unlock {
            environment,
            user,
            comment,
        } => {
            let actor = governance.resolve_actor(&user).await?;
            let lock = governance
                .unlock_environment(&actor, parse_env(&environment)?, &comment)
                .await?;
            println!("{} unlocked", lock.environment);
        }
    }
    Ok(())
}
