use std::path::Path;
use std::process;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use clustersync::cli::{self, Cli, Commands, ContextAction};
use clustersync::client::{ControlPlane, HttpControlPlane};
use clustersync::context::{self, auth, default_config_path, expand_path, Config, Context};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    // Load .env file if specified
    if let Some(ref env_file) = cli.env_file {
        if let Err(e) = dotenvy::from_path(env_file) {
            error!("Failed to load env file {}: {}", env_file.display(), e);
            process::exit(1);
        }
    }

    let config_path = cli
        .config
        .as_deref()
        .map(expand_path)
        .unwrap_or_else(default_config_path);

    match run(cli, &config_path).await {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            error!("{:#}", e);
            process::exit(1);
        }
    }
}

/// Resolve credentials once and build the shared client
fn connect(cli: &Cli, config: &Config) -> anyhow::Result<Arc<dyn ControlPlane>> {
    let resolved = auth::resolve(cli.auth_settings(), config.current()?)?;
    info!(
        host = %resolved.host,
        method = resolved.credentials.method(),
        "resolved credentials"
    );
    Ok(Arc::new(HttpControlPlane::new(&resolved)?))
}

/// Cancel `token` on Ctrl-C
fn cancel_on_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            token.cancel();
        }
    });
}

/// Run the selected command; `Ok(false)` means it ran but did not succeed
async fn run(cli: Cli, config_path: &Path) -> anyhow::Result<bool> {
    let mut config = context::load_config_from(config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;

    match &cli.command {
        Commands::Apply(args) => {
            let client = connect(&cli, &config)?;
            let cancel = CancellationToken::new();
            cancel_on_interrupt(cancel.clone());

            let result = cli::apply(
                client,
                &args.file,
                args.cluster_id.as_deref(),
                &args.reconcile.to_options(),
                &cancel,
            )
            .await?;
            print!("{}", cli::format_reconcile_result(&result));
            Ok(result.is_success())
        }

        Commands::Delete(args) => {
            let client = connect(&cli, &config)?;
            let cancel = CancellationToken::new();
            cancel_on_interrupt(cancel.clone());

            let result = cli::delete(
                client,
                &args.cluster_id,
                &args.reconcile.to_options(),
                &cancel,
            )
            .await;
            print!("{}", cli::format_reconcile_result(&result));
            Ok(result.is_success())
        }

        Commands::Get(args) => {
            let client = connect(&cli, &config)?;
            let observed = cli::get(client, &args.cluster_id).await?;
            print!("{}", cli::render_cluster(&observed, args.output)?);
            Ok(true)
        }

        Commands::Validate(args) => {
            let check = cli::validate_manifest(&args.file);
            print!(
                "{}",
                cli::format_manifest_check(&check, &args.file.display().to_string())
            );
            Ok(check.valid)
        }

        Commands::Context(args) => {
            match &args.action {
                ContextAction::List => {
                    print!("{}", cli::format_context_list(&cli::context_list(&config)));
                    return Ok(true);
                }
                ContextAction::Current => {
                    let current = cli::context_current(&config)?;
                    print!("{}", cli::format_current_context(&current));
                    return Ok(true);
                }
                ContextAction::Use { name } => {
                    cli::context_use(&mut config, name)?;
                    println!("Switched to context \"{}\"", name);
                }
                ContextAction::Add {
                    name,
                    host,
                    token,
                    username,
                    password,
                    description,
                    overwrite,
                } => {
                    let mut ctx = Context::new(name.as_str(), host.as_str());
                    ctx.token = token.clone();
                    ctx.username = username.clone();
                    ctx.password = password.clone();
                    ctx.description = description.clone();
                    cli::context_add(&mut config, ctx, *overwrite)?;
                    println!("Context \"{}\" added", name);
                }
                ContextAction::Delete { name } => {
                    cli::context_delete(&mut config, name)?;
                    println!("Context \"{}\" deleted", name);
                }
            }

            context::save_config_to(&config, config_path)
                .with_context(|| format!("Failed to save config {}", config_path.display()))?;
            Ok(true)
        }
    }
}
