// src/main.rs
//
// `almacen` command-line front end.

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;

use almacen_offline::application::cli::{
    AssetsCommands, CartCommands, Cli, Commands, DbCommands, GlobalOpts, HistoryCommands,
};
use almacen_offline::application::commands::*;
use almacen_offline::application::{AppState, ErrorResponse, Render};
use almacen_offline::config::AppConfig;
use almacen_offline::error::{AppError, AppResult};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_tracing();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = match err.downcast_ref::<AppError>() {
                Some(app_error) => {
                    let response = ErrorResponse::from_app_error(app_error);
                    eprintln!("error: {}", response.to_line());
                    response.error_type.exit_code()
                }
                None => {
                    eprintln!("error: {:#}", err);
                    1
                }
            };
            ExitCode::from(code.clamp(1, 255) as u8)
        }
    }
}

fn setup_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(global: &GlobalOpts) -> anyhow::Result<AppConfig> {
    let mut layers = Vec::new();
    if let Some(path) = AppConfig::global_config_path() {
        layers.push(path);
    }
    layers.push(almacen_offline::config::PROJECT_CONFIG_FILE.into());
    if let Some(path) = &global.config {
        anyhow::ensure!(path.exists(), "config file {} does not exist", path.display());
        layers.push(path.clone());
    }

    let mut config = AppConfig::from_files(&layers)?;
    config.apply_env(|key| std::env::var(key).ok())?;
    if let Some(dir) = &global.data_dir {
        config.storage.data_dir = Some(dir.clone());
    }
    config.validate()?;
    Ok(config)
}

fn emit<T: Serialize + Render>(json: bool, value: &T) -> AppResult<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", value.render());
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli.global).context("loading configuration")?;
    let state = AppState::open(config).await?;
    let json = cli.global.json;

    let result = dispatch(&state, cli.command, json).await;
    state.shutdown().await?;
    result?;
    Ok(())
}

async fn dispatch(state: &AppState, command: Commands, json: bool) -> AppResult<()> {
    match command {
        Commands::Preview { file, rows } => emit(json, &preview_file(state, &file, rows)?),

        Commands::Import(args) => {
            let cancel = state.cancellation_token();
            let on_signal = cancel.clone();
            let watcher = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::warn!("Interrupt received; stopping at the next chunk");
                    on_signal.cancel();
                }
            });

            let result = import_file(
                state,
                &args.file,
                args.mapping_overrides(),
                |progress| {
                    log::debug!(
                        "{} rows parsed, {} committed",
                        progress.rows_parsed,
                        progress.rows_committed
                    )
                },
                &cancel,
            )
            .await;
            watcher.abort();
            emit(json, &result?)
        }

        Commands::Search {
            query,
            stock,
            suggest,
        } => {
            let results = if suggest {
                suggest_materials(state, &query)?
            } else {
                search_materials(state, &query, stock)?
            };
            emit(json, &results)
        }

        Commands::Cart(command) => match command {
            CartCommands::Add(material) => emit(json, &add_to_cart(state, &material.key()?)?),
            CartCommands::Remove(material) => {
                emit(json, &remove_from_cart(state, &material.key()?)?)
            }
            CartCommands::Qty { material, qty } => {
                emit(json, &set_cart_qty(state, &material.key()?, qty)?)
            }
            CartCommands::Show => emit(json, &show_cart(state)?),
            CartCommands::Clear => emit(json, &clear_cart(state)?),
            CartCommands::Checkout => emit(json, &checkout_cart(state)?),
        },

        Commands::History(command) => match command {
            HistoryCommands::List { limit } => emit(json, &list_history(state, limit)?),
            HistoryCommands::Export { id } => emit(json, &export_snapshot(state, &id)?),
        },

        Commands::Assets(command) => match command {
            AssetsCommands::Install => emit(json, &install_assets(state).await?),
            AssetsCommands::Status => emit(json, &asset_status(state)?),
            AssetsCommands::Fetch { url, document } => {
                emit(json, &fetch_asset(state, &url, document).await?)
            }
            AssetsCommands::SkipWaiting => emit(json, &skip_waiting(state)?),
        },

        Commands::Db(DbCommands::Stats) => emit(json, &database_report(state)?),
    }
}
