//! HTTP server and CLI for the intake portal.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use clap::Subcommand;
use tracing::info;

use intake_core::Config;
use intake_core::projects;
use intake_jira::JiraClient;

mod error;
mod routes;
mod state;

pub use error::ApiError;
pub use routes::build_router;
pub use state::AppState;

#[derive(Debug, Parser)]
#[command(name = "intake-server", about = "Support ticket intake portal backend")]
pub struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server (the default).
    Serve,
    /// Check credentials, issue types, priorities and project access against
    /// the live tracker.
    Verify,
}

pub async fn run_main(args: Args) -> anyhow::Result<()> {
    // A `.env` next to the binary covers local runs; deployments set real
    // environment variables.
    let _ = dotenvy::dotenv();
    let config = Config::from_env().context("loading configuration")?;

    match args.command {
        None | Some(Command::Serve) => serve(config).await,
        Some(Command::Verify) => verify(config).await,
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let bind_addr = config.bind_addr;
    let state = Arc::new(AppState::from_config(&config).context("building app state")?);
    let router = routes::build_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("binding {bind_addr}"))?;
    info!(addr = %bind_addr, "intake portal listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("serving")
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::error!("could not install ctrl-c handler");
        // Without a signal handler, run until killed.
        std::future::pending::<()>().await;
    }
}

/// The `verify` subcommand: probe the tracker and print what is missing.
async fn verify(config: Config) -> anyhow::Result<()> {
    let jira = JiraClient::new(&config.jira)?;
    println!("Verificando configuración de Jira en {}...", config.jira.host);

    let report = jira
        .verify_config(projects::all())
        .await
        .context("tracker verification failed; check JIRA_EMAIL and JIRA_API_TOKEN")?;

    println!("Conectado como: {} ({})", report.user, report.user_email);

    println!("\nIssue types ({}):", report.issue_types.len());
    for name in &report.issue_types {
        println!("  - {name}");
    }
    if report.missing_issue_types.is_empty() {
        println!("Todos los tipos requeridos existen");
    } else {
        println!("FALTAN tipos requeridos: {}", report.missing_issue_types.join(", "));
    }

    println!("\nPrioridades ({}):", report.priorities.len());
    for name in &report.priorities {
        println!("  - {name}");
    }
    if report.missing_priorities.is_empty() {
        println!("Todas las prioridades requeridas existen");
    } else {
        println!(
            "FALTAN prioridades requeridas: {}",
            report.missing_priorities.join(", ")
        );
    }

    println!("\nProyectos:");
    for check in &report.projects {
        match &check.found {
            Some(name) => println!("  {} ({}): {name}", check.slug, check.key),
            None => println!(
                "  {} ({}): NO ACCESIBLE, verifica que el proyecto exista",
                check.slug, check.key
            ),
        }
    }

    if report.is_complete() {
        println!("\nVerificación completada sin problemas");
    } else {
        println!("\nVerificación completada con advertencias");
    }
    Ok(())
}
