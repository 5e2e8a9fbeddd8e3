use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use patchpilot::config::{AppConfig, LogFormat};
use patchpilot::platform::greptile::GreptileClient;
use patchpilot::platform::types::IndexRequest;
use patchpilot::platform::Indexer;
use patchpilot::server::{create_router, AppState};
use patchpilot::shutdown::{shutdown_signal, wait_for_shutdown};
use patchpilot::workflow::types::{
    AnalysisQuery, ChangeRequestParameters, PipelineOutcome, Submission, WorkflowContext,
};
use patchpilot::workflow::Orchestrator;

#[derive(Parser)]
#[command(
    name = "patchpilot",
    about = "Analyze a repository, commit the proposed changes to a branch, and open a pull request"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API (default)
    Serve,
    /// Ask the analysis service to index a repository branch
    Index(RepoArgs),
    /// Run the full pipeline once and print the outcome
    Submit(SubmitArgs),
}

#[derive(Args)]
struct RepoArgs {
    /// Greptile API key
    #[arg(long, env = "GREPTILE_API_KEY", hide_env_values = true)]
    api_key: String,
    /// GitHub access token
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: String,
    /// Repository as <owner>/<name>
    #[arg(long)]
    repo: String,
    /// Source branch
    #[arg(long, default_value = "main")]
    branch: String,
}

#[derive(Args)]
struct SubmitArgs {
    #[command(flatten)]
    repo: RepoArgs,
    /// Branch to create with the proposed changes
    #[arg(long)]
    new_branch: String,
    /// Commit message for the changes
    #[arg(long)]
    message: String,
    /// Pull request title
    #[arg(long)]
    title: String,
    /// Pull request body
    #[arg(long, default_value = "")]
    body: String,
    /// What the analysis should change (defaults to the configured query)
    #[arg(long)]
    query: Option<String>,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref())?;

    init_tracing(config.logging.format);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Index(args) => index(config, args).await,
        Command::Submit(args) => submit(config, args).await,
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    tracing::info!(
        host = %config.server.host,
        port = %config.server.port,
        "Starting patchpilot server"
    );

    let state = Arc::new(AppState::new(config.clone()));
    let app = create_router(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind(format!(
        "{}:{}",
        config.server.host, config.server.port
    ))
    .await?;

    tracing::info!("Listening on {}", listener.local_addr()?);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

async fn index(config: AppConfig, args: RepoArgs) -> anyhow::Result<()> {
    let context =
        WorkflowContext::new(&args.api_key, &args.github_token, &args.repo, &args.branch)?;
    let client = GreptileClient::new(&config.greptile);

    let ack = client
        .index_repository(&IndexRequest {
            api_key: context.analysis_credential,
            access_token: context.repo_access_token,
            repository: context.repository,
            branch: context.source_branch,
        })
        .await?;

    println!("{}", serde_json::to_string_pretty(&ack)?);
    Ok(())
}

async fn submit(config: AppConfig, args: SubmitArgs) -> anyhow::Result<()> {
    let submission = Submission {
        context: WorkflowContext::new(
            &args.repo.api_key,
            &args.repo.github_token,
            &args.repo.repo,
            &args.repo.branch,
        )?,
        query: AnalysisQuery::or_default(
            args.query.as_deref(),
            &config.greptile.default_query,
        )?,
        change_request: ChangeRequestParameters::new(
            &args.new_branch,
            &args.message,
            &args.title,
            &args.body,
        )?,
    };

    let orchestrator = Orchestrator::from_config(&config);

    let outcome = tokio::select! {
        result = orchestrator.run(&submission) => result?,
        _ = wait_for_shutdown() => {
            eprintln!(
                "Interrupted. A stage that was already sent may still complete on the remote side; check branch {} on {}.",
                submission.change_request.new_branch, submission.context.repository
            );
            std::process::exit(130);
        }
    };

    println!("{}", outcome.summary());

    if matches!(outcome, PipelineOutcome::Aborted { .. }) {
        std::process::exit(1);
    }
    Ok(())
}
