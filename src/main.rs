mod aggregate;
mod config;
mod environment;
mod error;
mod history;
mod orchestrator;
mod report;
mod secrets;
mod status;

use clap::Parser;
use tracing::{error, info};

use config::{default_history_db, AppConfig, CliArgs, UserConfig};
use environment::BuildEnvironment;
use history::SqliteHistoryStore;
use orchestrator::{RunOptions, RunRequest};
use report::ParseOptions;
use secrets::EnvSecretStore;
use status::{DryRunSink, GithubStatusClient, StatusSink};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ci_status_poster=info".into()),
        )
        .init();

    let args = CliArgs::parse();
    info!("Starting ci-status-poster v{}", env!("CARGO_PKG_VERSION"));
    info!("User config: {:?}", args.config);
    info!("Dry run: {}", args.dry_run);

    let user_config = UserConfig::load(&args.config)?;
    let app_config = AppConfig::load(args.app_config.as_deref())?;
    let build_env = BuildEnvironment::from_env(
        args.build_arn.clone(),
        args.branch.clone(),
        args.commit_sha.clone(),
    )?;
    let target_url = app_config.build_url(&user_config, &build_env.build_id);
    info!("Branch: {}, commit: {}", build_env.branch, build_env.commit_sha);

    let history_db = args.history_db.clone().unwrap_or_else(default_history_db);
    info!("History database: {:?}", history_db);
    let store = SqliteHistoryStore::new(&history_db)?;

    let sink: Box<dyn StatusSink> = if args.dry_run {
        Box::new(DryRunSink)
    } else {
        Box::new(GithubStatusClient::from_secrets(
            &app_config,
            &user_config,
            &EnvSecretStore::new(),
            &build_env.commit_sha,
        )?)
    };

    let request = RunRequest {
        app: &app_config,
        branch: &build_env.branch,
        target_url: &target_url,
        build_start_time: None,
        options: RunOptions {
            parse: ParseOptions {
                strict_static: args.strict_static,
            },
            record_history: !args.no_history,
        },
    };

    match orchestrator::run(request, &store, sink.as_ref()).await {
        Ok(summary) => {
            info!(
                "Successfully posted {} statuses (dynamic state: {})",
                summary.payloads.len(),
                summary.overall_dynamic_state
            );
            Ok(())
        }
        Err(failed) => {
            error!("{}", failed);
            if !failed.dispatched.is_empty() {
                error!(
                    "Statuses already posted before the failure: {}",
                    failed.dispatched.join(", ")
                );
            }
            std::process::exit(1);
        }
    }
}
