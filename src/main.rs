use clap::{Parser, Subcommand};
use opencast_codebuild::api;
use opencast_codebuild::config::{BootstrapEnv, SsmParameterStore, load_stack_config};
use opencast_codebuild::error::CodebuildError;
use opencast_codebuild::logging::{FileLogger, setup_logging};
use opencast_codebuild::notify::Notifier;
use opencast_codebuild::notify::aws::{CodeBuildStatusSource, SnsAlertPublisher, resolve_topic_arn};
use opencast_codebuild::notify::slack::SlackWebhook;
use opencast_codebuild::stack::StackPlan;
use opencast_codebuild::trigger::classify;
use opencast_codebuild::{AppState, load_notifier_config};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

const DEFAULT_NOTIFIER_CONFIG: &str = "notifier_config.toml";
const DEFAULT_OUT_DIR: &str = "cdk.out";

#[derive(Parser)]
#[command(name = "opencast-codebuild")]
#[command(author, version, about = "Build pipeline bootstrap and notifier for the Opencast CodeBuild projects")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify the webhook trigger and print shell exports
    Classify {
        /// Webhook trigger descriptor, e.g. `branch/develop`
        #[arg(long, env = "CODEBUILD_WEBHOOK_TRIGGER", default_value = "")]
        trigger: String,

        /// Source version used for manually started builds
        #[arg(long, env = "CODEBUILD_SOURCE_VERSION", default_value = "")]
        source_version: String,

        /// Print the classification as JSON instead
        #[arg(long)]
        json: bool,
    },
    /// Load the environment's configuration and write the stack plan
    Synth {
        /// Output directory for the plan, buildspecs and notifier config
        #[arg(long, default_value = DEFAULT_OUT_DIR)]
        out_dir: PathBuf,
    },
    /// Run the build notifier service
    Serve {
        /// Notifier configuration file
        #[arg(long, env = "NOTIFIER_CONFIG", default_value = DEFAULT_NOTIFIER_CONFIG)]
        config: PathBuf,
    },
}

fn fail(e: CodebuildError) -> ! {
    eprintln!("Configuration error: {}", e);
    std::process::exit(1);
}

async fn synth(out_dir: PathBuf) -> Result<(), CodebuildError> {
    let env = BootstrapEnv::load()?;
    info!("Using environment '{}'", env.environment_name);

    let store = SsmParameterStore::from_env().await;
    let config = load_stack_config(&store, &env).await?;

    let plan = StackPlan::new(&env, &config)?;
    for path in plan.write_to(&out_dir).await? {
        println!("{}", path.display());
    }
    Ok(())
}

async fn serve(config_path: PathBuf) -> Result<(), CodebuildError> {
    let mut config = load_notifier_config(&config_path).await?;
    let shared = aws_config::load_from_env().await;

    if config.sns_topic_arn.is_none() {
        if let Some(name) = config.sns_topic_name.clone() {
            let sns = aws_sdk_sns::Client::new(&shared);
            config.sns_topic_arn = Some(resolve_topic_arn(&sns, &name).await?);
        }
    }

    let mut notifier = Notifier::new(
        Arc::new(CodeBuildStatusSource::new(aws_sdk_codebuild::Client::new(&shared))),
        Arc::new(SlackWebhook::new(config.slack_notify_url.clone())),
    )
    .with_polling(config.poll_interval(), config.max_wait());
    if let Some(topic_arn) = &config.sns_topic_arn {
        notifier = notifier.with_alerts(Arc::new(SnsAlertPublisher::new(
            aws_sdk_sns::Client::new(&shared),
            topic_arn.clone(),
        )));
    }

    let bind_address = config.bind_address.clone();
    let state = Arc::new(AppState::new(config, notifier));
    let app = api::router(state);

    info!("Listening on {}", bind_address);
    info!("Using config at {:?}", config_path);
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let file_logger = std::env::var("LOG_DIR").ok().map(|dir| FileLogger::new(PathBuf::from(dir)));
    let _guard = match setup_logging(file_logger.as_ref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to set up logging: {}", e);
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Classify {
            trigger,
            source_version,
            json,
        } => {
            let build_trigger = classify(&trigger, &source_version);
            info!(
                "Trigger {:?} classified as {} ({})",
                trigger, build_trigger.kind, build_trigger.normalized_path
            );
            if json {
                match serde_json::to_string(&build_trigger) {
                    Ok(out) => println!("{}", out),
                    Err(e) => fail(e.into()),
                }
            } else {
                print!("{}", build_trigger.to_shell_exports());
            }
        }
        Commands::Synth { out_dir } => {
            if let Err(e) = synth(out_dir).await {
                fail(e);
            }
        }
        Commands::Serve { config } => {
            if let Err(e) = serve(config).await {
                fail(e);
            }
        }
    }
}
