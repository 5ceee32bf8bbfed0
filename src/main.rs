use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{CommandFactory, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use pharmassist_core::config::{
    AppConfig, BranchMode, DataConfig, ModelConfig, RetryConfig, WorkflowConfig,
};
use pharmassist_core::event::EventBus;
use pharmassist_core::traits::{AssessmentCapability, DataSource, LlmClient};
use pharmassist_core::types::WorkflowEvent;

use pharmassist_agent::{
    draft_outreach, render_drug_profile, render_outreach_table, render_report, WorkflowExecutor,
};
use pharmassist_data::{load_doctors, FileDataSource};
use pharmassist_llm::{LlmAssessor, RetryingClient, TimeoutCapability};

#[derive(Parser)]
#[command(name = "pharmassist", version, about = "Phase III go/no-go analysis for clinical trials")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "pharmassist.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the trial-analysis workflow and print the recommendation
    Trial {
        /// Print the report as JSON instead of markdown
        #[arg(long)]
        json: bool,
        /// Run branch steps one after another instead of concurrently
        #[arg(long)]
        sequential: bool,
    },
    /// Summarize the drug profile
    Profile,
    /// Draft educational outreach emails for each doctor
    Outreach,
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pharmassist=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "pharmassist", &mut std::io::stdout());
        return Ok(());
    }

    let config = if cli.config.exists() {
        AppConfig::load(&cli.config)?
    } else {
        eprintln!(
            "Warning: No config file found at {}. Using environment defaults.",
            cli.config.display()
        );
        eprintln!("See pharmassist.toml.example for reference.");
        create_env_config()
    };

    match cli.command {
        Commands::Trial { json, sequential } => run_trial(config, json, sequential).await?,
        Commands::Profile => {
            let source = FileDataSource::from_config(&config);
            let profile = source.load_drug_profile()?;
            print!("{}", render_drug_profile(&profile));
        }
        Commands::Outreach => {
            let doctors = load_doctors(&config.data.doctors_path())?;
            let drafts = draft_outreach(&doctors);
            info!(count = drafts.len(), "Drafted outreach emails");
            print!("{}", render_outreach_table(&drafts));
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Completions { .. } => unreachable!("handled before config load"),
    }

    Ok(())
}

async fn run_trial(config: AppConfig, json: bool, sequential: bool) -> anyhow::Result<()> {
    let capability = build_capability(&config)?;
    let event_bus = Arc::new(EventBus::default());

    let mut executor = WorkflowExecutor::from_config(capability, &config.workflow)
        .with_event_bus(event_bus.clone());
    if sequential {
        executor = executor.with_branch_mode(BranchMode::Sequential);
    }

    // Spawn event printer
    let mut rx = event_bus.subscribe();
    let print_handle = tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event {
                WorkflowEvent::Routed { selection, .. } => {
                    let steps: Vec<&str> = selection.iter().map(|s| s.as_str()).collect();
                    eprintln!("[routed: {}]", steps.join(", "));
                }
                WorkflowEvent::StepStarted { step, .. } => {
                    eprintln!("[step: {}]", step);
                }
                WorkflowEvent::StepFinished {
                    step, elapsed_ms, ..
                } => {
                    eprintln!("[{}: ok, {}ms]", step, elapsed_ms);
                }
                WorkflowEvent::RunComplete {
                    total_elapsed_ms, ..
                } => {
                    eprintln!("[done: {}ms]", total_elapsed_ms);
                    break;
                }
                WorkflowEvent::RunFailed { step, error, .. } => {
                    eprintln!("[{}: ERROR] {}", step, error);
                    break;
                }
                _ => {}
            }
        }
    });

    let source = FileDataSource::from_config(&config);
    let result = executor.run(&source).await;
    drop(executor);
    drop(event_bus);
    print_handle.await.ok();

    let report = result?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_report(&report));
    }
    Ok(())
}

/// Build the assessment capability: provider client, retry and fallback
/// chain, then the optional per-call timeout.
fn build_capability(config: &AppConfig) -> anyhow::Result<Arc<dyn AssessmentCapability>> {
    let primary = pharmassist_llm::create_client(&config.model)?;
    let llm: Arc<dyn LlmClient> =
        if !config.fallback_models.is_empty() || config.model.retry.is_some() {
            let retry_config = config.model.retry.clone().unwrap_or_default();
            let fallbacks = config
                .fallback_models
                .iter()
                .map(|fb| Ok((fb.clone(), pharmassist_llm::create_client(fb)?)))
                .collect::<anyhow::Result<Vec<_>>>()?;
            info!(
                fallbacks = fallbacks.len(),
                max_retries = retry_config.max_retries,
                "LLM retry chain enabled"
            );
            Arc::new(RetryingClient::new(primary, fallbacks, retry_config))
        } else {
            Arc::from(primary)
        };

    let assessor: Arc<dyn AssessmentCapability> =
        Arc::new(LlmAssessor::new(llm, config.model.clone()));
    Ok(match config.workflow.capability_timeout_secs {
        Some(secs) => Arc::new(TimeoutCapability::new(assessor, Duration::from_secs(secs))),
        None => assessor,
    })
}

fn create_env_config() -> AppConfig {
    let anthropic_key = std::env::var("ANTHROPIC_API_KEY").ok();
    let openai_key = std::env::var("OPENAI_API_KEY").ok();

    let (provider, model_id, api_key, base_url) = if let Some(key) = anthropic_key {
        ("anthropic", "claude-sonnet-4-20250514", Some(key), None)
    } else if let Some(key) = openai_key {
        ("openai", "gpt-4o-mini", Some(key), None)
    } else {
        // Local Ollama
        (
            "ollama",
            "llama3.2",
            None,
            Some("http://localhost:11434/v1/chat/completions".to_string()),
        )
    };

    AppConfig {
        model: ModelConfig {
            provider: provider.to_string(),
            model_id: model_id.to_string(),
            api_key,
            base_url,
            max_tokens: 2048,
            temperature: 0.0,
            retry: Some(RetryConfig::default()),
        },
        fallback_models: vec![],
        data: DataConfig::default(),
        workflow: WorkflowConfig::default(),
    }
}
