//! Fathom - Bounded Multi-Turn Research Agent
//!
//! Main entry point for the CLI application.

use clap::Parser;
use fathom::llm::{LLMProvider, OllamaClient};
use fathom::{Config, FathomError, Orchestrator};
use tracing_subscriber::EnvFilter;

/// Fathom - research a question with parallel web-research loops
#[derive(Parser, Debug)]
#[command(name = "fathom")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Question to research
    request: Option<String>,

    /// Question to research (alternative to the positional argument)
    #[arg(long, short = 'p', conflicts_with = "request")]
    prompt: Option<String>,

    /// Lead model (plans research and writes the answer)
    #[arg(long, short = 'l')]
    lead_model: Option<String>,

    /// Researcher model (drives each research loop)
    #[arg(long, short = 'r')]
    researcher_model: Option<String>,

    /// Maximum turns per research loop
    #[arg(long)]
    max_turns: Option<usize>,

    /// Maximum tool calls per research loop
    #[arg(long)]
    max_tool_calls: Option<usize>,

    /// Enable debug output
    #[arg(long, short = 'd')]
    debug: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

fn init_tracing(debug: bool) -> anyhow::Result<()> {
    let default = if debug { "fathom=debug" } else { "fathom=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing subscriber: {e}"))
}

/// Make sure Ollama is up and both models are pulled
async fn check_models(config: &Config) -> fathom::Result<()> {
    let client = OllamaClient::from_config(config)?;
    let models = client.list_models().await?;
    tracing::debug!("available models: {:?}", models);

    for model in [&config.models.lead, &config.models.researcher] {
        if !client.is_model_available(model).await? {
            return Err(FathomError::ModelNotFound(model.clone()));
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.debug)?;

    // Build configuration
    let mut config = Config::load();

    // Apply CLI overrides
    if let Some(ref lead) = args.lead_model {
        config.models.lead = lead.clone();
    }

    if let Some(ref researcher) = args.researcher_model {
        config.models.researcher = researcher.clone();
    }

    if let Some(max_turns) = args.max_turns {
        config.budget.max_turns = max_turns;
    }

    if let Some(max_tool_calls) = args.max_tool_calls {
        config.budget.max_tool_calls = max_tool_calls;
    }

    config.validate()?;

    if args.print_config {
        println!("{}", config.to_display_toml()?);
        return Ok(());
    }

    let Some(request) = args.request.or(args.prompt) else {
        anyhow::bail!("no question given; pass it as an argument or with --prompt");
    };

    if config.search.api_key.is_empty() {
        tracing::warn!("BRAVE_API_KEY is not set; web searches will fail");
    }

    check_models(&config).await?;

    let orchestrator = Orchestrator::from_config(config)?;
    let result = orchestrator.run(&request).await?;

    tracing::info!(
        succeeded = result.succeeded(),
        failed = result.failed(),
        "research complete"
    );
    println!("{}", result.answer);

    Ok(())
}
