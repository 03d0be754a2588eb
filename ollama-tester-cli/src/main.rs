use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use ollama_tester_core::launcher::installation_help;
use ollama_tester_core::{
    apply_filter, AppEvent, Config, ConnectionState, Controller, OllamaLauncher, OutputMode,
    PromptInputs, SamplingInputs,
};
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "ollama-tester")]
#[command(
    about = "Send prompts to a local Ollama server and filter the answers",
    long_about = None
)]
#[command(version)]
struct Cli {
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log debug output to stderr
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Show current configuration")]
    Show,

    #[command(about = "Check the model server, starting it if needed")]
    Status {
        /// Only probe, never start the server
        #[arg(long)]
        no_start: bool,
    },

    #[command(about = "Model management commands")]
    Models {
        #[command(subcommand)]
        command: ModelCommands,
    },

    #[command(about = "Send a chat request")]
    Send(SendArgs),

    #[command(about = "Apply a regular expression to text from a file or stdin")]
    Filter {
        #[arg(short, long)]
        pattern: String,

        #[arg(short, long)]
        input: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ModelCommands {
    #[command(about = "List installed models")]
    List,

    #[command(about = "Install a model")]
    Pull {
        #[arg(help = "Model name (e.g., 'llama3', 'mistral')")]
        model: String,
    },
}

#[derive(Args)]
struct SendArgs {
    /// User prompt; read from stdin when omitted
    #[arg(short, long)]
    user: Option<String>,

    #[arg(short, long)]
    system: Option<String>,

    #[arg(short, long)]
    assistant: Option<String>,

    #[arg(short, long)]
    model: Option<String>,

    #[arg(long)]
    temperature: Option<String>,

    #[arg(long)]
    top_p: Option<String>,

    #[arg(long)]
    top_k: Option<String>,

    #[arg(long)]
    repeat_penalty: Option<String>,

    #[arg(long)]
    seed: Option<String>,

    #[arg(long, allow_hyphen_values = true)]
    num_predict: Option<String>,

    /// Show the full JSON response
    #[arg(long)]
    json: bool,

    /// Filter applied to the response (defaults to prompt_settings.regex_pattern)
    #[arg(short, long)]
    regex: Option<String>,
}

impl SendArgs {
    fn sampling(&self, defaults: &SamplingInputs) -> SamplingInputs {
        let pick = |value: &Option<String>, default: &String| {
            value.clone().unwrap_or_else(|| default.clone())
        };
        SamplingInputs {
            temperature: pick(&self.temperature, &defaults.temperature),
            top_p: pick(&self.top_p, &defaults.top_p),
            top_k: pick(&self.top_k, &defaults.top_k),
            repeat_penalty: pick(&self.repeat_penalty, &defaults.repeat_penalty),
            seed: pick(&self.seed, &defaults.seed),
            num_predict: pick(&self.num_predict, &defaults.num_predict),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Show => show_config(&cli.config, &config),
        Commands::Status { no_start } => status(config, no_start).await,
        Commands::Models { command } => match command {
            ModelCommands::List => list_models(config).await,
            ModelCommands::Pull { model } => pull_model(config, &model).await,
        },
        Commands::Send(args) => send(config, args).await,
        Commands::Filter { pattern, input } => filter(&pattern, input.as_deref()),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// A missing config file means defaults; a broken one is an error.
fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    Config::load(path).with_context(|| format!("Failed to load config from {}", path.display()))
}

fn show_config(config_path: &Path, config: &Config) -> Result<()> {
    let ollama = &config.ollama_settings;
    let sampling = &config.sampling;

    println!("{} ({})", "Current Configuration:".bold().green(), config_path.display());
    println!();
    println!("{}", "Ollama:".bold());
    println!("  Model:            {}", display_or_unset(&ollama.model).cyan());
    println!("  Base URL:         {}", ollama.base_url);
    println!("  Executable:       {}", ollama.executable);
    println!("  Pull strategy:    {:?}", ollama.pull_strategy);
    println!(
        "  Startup wait:     {} x {} ms",
        ollama.startup_attempts, ollama.startup_interval_ms
    );
    println!();
    println!("{}", "Prompt:".bold());
    println!("  Regex pattern:    {}", display_or_unset(&config.prompt_settings.regex_pattern));
    println!("  System prompt:    {}", display_or_unset(&config.prompt_settings.system_prompt));
    println!();
    println!("{}", "Sampling:".bold());
    println!("  temperature:      {}", sampling.temperature);
    println!("  top_p:            {}", sampling.top_p);
    println!("  top_k:            {}", sampling.top_k);
    println!("  repeat_penalty:   {}", sampling.repeat_penalty);
    println!("  seed:             {}", display_or_unset(&sampling.seed));
    println!("  num_predict:      {}", sampling.num_predict);

    Ok(())
}

fn display_or_unset(value: &str) -> String {
    if value.is_empty() {
        "(unset)".to_string()
    } else {
        value.to_string()
    }
}

/// Brings the server up and waits until the connection settles.
async fn connect(controller: &mut Controller) -> Result<()> {
    println!("{} Connecting to {}...", "→".blue(), controller.config().ollama_settings.base_url);

    controller.start_connection();
    while !matches!(
        controller.state().connection,
        ConnectionState::Ready | ConnectionState::Error
    ) {
        if let AppEvent::Connection(ConnectionState::Starting) = controller.next_event().await {
            println!("{} Starting Ollama server...", "→".blue());
        }
    }
    // Picks up the ConnectionUnavailable report sent after the final state.
    if controller.state().connection == ConnectionState::Error {
        controller.next_event().await;
    }

    if controller.state().connection != ConnectionState::Ready {
        let launcher = OllamaLauncher::new(controller.config().ollama_settings.executable.clone());
        if !launcher.is_installed() {
            eprintln!("{}", installation_help());
        }
        let reason = controller
            .state()
            .last_error
            .clone()
            .unwrap_or_else(|| "Ollama server did not start.".to_string());
        anyhow::bail!(reason);
    }

    Ok(())
}

async fn status(config: Config, no_start: bool) -> Result<()> {
    let mut controller = Controller::from_config(config);

    if no_start {
        let settings = &controller.config().ollama_settings;
        let provider = ollama_tester_core::OllamaProvider::new(settings);
        let reachable = ollama_tester_core::ModelServer::probe(&provider).await;
        if reachable {
            println!("{} Ollama is running", "✓".green().bold());
            return Ok(());
        }
        anyhow::bail!("Ollama is not reachable at {}", provider.base_url());
    }

    connect(&mut controller).await?;
    println!("{} Ollama is running", "✓".green().bold());
    Ok(())
}

async fn load_models(controller: &mut Controller) -> Result<Vec<String>> {
    controller.refresh_models();
    loop {
        match controller.next_event().await {
            AppEvent::ModelsLoaded(models) => return Ok(models),
            AppEvent::ModelStatus(status) => eprintln!("{} {}", "!".yellow(), status),
            _ => {}
        }
    }
}

async fn list_models(config: Config) -> Result<()> {
    let mut controller = Controller::from_config(config);
    connect(&mut controller).await?;

    let models = load_models(&mut controller).await?;

    if models.is_empty() {
        println!(
            "{}",
            "No models found. Install one with 'ollama-tester models pull <model>'".yellow()
        );
        return Ok(());
    }

    println!("{}", "Installed models:".bold().green());
    println!();
    for model in &models {
        let marker = if *model == controller.state().selected_model { "*" } else { "•" };
        println!("  {} {}", marker.cyan(), model.bold());
    }

    Ok(())
}

async fn pull_model(config: Config, model: &str) -> Result<()> {
    let mut controller = Controller::from_config(config);
    connect(&mut controller).await?;

    controller.install_model(model);
    loop {
        match controller.next_event().await {
            AppEvent::ModelStatus(status) => eprintln!("{} {}", "→".blue(), status),
            AppEvent::ModelsLoaded(_) => break,
            AppEvent::Failed(e) => return Err(e.into()),
            _ => {}
        }
    }

    println!("{} Model '{}' installed.", "✓".green().bold(), model.cyan());
    Ok(())
}

async fn send(config: Config, args: SendArgs) -> Result<()> {
    let user = match &args.user {
        Some(text) => text.clone(),
        None => read_stdin()?,
    };
    let prompts = PromptInputs {
        system: args
            .system
            .clone()
            .unwrap_or_else(|| config.prompt_settings.system_prompt.clone()),
        assistant: args.assistant.clone().unwrap_or_default(),
        user,
    };
    let sampling = args.sampling(&config.sampling);
    let pattern = args
        .regex
        .clone()
        .unwrap_or_else(|| config.prompt_settings.regex_pattern.clone());
    let output = if args.json { OutputMode::Json } else { OutputMode::Text };

    let mut controller = Controller::from_config(config);
    connect(&mut controller).await?;

    if let Some(model) = &args.model {
        controller.select_model(model.clone());
    } else if controller.state().selected_model.is_empty() {
        load_models(&mut controller).await?;
    }

    controller.submit(&prompts, &sampling, output)?;
    while controller.state().busy {
        if let AppEvent::ModelStatus(status) = controller.next_event().await {
            eprintln!("{} model {}", "→".blue(), status);
        }
    }

    if let Some(error) = &controller.state().last_error {
        anyhow::bail!(error.clone());
    }

    println!("{}", "Response:".bold().green());
    println!("{}", controller.state().response_text());

    if !pattern.trim().is_empty() {
        println!();
        println!("{} {}", "Filtered:".bold().green(), pattern.dimmed());
        // An invalid pattern is reported in the output, not as a failure.
        let _ = controller.apply_filter(&pattern);
        if let Some(filtered) = &controller.state().filter_output {
            println!("{}", filtered);
        }
    }

    Ok(())
}

fn filter(pattern: &str, input: Option<&Path>) -> Result<()> {
    let text = match input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => read_stdin()?,
    };

    match apply_filter(&text, pattern) {
        Ok(result) => println!("{}", result),
        Err(e) => println!("{}", e.to_string().red()),
    }
    Ok(())
}

fn read_stdin() -> Result<String> {
    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .context("Failed to read stdin")?;
    Ok(text)
}
