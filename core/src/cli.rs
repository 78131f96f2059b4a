use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use crate::application::Application;
use crate::config::Config;
use crate::definition::FlowchartDef;
use crate::engine::{Flowchart, RequestKind, Resume, Ticket};
use crate::parser::semantic_validator::validate_flowchart;
use crate::signals::{Signal, SignalKind};
use crate::variables::Value;

#[derive(Parser)]
#[command(name = "blockflow")]
#[command(about = "Blockflow - run and check narrative flowcharts", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a flowchart interactively
    Run {
        /// Definition file (.flow, .json or .toml)
        file: PathBuf,

        /// Block to execute after the start handlers
        #[arg(short = 'b', long = "block")]
        block: Option<String>,

        /// More definition files to load beside it (for cross-flowchart calls and messages)
        #[arg(short = 'w', long = "with")]
        with: Vec<PathBuf>,
    },

    /// Validate a definition and report every finding
    Check {
        /// Definition file (.flow, .json or .toml)
        file: PathBuf,
    },

    /// Print a definition as JSON
    Dump {
        /// Definition file (.flow, .json or .toml)
        file: PathBuf,
    },
}

/// Run the CLI by parsing process arguments
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli).await
}

/// Run the CLI with provided arguments
pub async fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli).await
}

async fn run_cli_with_args(cli: Cli) -> Result<()> {
    // Load configuration before any command so config errors surface first
    let config = Config::builder().config_path(cli.config.clone()).build()?;
    init_tracing(&config);

    match cli.command {
        Commands::Run { file, block, with } => {
            let mut app = Application::builder().config(config).build()?;
            let name = app.load_file(&file)?.name().to_string();
            for extra in &with {
                app.load_file(extra)?;
            }
            run_interactive(&mut app, &name, block).await?;
        }

        Commands::Check { file } => {
            let def = FlowchartDef::load(&file)
                .with_context(|| format!("Failed to load {}", file.display()))?;
            let findings = validate_flowchart(&def);
            for finding in &findings {
                println!("{}", finding);
            }
            let errors = findings.iter().filter(|f| f.is_error()).count();
            if errors > 0 {
                bail!("{} error(s) in {}", errors, file.display());
            }
            println!(
                "✓ {} ok ({} block(s), {} warning(s))",
                def.name,
                def.blocks.len(),
                findings.len()
            );
        }

        Commands::Dump { file } => {
            let def = FlowchartDef::load(&file)
                .with_context(|| format!("Failed to load {}", file.display()))?;
            println!("{}", def.to_json_pretty()?);
        }
    }

    Ok(())
}

/// Install the fmt subscriber; `RUST_LOG` wins over the configured filter
fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_filter.as_deref().unwrap_or("warn")))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/* ===================== Interactive Runner ===================== */

/// What the next line of input answers, by owning flowchart
#[derive(Default)]
struct Prompt {
    say: Option<(String, Ticket)>,
    custom: Option<(String, Ticket)>,
    options: Vec<(String, String)>,
}

impl Prompt {
    fn is_waiting(&self) -> bool {
        self.say.is_some() || self.custom.is_some() || !self.options.is_empty()
    }
}

async fn run_interactive(app: &mut Application, name: &str, block: Option<String>) -> Result<()> {
    let tick_interval = Duration::from_millis(app.config().host.tick_interval_ms);

    let _messages = app.signals().subscribe(SignalKind::MessageSent, |signal| {
        if let Signal::MessageSent { message, .. } = signal {
            println!("  [message] {}", message);
        }
    });

    if app.flowchart(name).is_none() {
        bail!("Flowchart '{}' is not loaded", name);
    }
    app.start_all();
    if let Some(block) = block {
        app.execute_block(name, &block, 0)?;
    }

    let mut prompt = Prompt::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut interval = tokio::time::interval(tick_interval);
    let mut last_tick = Instant::now();

    loop {
        render_requests(app, &mut prompt);
        if app.flowcharts().all(Flowchart::is_idle) && !prompt.is_waiting() {
            break;
        }

        tokio::select! {
            _ = interval.tick() => {
                let now = Instant::now();
                app.tick_all(now.duration_since(last_tick).as_secs_f64());
                last_tick = now;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                answer(app, &mut prompt, line.trim())?;
                app.route();
            }
        }
    }

    app.stop_all();
    Ok(())
}

fn render_requests(app: &mut Application, prompt: &mut Prompt) {
    for (owner, request) in app.take_requests() {
        let ticket = request.ticket.map(|t| (owner.clone(), t));
        match request.kind {
            RequestKind::Say { character, text } => {
                match character {
                    Some(character) => println!("{}: {}", character, text),
                    None => println!("{}", text),
                }
                prompt.say = ticket;
            }
            RequestKind::MenuOption {
                text,
                target,
                interactable,
            } => {
                if interactable {
                    prompt.options.push((owner, target));
                    println!("  {}) {}", prompt.options.len(), text);
                } else {
                    println!("  -) {}", text);
                }
            }
            RequestKind::Custom { name, payload } => {
                println!("  [{}] {} (answer with a value)", name, payload);
                prompt.custom = ticket;
            }
        }
    }
}

fn answer(app: &mut Application, prompt: &mut Prompt, line: &str) -> Result<()> {
    if let Some((owner, ticket)) = prompt.say.take() {
        app.resume(&owner, ticket, Resume::Done);
        return Ok(());
    }

    if let Some((owner, ticket)) = prompt.custom.take() {
        let value = match serde_json::from_str::<Value>(line) {
            Ok(value) => value,
            Err(_) => Value::Str(line.to_string()),
        };
        app.resume(&owner, ticket, Resume::Value(value));
        return Ok(());
    }

    if !prompt.options.is_empty() {
        let choice = line
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| prompt.options.get(i).cloned());
        match choice {
            Some((owner, target)) => {
                prompt.options.clear();
                if let Some(flowchart) = app.flowchart_mut(&owner) {
                    flowchart.choose_option(&target)?;
                }
            }
            None => println!("  choose 1-{}", prompt.options.len()),
        }
    }
    Ok(())
}
