//! `rival-cli` – the `rival` binary
//!
//! 1. Loads `.env`, then `~/.rivalbot/config.toml` (written with defaults on
//!    first run) and the `RIVAL_*` overrides.
//! 2. Installs tracing before the Tokio runtime exists.
//! 3. Wires the engine to the robot (or a recording gateway with
//!    `--dry-run`), the game service, the language model and the chosen
//!    speech input.
//! 4. Intercepts **Ctrl-C**: the first press stops both loops, a second one
//!    exits immediately.

mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use rival_middleware::{ActuatorGateway, RecordingGateway, WampGateway};
use rival_perception::UtteranceSource;
use rival_runtime::{
    Collaborators, Dice, Engine, HttpGameClient, LlmResponseGenerator, OpenAiChat, Shutdown,
    init_tracing,
};
use rival_types::RivalError;
use tracing::{error, info, warn};

use crate::config::{Config, InputMode, Loaded};

#[derive(Debug, Parser)]
#[command(name = "rival", version, about = "Reactive trash-talking Connect-4 robot")]
struct Args {
    /// Config file (default `~/.rivalbot/config.toml`).
    #[arg(long, env = "RIVAL_CONFIG")]
    config: Option<PathBuf>,

    /// Record actuator commands instead of connecting to the robot.
    #[arg(long)]
    dry_run: bool,

    /// Seed for every random decision.
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> ExitCode {
    let dotenv = dotenvy::dotenv();
    let args = Args::parse();
    let _guard = init_tracing("rivalbot");
    if let Err(e) = dotenv
        && !e.not_found()
    {
        warn!(error = %e, "could not read .env");
    }

    print_banner();

    let path = args.config.clone().unwrap_or_else(config::config_path);
    let cfg = match config::load_or_init(&path) {
        Ok(Loaded::Existing(cfg)) => {
            println!("  Config loaded from {}", path.display().to_string().bold());
            cfg
        }
        Ok(Loaded::Created(cfg)) => {
            println!(
                "  {} Default config written to {}",
                "✓".green().bold(),
                path.display().to_string().bold()
            );
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            return ExitCode::FAILURE;
        }
    };
    info!(config = ?cfg, dry_run = args.dry_run, "configuration");

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Shutdown::new();
    let on_ctrlc = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        if on_ctrlc.is_triggered() {
            std::process::exit(130);
        }
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping the engine …".yellow().bold());
        on_ctrlc.trigger();
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler; stop the process with a signal");
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "could not start the async runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cfg, &args, shutdown)) {
        Ok(()) => {
            println!("{}", "  ✓ RivalBot stopped.".green());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "engine failed to start");
            println!("{}: {}", "Error".red(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cfg: Config, args: &Args, shutdown: Shutdown) -> Result<(), RivalError> {
    let gateway: Arc<dyn ActuatorGateway> = if args.dry_run {
        println!("  {}", "Dry run: actuator commands are only recorded.".dimmed());
        Arc::new(RecordingGateway::new())
    } else {
        if cfg.realm.is_empty() {
            return Err(RivalError::Config(
                "no robot realm configured; set `realm` or RIVAL_REALM, or pass --dry-run".into(),
            ));
        }
        Arc::new(WampGateway::connect(&cfg.wamp_url, &cfg.realm).await?)
    };

    if cfg.llm.api_key.is_empty() {
        warn!("no API key configured; the model chain may be rejected and scripted lines used");
    }
    let chat = OpenAiChat::new(cfg.llm.base_url.clone(), cfg.llm.api_key(), cfg.llm.max_tokens);
    let generator = Arc::new(LlmResponseGenerator::new(chat, cfg.llm.models.clone()));
    let game = Arc::new(HttpGameClient::new(cfg.game_url.clone()));
    let (input, _capture) = build_input(&cfg)?;

    let dice = args.seed.map(Dice::seeded).unwrap_or_else(Dice::from_entropy);
    let engine = Engine::new(cfg.engine.clone())
        .with_sounds(cfg.sounds.catalog())
        .with_dice(dice);

    println!(
        "  Watching {} – press {} to stop.\n",
        cfg.game_url.bold(),
        "Ctrl-C".bold().cyan()
    );
    engine
        .run(
            Collaborators {
                game,
                generator,
                input,
                gateway,
            },
            shutdown,
        )
        .await;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Speech input
// ─────────────────────────────────────────────────────────────────────────────

/// Keeps live capture running for as long as it is held.
#[cfg(feature = "microphone")]
type CaptureGuard = Option<rival_perception::MicrophoneCapture>;
#[cfg(not(feature = "microphone"))]
type CaptureGuard = ();

fn build_input(cfg: &Config) -> Result<(Box<dyn UtteranceSource>, CaptureGuard), RivalError> {
    match cfg.input.mode {
        InputMode::Console => {
            println!("  {}", "Type what the player says, one line at a time.".dimmed());
            let input: Box<dyn UtteranceSource> = Box::new(rival_perception::ConsoleInput::stdin());
            Ok((input, Default::default()))
        }
        InputMode::Microphone => microphone_input(cfg),
    }
}

#[cfg(feature = "microphone")]
fn microphone_input(cfg: &Config) -> Result<(Box<dyn UtteranceSource>, CaptureGuard), RivalError> {
    use rival_perception::{Listener, MicrophoneCapture, WhisperHttpTranscriber};

    let (capture, source) = MicrophoneCapture::start(cfg.input.segmenter)?;
    let stt_url = if cfg.stt.base_url.is_empty() {
        cfg.llm.base_url.clone()
    } else {
        cfg.stt.base_url.clone()
    };
    let transcriber =
        WhisperHttpTranscriber::new(stt_url, cfg.stt.model.clone(), cfg.llm.api_key());
    let listener: Box<dyn UtteranceSource> =
        Box::new(Listener::new(Box::new(source), cfg.input.gate, Arc::new(transcriber)));
    Ok((listener, Some(capture)))
}

#[cfg(not(feature = "microphone"))]
fn microphone_input(_: &Config) -> Result<(Box<dyn UtteranceSource>, CaptureGuard), RivalError> {
    Err(RivalError::Config(
        "microphone input needs a build with `--features microphone`".into(),
    ))
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   ___  _          _ ___      _   "#.bold().cyan());
    println!("{}", r#"  | _ \(_)_ ____ _| | _ ) ___| |_ "#.bold().cyan());
    println!("{}", r#"  |   /| \ V / _` | | _ \/ _ \  _|"#.bold().cyan());
    println!("{}", r#"  |_|_\|_|\_/\__,_|_|___/\___/\__|"#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "RivalBot".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Sore-winning Connect-4 opponent");
    println!();
}
