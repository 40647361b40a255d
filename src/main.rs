use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use parley::config::{self, AudioBackend, LlmProvider};
use parley::voice::{
    CpalPlayer, calculate_rms, list_input_devices, list_output_devices, monitor_input,
};
use parley::{Backends, Config, SpeechSynthesisSink, TurnController, backends};

/// Parley - talk to a language model out loud
#[derive(Parser)]
#[command(name = "parley", version, about)]
struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(short, long, env = "PARLEY_CONFIG")]
    config: Option<PathBuf>,

    /// Generation model to use
    #[arg(short, long)]
    model: Option<String>,

    /// Synthesis voice (Piper model path or hosted voice name)
    #[arg(long)]
    voice: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output through the configured synthesizer and player
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
    /// List audio devices usable as `input_device` / `output_device`
    Devices,
    /// Show the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,parley=info",
        1 => "info,parley=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = &cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(&cli, *duration).await,
            Command::TestSpeaker => test_speaker(&cli).await,
            Command::TestTts { text } => test_tts(&cli, text).await,
            Command::Devices => list_devices(),
            Command::Config => show_config(&cli),
        };
    }

    let config = load_config(&cli)?;
    tracing::info!(
        provider = ?config.llm.provider,
        model = %config.llm.model_id,
        voice = %config.voice.voice_id,
        "starting parley"
    );

    let backends = Backends::from_config(&config)?;
    let mut controller = TurnController::new(&config, backends)?;

    println!("Listening. Say \"{}\" to stop.", config.turn.exit_phrases.join("\" or \""));

    controller
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    Ok(())
}

/// Resolve file and environment, apply CLI flags, then validate
fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let config = resolve_config(cli)?;
    config.validate()?;
    Ok(config)
}

fn resolve_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = Config::resolve(cli.config.as_deref())?;
    if let Some(model) = &cli.model {
        config.llm.model_id.clone_from(model);
    }
    if let Some(voice) = &cli.voice {
        config.voice.voice_id.clone_from(voice);
    }
    Ok(config)
}

/// Test microphone input
async fn test_mic(cli: &Cli, duration: u64) -> anyhow::Result<()> {
    let device = resolve_config(cli)?.voice.input_device;

    println!("Testing microphone for {duration} seconds...");
    println!("Device: {}", device.as_deref().unwrap_or("default"));
    println!("Speak into your microphone!\n");
    println!("Sample rate: {} Hz", parley::voice::SAMPLE_RATE);
    println!("---");

    tokio::task::spawn_blocking(move || {
        monitor_input(device.as_deref(), duration, |second, samples| {
            let energy = calculate_rms(samples);
            let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

            // Visual meter
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let meter_len = (energy * 100.0).min(50.0) as usize;
            let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

            println!("[{second:2}s] RMS: {energy:.4} | Peak: {peak:.4} | [{meter}]");
        })
    })
    .await??;

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: parley devices (to list devices)");
    println!("  4. Try: pavucontrol (to check levels)");

    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker(cli: &Cli) -> anyhow::Result<()> {
    let device = resolve_config(cli)?.voice.output_device;
    let player = CpalPlayer::new().with_device(device.clone());

    println!("Testing speaker output...");
    println!("Device: {}", device.as_deref().unwrap_or("default"));
    println!("You should hear a 440Hz tone for 2 seconds\n");

    // 2 seconds of 440Hz sine wave at 24kHz
    let sample_rate = 24000_u32;
    let frequency = 440.0_f32;
    let num_samples = sample_rate as usize * 2;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples at {} Hz...", samples.len(), sample_rate);

    tokio::task::spawn_blocking(move || player.play_samples_blocking(&samples, sample_rate))
        .await??;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");
    println!("  3. Try: pavucontrol (to check output levels)");

    Ok(())
}

/// Speak text through the configured synthesizer and player
async fn test_tts(cli: &Cli, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    // Only the voice side needs to be valid here
    let config = resolve_config(cli)?;
    let synthesizer = backends::synthesizer(&config)?;
    let player = backends::player(&config)?;

    let sink = SpeechSynthesisSink::new(synthesizer, player, &config.voice.artifact_dir)
        .with_timeout(config.voice.playback_timeout);

    println!("Synthesizing and playing...");
    sink.speak_text(text).await?;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}

/// Print the names cpal reports for each direction
fn list_devices() -> anyhow::Result<()> {
    println!("Input devices:");
    for name in list_input_devices()? {
        println!("  {name}");
    }
    println!();
    println!("Output devices:");
    for name in list_output_devices()? {
        println!("  {name}");
    }
    Ok(())
}

/// Print where configuration comes from and what it resolved to
fn show_config(cli: &Cli) -> anyhow::Result<()> {
    let path = cli.config.clone().or_else(config::file::config_file_path);
    let config = resolve_config(cli)?;

    match &path {
        Some(p) if p.exists() => println!("Config file: {}", p.display()),
        Some(p) => println!("Config file: {} (not found, using defaults)", p.display()),
        None => println!("Config file: none"),
    }
    println!();

    let provider = match config.llm.provider {
        LlmProvider::Ollama => "ollama",
        LlmProvider::OpenAi => "openai",
    };
    let backend = |b: AudioBackend| match b {
        AudioBackend::Native => "native",
        AudioBackend::Command => "command",
    };
    let key = |k: Option<&str>| {
        if k.is_some_and(|k| !k.is_empty()) {
            "set"
        } else {
            "unset"
        }
    };

    println!("[llm]");
    println!("provider = {provider}");
    println!("model = {}", config.llm.model_id);
    println!("base_url = {}", config.llm.base_url);
    println!("system_prompt = {}", config.llm.system_prompt.is_some());
    println!();
    println!("[voice]");
    println!("stt = {:?} ({})", config.voice.stt_provider, config.voice.stt_model);
    if let Some(url) = &config.voice.stt_base_url {
        println!("stt_base_url = {url}");
    }
    println!("tts = {:?} ({})", config.voice.tts_provider, config.voice.tts_model);
    println!("voice_id = {}", config.voice.voice_id);
    println!("recorder = {}", backend(config.voice.recorder));
    println!("player = {}", backend(config.voice.player));
    println!("input_device = {}", config.voice.input_device.as_deref().unwrap_or("default"));
    println!("output_device = {}", config.voice.output_device.as_deref().unwrap_or("default"));
    println!("capture_timeout = {:?}", config.voice.capture_timeout);
    println!("playback_timeout = {:?}", config.voice.playback_timeout);
    println!("energy_threshold = {}", config.voice.energy_threshold);
    println!("artifact_dir = {}", config.voice.artifact_dir.display());
    println!();
    println!("[pipeline]");
    println!("boundaries = {:?}", config.pipeline.boundaries.iter().collect::<String>());
    println!("queue_capacity = {}", config.pipeline.queue_capacity);
    println!();
    println!("[turn]");
    println!("exit_phrases = {:?}", config.turn.exit_phrases);
    println!("farewell = {:?}", config.turn.farewell);
    println!("max_device_failures = {}", config.turn.max_device_failures);
    println!();
    println!("[api_keys]");
    println!("openai = {}", key(config.api_keys.openai.as_deref()));
    println!("deepgram = {}", key(config.api_keys.deepgram.as_deref()));
    println!("elevenlabs = {}", key(config.api_keys.elevenlabs.as_deref()));

    if let Err(e) = config.validate() {
        println!("\nwarning: {e}");
    }

    Ok(())
}
