use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use crossbeam_channel::{RecvTimeoutError, Sender};
use dialoguer::Select;
use tracing_subscriber::EnvFilter;

use hark::assistant::{Assistant, Control, Interaction, SessionEnd};
use hark::config::{Config, Overrides};
use hark::dialogue::DialogueManager;
use hark::integrations::{RestCalendarClient, RestWeatherClient};
use hark::voice::{
    AudioSource, BackendKind, BlockSink, CaptureEvent, CpalSource, SpeechOutput, Worker,
    default_loader, samples_to_wav,
};

/// hark - offline voice command assistant
#[derive(Parser)]
#[command(name = "hark", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Config file (defaults to ~/.config/hark/config.toml)
    #[arg(long, env = "HARK_CONFIG")]
    config: Option<PathBuf>,

    /// Speech recognition model directory
    #[arg(long)]
    model: Option<PathBuf>,

    /// Input device name
    #[arg(long)]
    device: Option<String>,

    /// TTS backend preference, comma-separated (espeak, spd-say, console)
    #[arg(long, value_delimiter = ',')]
    tts: Option<Vec<String>>,

    /// Choose the TTS backend interactively
    #[arg(long)]
    pick_tts: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Handle one typed utterance without the microphone
    Ask {
        /// What you would have said
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
        /// Write the captured audio to a WAV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
    /// List voices of the selected TTS backend
    Voices,
    /// List audio input devices
    Devices,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,hark=info",
        1 => "info,hark=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            let startup = e
                .downcast_ref::<hark::Error>()
                .is_some_and(hark::Error::is_fatal_at_startup);
            if startup {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let overrides = Overrides {
        config_path: cli.config,
        model_path: cli.model,
        input_device: cli.device,
        tts_backends: cli.tts,
    };
    let mut config = Config::load(&overrides)?;

    if cli.pick_tts || config.tts.prompt {
        pick_backend(&mut config)?;
    }

    match cli.command {
        Some(Command::Ask { text }) => ask(&config, &text.join(" ")),
        Some(Command::TestMic { duration, output }) => {
            test_mic(&config, duration, output.as_deref())
        }
        Some(Command::TestTts { text }) => test_tts(&config, &text),
        Some(Command::Voices) => list_voices(&config),
        Some(Command::Devices) => list_devices(),
        None => listen(&config),
    }
}

/// Run the assistant until the user says goodbye or presses Ctrl-C
fn listen(config: &Config) -> anyhow::Result<()> {
    tracing::info!(
        model = %config.audio.model_path.display(),
        device = config.audio.input_device.as_deref().unwrap_or("default"),
        "starting hark"
    );

    let speech = Arc::new(select_speech(config)?);
    let dialogue = build_dialogue(config)?;

    let source = CpalSource::new(
        config.audio.input_device.clone(),
        config.audio.sample_rate,
        config.audio.block_size,
    );
    let worker = Worker::new(config.worker_config(), Box::new(source), default_loader());

    // Run the session on the main thread (cpal streams aren't Send)
    let assistant = Assistant::new(worker, dialogue, speech);
    spawn_interrupt_handler(assistant.control())?;

    match assistant.run()? {
        SessionEnd::ExitRequested => tracing::info!("goodbye"),
        SessionEnd::Interrupted => tracing::info!("interrupted"),
    }
    Ok(())
}

/// Forward Ctrl-C to the session loop
///
/// The signal listener gets its own thread and runtime so the blocking HTTP
/// clients never run inside an async context.
fn spawn_interrupt_handler(control: Sender<Control>) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    std::thread::Builder::new()
        .name("hark-signals".to_string())
        .spawn(move || {
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("received interrupt, shutting down");
                    let _ = control.send(Control::Interrupt);
                }
            });
        })?;

    Ok(())
}

fn select_speech(config: &Config) -> hark::Result<SpeechOutput> {
    SpeechOutput::select(&config.tts.backends, &config.speech_options())
}

fn build_dialogue(config: &Config) -> anyhow::Result<DialogueManager> {
    let mut dialogue =
        DialogueManager::new().with_default_location(config.weather.default_location.clone());

    if let Some(url) = &config.weather.base_url {
        tracing::debug!(url = %url, "weather service configured");
        dialogue = dialogue.with_weather(Arc::new(RestWeatherClient::new(url.clone())?));
    }
    if let Some(url) = &config.calendar.base_url {
        tracing::debug!(url = %url, "calendar service configured");
        dialogue = dialogue.with_calendar(Arc::new(RestCalendarClient::new(url.clone())?));
    }

    Ok(dialogue)
}

/// Ask which backend to try first
fn pick_backend(config: &mut Config) -> anyhow::Result<()> {
    if !std::io::stdin().is_terminal() {
        tracing::debug!("stdin is not a terminal, keeping configured TTS order");
        return Ok(());
    }

    let labels: Vec<&str> = BackendKind::ALL.iter().map(|b| b.as_str()).collect();
    let default = config
        .tts
        .backends
        .first()
        .and_then(|first| BackendKind::ALL.iter().position(|b| b == first))
        .unwrap_or(0);

    let idx = Select::new()
        .with_prompt("Select a TTS backend")
        .items(&labels)
        .default(default)
        .interact()?;

    let chosen = BackendKind::ALL[idx];
    config.tts.backends.retain(|b| *b != chosen);
    config.tts.backends.insert(0, chosen);
    tracing::info!(backends = ?config.tts.backends, "TTS preference updated");
    Ok(())
}

/// Handle one typed utterance
fn ask(config: &Config, text: &str) -> anyhow::Result<()> {
    let speech = Arc::new(select_speech(config)?);
    let dialogue = build_dialogue(config)?;
    let (control, _control_rx) = crossbeam_channel::unbounded();

    let interaction = Interaction::new(dialogue, speech, control);
    match interaction.handle(text) {
        Some(turn) => {
            println!("intent:   {}", turn.intent.name);
            for (key, value) in &turn.intent.slots {
                println!("slot:     {key} = {value:?}");
            }
            println!("response: {}", turn.response);
        }
        None => println!("Nothing to do (empty input)"),
    }
    Ok(())
}

/// Test microphone input
fn test_mic(config: &Config, duration: u64, output: Option<&Path>) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut source = CpalSource::new(
        config.audio.input_device.clone(),
        config.audio.sample_rate,
        config.audio.block_size,
    );
    let (sink, blocks) = BlockSink::channel();
    let stream = source.open(sink)?;

    println!("Sample rate: {} Hz", source.sample_rate());
    println!("---");

    let started = Instant::now();
    let deadline = started + Duration::from_secs(duration);
    let mut recorded: Vec<i16> = Vec::new();

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }

        match blocks.recv_timeout(remaining) {
            Ok(CaptureEvent::Block(block)) => {
                let rms = block.rms();
                let samples = block.samples();
                let peak = samples.iter().map(|s| s.unsigned_abs()).max().unwrap_or(0);

                // Visual meter
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let meter_len = (rms * 100.0).min(50.0) as usize;
                let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

                println!(
                    "[{:5.1}s] RMS: {:.4} | Peak: {:5} | [{}]",
                    started.elapsed().as_secs_f32(),
                    rms,
                    peak,
                    meter
                );

                if output.is_some() {
                    recorded.extend_from_slice(&samples);
                }
            }
            Ok(CaptureEvent::DeviceLost(reason)) => {
                println!("Input device lost: {reason}");
                break;
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
        }
    }

    stream.close()?;

    if let Some(path) = output {
        let wav = samples_to_wav(&recorded, source.sample_rate())?;
        std::fs::write(path, wav)?;
        println!("\nWrote {} samples to {}", recorded.len(), path.display());
    }

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: hark devices (to list inputs)");
    println!("  3. Run: pactl info | grep 'Default Source'");
    println!("  4. Try: pavucontrol (to check levels)");

    Ok(())
}

/// Test TTS output
fn test_tts(config: &Config, text: &str) -> anyhow::Result<()> {
    let speech = select_speech(config)?;
    println!("Speaking with {}: {text}", speech.backend_name());
    speech.try_speak(text)?;
    Ok(())
}

fn list_voices(config: &Config) -> anyhow::Result<()> {
    let speech = select_speech(config)?;
    let voices = speech.voices();

    println!("Backend: {}", speech.backend_name());
    if voices.is_empty() {
        println!("(backend does not report voices)");
    }
    for voice in voices {
        println!("{:<24} {:<32} {}", voice.id, voice.name, voice.languages.join(","));
    }
    Ok(())
}

fn list_devices() -> anyhow::Result<()> {
    let devices = CpalSource::list_input_devices()?;
    if devices.is_empty() {
        println!("No input devices found");
    }
    for name in devices {
        println!("{name}");
    }
    Ok(())
}
