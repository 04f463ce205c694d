use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use polyglot_voice::api::ApiServer;
use polyglot_voice::artifact::SynthesisArtifact;
use polyglot_voice::pipeline::{Interaction, Outcome, Pipeline};
use polyglot_voice::voice::capture::{
    BlockingMicrophoneCapture, CaptureStrategy, FileBasedCapture, StreamingBufferCapture,
    measure_ambient,
};
use polyglot_voice::voice::{AudioPlayback, PLAYBACK_SAMPLE_RATE};
use polyglot_voice::{Config, Language, Session};

/// Polyglot - talk to a language model in your own language
#[derive(Parser)]
#[command(name = "polyglot", version, about)]
struct Cli {
    /// Config file (defaults to config.toml in the platform config directory)
    #[arg(long, global = true, env = "POLYGLOT_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Chat in the terminal
    Chat {
        /// Language you speak or type
        #[arg(short, long, default_value = "en")]
        input_language: Language,

        /// Language replies are spoken in
        #[arg(short, long, default_value = "en")]
        output_language: Language,

        /// Type messages or speak them
        #[arg(long, value_enum, default_value_t = InputMethod::Text)]
        input: InputMethod,

        /// How voice input is captured
        #[arg(long, value_enum, default_value_t = CaptureKind::Microphone)]
        capture: CaptureKind,

        /// With `--capture file`: use this WAV instead of recording
        #[arg(long)]
        audio_file: Option<PathBuf>,

        /// With `--capture file`: where the recording is written
        #[arg(long, default_value = "recording.wav")]
        record_to: PathBuf,

        /// Play each spoken reply
        #[arg(long)]
        play: bool,
    },
    /// Run the HTTP API
    Serve {
        /// Port to listen on (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },
    /// List supported languages
    Languages,
    /// Measure microphone background noise
    Calibrate,
    /// Test speaker output
    TestSpeaker,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum InputMethod {
    Text,
    Voice,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CaptureKind {
    Microphone,
    Streaming,
    File,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,polyglot_voice=info",
        1 => "info,polyglot_voice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
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
    match cli.command {
        Command::Languages => {
            for language in Language::ALL {
                println!("{:<4}{}", language.code(), language.name());
            }
            Ok(())
        }
        Command::TestSpeaker => test_speaker().await,
        Command::Calibrate => {
            let config = Config::load_from(cli.config.as_deref())?;
            calibrate(&config).await
        }
        Command::Serve { port } => {
            let config = Config::load_from(cli.config.as_deref())?;
            let pipeline = config.pipeline()?;
            ApiServer::new(pipeline, port.unwrap_or(config.server.port))
                .with_clip_limit(config.capture.phrase_limit)
                .run()
                .await?;
            Ok(())
        }
        Command::Chat {
            input_language,
            output_language,
            input,
            capture,
            audio_file,
            record_to,
            play,
        } => {
            let config = Config::load_from(cli.config.as_deref())?;
            let pipeline = config.pipeline()?;
            if input == InputMethod::Voice && !pipeline.has_transcriber() {
                anyhow::bail!("voice input needs a speech recognition API key");
            }

            let chat = Chat {
                pipeline,
                config,
                session: Session::new(input_language, output_language),
                input,
                capture,
                audio_file,
                record_to,
                play,
            };
            chat.run().await
        }
    }
}

/// Terminal chat loop
struct Chat {
    pipeline: Pipeline,
    config: Config,
    session: Session,
    input: InputMethod,
    capture: CaptureKind,
    audio_file: Option<PathBuf>,
    record_to: PathBuf,
    play: bool,
}

impl Chat {
    async fn run(mut self) -> anyhow::Result<()> {
        // Ctrl-C stops a streaming capture, or quits while idle
        let stop_tx = Arc::new(watch::Sender::new(false));
        let mut idle = stop_tx.subscribe();
        {
            let stop_tx = Arc::clone(&stop_tx);
            tokio::spawn(async move {
                while tokio::signal::ctrl_c().await.is_ok() {
                    stop_tx.send_replace(true);
                }
            });
        }

        println!(
            "Chatting {} -> {}. {}",
            self.session.input_language.name(),
            self.session.output_language.name(),
            match self.input {
                InputMethod::Text => "Type a message, or 'quit' to leave.",
                InputMethod::Voice => "Press Enter to speak, or type 'quit' to leave.",
            }
        );

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print_prompt(self.input).await?;

            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = idle.wait_for(|stopped| *stopped) => None,
            };
            let Some(line) = line else { break };
            if matches!(line.trim(), "quit" | "exit") {
                break;
            }

            stop_tx.send_replace(false);
            let interaction = match self.input {
                InputMethod::Text => self.pipeline.run_text(&mut self.session, &line).await,
                InputMethod::Voice => {
                    println!("Listening...");
                    let mut capture = self.capture_strategy(stop_tx.subscribe());
                    self.pipeline
                        .run_voice(&mut self.session, capture.as_mut(), &self.config.capture)
                        .await
                }
            };
            let interrupted = stop_tx.send_replace(false);

            self.present(interaction).await;
            if quits_on_interrupt(interrupted, self.input, self.capture) {
                break;
            }
        }

        println!("Goodbye!");
        Ok(())
    }

    fn capture_strategy(&self, stop: watch::Receiver<bool>) -> Box<dyn CaptureStrategy> {
        match self.capture {
            CaptureKind::Microphone => Box::new(BlockingMicrophoneCapture::new()),
            CaptureKind::Streaming => {
                Box::new(StreamingBufferCapture::microphone(&self.config.capture, stop))
            }
            CaptureKind::File => match &self.audio_file {
                Some(path) => Box::new(FileBasedCapture::from_file(path)),
                None => Box::new(FileBasedCapture::recording_to(&self.record_to)),
            },
        }
    }

    async fn present(&self, interaction: Interaction) {
        if let Some(message) = interaction.outcome.failure_message() {
            println!("error: {message}");
            return;
        }

        let Outcome::Presented(presentation) = interaction.outcome else {
            return;
        };

        if self.input == InputMethod::Voice {
            println!("You: {}", presentation.user_text);
        }
        println!("AI: {}", presentation.reply);
        for warning in presentation.warnings() {
            println!("warning: {warning}");
        }
        if let Some(path) = &presentation.artifact_path {
            println!("(audio saved to {})", path.display());
        }

        if self.play {
            if let Some(artifact) = presentation.artifact {
                if let Err(e) = play(artifact).await {
                    println!("warning: playback failed: {e}");
                }
            }
        }
    }
}

/// Whether a Ctrl-C seen during an interaction should end the chat
///
/// A streaming capture consumes Ctrl-C as its stop signal.
const fn quits_on_interrupt(interrupted: bool, input: InputMethod, capture: CaptureKind) -> bool {
    interrupted && !matches!((input, capture), (InputMethod::Voice, CaptureKind::Streaming))
}

async fn print_prompt(input: InputMethod) -> anyhow::Result<()> {
    let prompt = match input {
        InputMethod::Text => "> ",
        InputMethod::Voice => "[Enter] ",
    };
    let mut stdout = tokio::io::stdout();
    stdout.write_all(prompt.as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}

/// Play an artifact on the default output device
async fn play(artifact: SynthesisArtifact) -> anyhow::Result<()> {
    tokio::task::spawn_blocking(move || AudioPlayback::new()?.play_artifact(&artifact)).await??;
    Ok(())
}

/// Report the ambient noise floor and the speech threshold it implies
async fn calibrate(config: &Config) -> anyhow::Result<()> {
    println!(
        "Measuring background noise for {:.1} seconds, stay quiet...",
        config.capture.calibration.as_secs_f32()
    );

    let level = measure_ambient(&config.capture).await?;

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let meter_len = (level.energy * 100.0).min(50.0) as usize;
    let meter: String = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

    println!("Ambient RMS: {:.4} [{meter}]", level.energy);
    println!("Speech threshold: {:.4}", level.threshold);
    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let frequency = 440.0_f32;
    let duration_secs = 2.0_f32;
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let num_samples = (PLAYBACK_SAMPLE_RATE as f32 * duration_secs) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / PLAYBACK_SAMPLE_RATE as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples at {PLAYBACK_SAMPLE_RATE} Hz...", samples.len());

    tokio::task::spawn_blocking(move || AudioPlayback::new()?.play_samples(&samples)).await??;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");
    println!("  3. Try: pavucontrol (to check output levels)");

    Ok(())
}
