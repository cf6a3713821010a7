use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use promo_video::api::elevenlabs::ElevenLabsTts;
use promo_video::api::openai::OpenAiChat;
use promo_video::compositor::Compositor;
use promo_video::config::Config;
use promo_video::init;
use promo_video::platform;
use promo_video::script::{GeneratedScript, ScriptGenerator, ScriptRequest, ScriptStyle};
use promo_video::session::Session;
use promo_video::voice::{AudioTrack, VoiceSynthesizer};
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Product promo video generator: script, narration, and a composited video.
#[derive(Parser, Debug)]
#[command(name = "promo-video")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct ProductArgs {
    /// Product title
    #[arg(short, long)]
    title: String,

    /// Product feature; repeat for several
    #[arg(short, long = "feature")]
    features: Vec<String>,

    /// File with one feature per line
    #[arg(long)]
    features_file: Option<PathBuf>,

    /// Script style: review or demo
    #[arg(short, long, default_value_t = ScriptStyle::Review)]
    style: ScriptStyle,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check that ffmpeg and ffprobe are installed
    Doctor,

    /// Generate a narration script and print it
    Script {
        #[command(flatten)]
        product: ProductArgs,

        /// Also write the script to this file
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Turn a script file into narration audio
    Voiceover {
        /// Text file holding the script
        #[arg(long)]
        script_file: PathBuf,

        /// Copy the narration here as well
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Open the narration when done
        #[arg(long)]
        open: bool,
    },

    /// Composite images and clips over an existing narration track
    Compose {
        /// Narration audio file
        #[arg(short, long)]
        audio: PathBuf,

        /// Images (.jpg .jpeg .png) and videos (.mp4 .mov), in display order
        #[arg(required = true)]
        media: Vec<PathBuf>,

        /// Copy the final video here as well
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Open the video when done
        #[arg(long)]
        open: bool,
    },

    /// Script, narration and video in one go
    Run {
        #[command(flatten)]
        product: ProductArgs,

        /// Images (.jpg .jpeg .png) and videos (.mp4 .mov), in display order
        #[arg(required = true)]
        media: Vec<PathBuf>,

        /// Copy the final video here as well
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Open the video when done
        #[arg(long)]
        open: bool,
    },
}

async fn script_request(product: &ProductArgs) -> Result<ScriptRequest> {
    let mut features_text = product.features.join("\n");
    if let Some(path) = &product.features_file {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read features file: {}", path.display()))?;
        features_text.push('\n');
        features_text.push_str(&text);
    }
    Ok(ScriptRequest::from_form(&product.title, &features_text, product.style))
}

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")
}

async fn copy_out(produced: &Path, out: Option<&PathBuf>) -> Result<()> {
    if let Some(dest) = out {
        tokio::fs::copy(produced, dest)
            .await
            .with_context(|| format!("Failed to copy {} to {}", produced.display(), dest.display()))?;
        println!("{}", dest.display());
    }
    Ok(())
}

async fn require_ffmpeg() -> Result<()> {
    if !init::check_ffmpeg().await {
        anyhow::bail!("ffmpeg/ffprobe not found in PATH. Please install FFmpeg.");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("promo_video={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cfg = Config::load_or_default(&cli.config).await?;

    match cli.command {
        Commands::Doctor => {
            if init::check_ffmpeg().await {
                println!("ffmpeg and ffprobe found");
            } else {
                println!("ffmpeg and/or ffprobe missing from PATH");
            }
            println!(
                "OpenAI key: {}",
                if cfg.openai_key.is_empty() { "missing" } else { "set" }
            );
            println!(
                "ElevenLabs key: {}",
                if cfg.elevenlabs_key.is_empty() { "missing" } else { "set" }
            );
        }

        Commands::Script { product, out } => {
            let request = script_request(&product).await?;
            let generator = ScriptGenerator::new(Box::new(OpenAiChat::new(http_client()?, &cfg)?));
            let script = generator.generate(&request).await?;
            println!("{}", script.text);
            if let Some(path) = out {
                tokio::fs::write(&path, &script.text)
                    .await
                    .with_context(|| format!("Failed to write script: {}", path.display()))?;
            }
        }

        Commands::Voiceover { script_file, out, open } => {
            let text = tokio::fs::read_to_string(&script_file)
                .await
                .with_context(|| format!("Failed to read script: {}", script_file.display()))?;
            let synth = VoiceSynthesizer::new(Box::new(ElevenLabsTts::new(http_client()?, &cfg)?), &cfg);

            init::ensure_work_dir(&cfg.work_dir).await?;
            let mut session = Session::create(&cfg.work_dir, false).await?;
            session.set_script(GeneratedScript::new(text));
            let track = session.generate_voiceover(&synth).await?.clone();
            println!("{}", track.path.display());
            copy_out(&track.path, out.as_ref()).await?;
            if open {
                platform::preview(&track.path);
            }
            session.close().await?;
        }

        Commands::Compose { audio, media, out, open } => {
            require_ffmpeg().await?;
            init::ensure_work_dir(&cfg.work_dir).await?;
            let mut session = Session::create(&cfg.work_dir, cfg.purge_intermediates).await?;
            for path in &media {
                session.import_media(path).await?;
            }
            session.attach_audio(AudioTrack::new(audio));

            let video = session.render(&Compositor::new(cfg.clip_timing)).await?;
            println!("{}", video.path.display());
            copy_out(&video.path, out.as_ref()).await?;
            if open {
                platform::preview(&video.path);
            }
            session.close().await?;
        }

        Commands::Run { product, media, out, open } => {
            require_ffmpeg().await?;
            let request = script_request(&product).await?;
            let client = http_client()?;
            let generator = ScriptGenerator::new(Box::new(OpenAiChat::new(client.clone(), &cfg)?));
            let synth = VoiceSynthesizer::new(Box::new(ElevenLabsTts::new(client, &cfg)?), &cfg);

            init::ensure_work_dir(&cfg.work_dir).await?;
            let mut session = Session::create(&cfg.work_dir, cfg.purge_intermediates).await?;
            for path in &media {
                session.import_media(path).await?;
            }
            session.check_media().await?;

            let script = session.generate_script(&generator, &request).await?;
            println!("{}\n", script.text);
            session.generate_voiceover(&synth).await?;

            let video = session.render(&Compositor::new(cfg.clip_timing)).await?;
            println!("{}", video.path.display());
            copy_out(&video.path, out.as_ref()).await?;
            if open {
                platform::preview(&video.path);
            }
            session.close().await?;
        }
    }

    Ok(())
}
