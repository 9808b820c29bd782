use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use clip_thumbnailer::{
    BackendKind, BunnyConfig, DeliveryConfig, ErrorKind, FfmpegBackend, FfmpegLogLevel, Margin,
    ModelHandle, OverlaySpec, ProgressCallback, ProgressInfo, Prompt, RemoteModelConfig,
    RemoteModelLoader, ResizePolicy, S3Config, SampleSpec, Stage, TargetGeometry, ThumbnailError,
    ThumbnailRequest, Thumbnailer, ThumbnailerConfig, TitleFont, VideoSource, sample_timestamps,
};

const CLI_AFTER_HELP: &str = "Examples:\n  clip-thumbnailer generate match.mp4 --prompt \"a goal being scored\" --title \"Final\"\n  clip-thumbnailer generate talk.mp4 --time 00:01:30 --width 1280 --height 720 --out thumb.jpg\n  clip-thumbnailer plan match.mp4 --samples 8 --json\n  clip-thumbnailer completions zsh > _clip-thumbnailer";

#[derive(Debug, Parser)]
#[command(
    name = "clip-thumbnailer",
    version,
    about = "Pick the best frame of a video for a prompt and render an exact-size thumbnail",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args, Clone, Default)]
struct GlobalOptions {
    /// Show debug logging.
    #[arg(long, global = true)]
    verbose: bool,

    /// Show a progress bar while sampling frames.
    #[arg(long, global = true)]
    progress: bool,

    /// FFmpeg log level (quiet, fatal, error, warning, info, debug).
    #[arg(long, global = true)]
    log_level: Option<FfmpegLogLevel>,

    /// Maximum number of concurrent decode jobs (defaults to CPU count).
    #[arg(long, global = true)]
    threads: Option<usize>,
}

/// Where the similarity model lives.
#[derive(Debug, Args, Clone, Default)]
struct ModelOptions {
    /// Base URL of the CLIP embedding service.
    #[arg(long, env = "CLIP_ENDPOINT")]
    clip_endpoint: Option<String>,

    /// Model identifier requested from the embedding service.
    #[arg(long, env = "CLIP_MODEL")]
    clip_model: Option<String>,
}

/// Where finished thumbnails go.
#[derive(Debug, Args, Clone)]
struct DeliveryOptions {
    /// Delivery backend: auto, local, bunny or s3.
    #[arg(long = "backend", env = "UPLOAD_BACKEND", default_value = "auto")]
    backend: BackendKind,

    /// Root directory for local delivery.
    #[arg(long, env = "THUMB_LOCAL_ROOT", default_value = clip_thumbnailer::delivery::DEFAULT_LOCAL_ROOT)]
    local_root: PathBuf,

    /// Bunny Storage zone.
    #[arg(long, env = "BUNNY_STORAGE_ZONE")]
    bunny_zone: Option<String>,

    /// Bunny Storage access key.
    #[arg(long, env = "BUNNY_ACCESS_KEY", hide_env_values = true)]
    bunny_access_key: Option<String>,

    /// Bunny Storage regional host.
    #[arg(long, env = "BUNNY_STORAGE_REGION_HOST")]
    bunny_host: Option<String>,

    /// Public CDN base URL for Bunny or S3 references.
    #[arg(long, env = "BUNNY_CDN_BASE_URL")]
    bunny_cdn_base_url: Option<String>,

    /// S3 bucket.
    #[arg(long, env = "THUMB_S3_BUCKET")]
    s3_bucket: Option<String>,

    /// S3 region.
    #[arg(long, env = "THUMB_S3_REGION", default_value = clip_thumbnailer::delivery::DEFAULT_S3_REGION)]
    s3_region: String,

    /// Endpoint of an S3-compatible store (MinIO, R2).
    #[arg(long, env = "THUMB_S3_ENDPOINT")]
    s3_endpoint: Option<String>,

    /// AWS access key id.
    #[arg(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    aws_access_key_id: Option<String>,

    /// AWS secret access key.
    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    aws_secret_access_key: Option<String>,
}

/// Rendering settings shared by `generate` and `serve`.
#[derive(Debug, Args, Clone)]
struct RenderOptions {
    /// TrueType font for title overlays.
    #[arg(long, env = "THUMB_FONT")]
    font: Option<PathBuf>,

    /// Letterbox instead of cropping.
    #[arg(long)]
    contain: bool,

    /// JPEG quality (1-100).
    #[arg(long, default_value_t = clip_thumbnailer::output::DEFAULT_JPEG_QUALITY)]
    quality: u8,

    /// Per-request time budget in seconds.
    #[arg(long, default_value_t = 60)]
    timeout: u64,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Render a thumbnail and deliver it (or write it with --out).
    #[command(
        about = "Generate a thumbnail",
        after_help = "Examples:\n  clip-thumbnailer generate input.mp4 --prompt \"a red car\" --samples 16\n  clip-thumbnailer generate input.mp4 --auto --title \"Episode 4\"\n  clip-thumbnailer generate input.mp4 --time 12.5 --out thumb.jpg --json"
    )]
    Generate {
        /// Input video path or URL.
        input: String,
        /// Describe the wanted frame; repeat for several phrasings.
        #[arg(long)]
        prompt: Vec<String>,
        /// Score against generic "best frame" phrasings.
        #[arg(long, conflicts_with = "prompt")]
        auto: bool,
        /// Explicit timestamp (seconds, MM:SS or HH:MM:SS); skips scoring.
        #[arg(long)]
        time: Option<String>,
        /// Title drawn in a bar at the bottom.
        #[arg(long)]
        title: Option<String>,
        /// Output width (give together with --height).
        #[arg(long)]
        width: Option<u32>,
        /// Output height (give together with --width).
        #[arg(long)]
        height: Option<u32>,
        /// Number of candidate frames.
        #[arg(long)]
        samples: Option<usize>,
        /// Delivery key prefix.
        #[arg(long)]
        key_prefix: Option<String>,
        /// Write the JPEG here instead of delivering it.
        #[arg(long)]
        out: Option<PathBuf>,
        /// Print machine-readable JSON.
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        render: RenderOptions,
        #[command(flatten)]
        model: ModelOptions,
        #[command(flatten)]
        delivery: DeliveryOptions,
    },

    /// Print probe metadata for a video.
    #[command(about = "Print video metadata", visible_alias = "info")]
    Probe {
        /// Input video path or URL.
        input: String,
        /// Print machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the candidate timestamps that would be sampled.
    #[command(about = "Show the sampling plan")]
    Plan {
        /// Input video path or URL.
        input: String,
        /// Number of candidate frames.
        #[arg(long, default_value_t = clip_thumbnailer::DEFAULT_SAMPLE_COUNT)]
        samples: usize,
        /// Excluded leading and trailing span as a fraction of the duration,
        /// instead of the default max(0.5 s, 2 %).
        #[arg(long)]
        margin: Option<f64>,
        /// Print machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Run the HTTP service.
    #[cfg(feature = "server")]
    #[command(about = "Serve the HTTP API")]
    Serve {
        /// Address to listen on.
        #[arg(long, env = "THUMB_BIND", default_value = "0.0.0.0:8000")]
        bind: std::net::SocketAddr,
        #[command(flatten)]
        render: RenderOptions,
        #[command(flatten)]
        model: ModelOptions,
        #[command(flatten)]
        delivery: DeliveryOptions,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

fn parse_timecode(value: &str) -> Result<f64, Box<dyn std::error::Error>> {
    let trimmed = value.trim();
    if let Ok(seconds) = trimmed.parse::<f64>() {
        return Ok(seconds);
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return Err(format!("invalid time format: {trimmed}").into());
    }

    let (hours, minutes, seconds_str) = if parts.len() == 3 {
        (parts[0].parse::<u64>()?, parts[1].parse::<u64>()?, parts[2])
    } else {
        (0_u64, parts[0].parse::<u64>()?, parts[1])
    };

    let seconds = seconds_str.parse::<f64>()?;
    Ok((hours as f64 * 3600.0) + (minutes as f64 * 60.0) + seconds)
}

fn init_logging(verbose: bool) {
    let default_directive = if verbose {
        "warn,clip_thumbnailer=debug"
    } else {
        "warn,clip_thumbnailer=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .init();
}

fn warn(message: impl AsRef<str>) {
    eprintln!("{} {}", "warning:".yellow().bold(), message.as_ref().yellow());
}

fn model_handle(options: &ModelOptions) -> ModelHandle {
    match &options.clip_endpoint {
        Some(endpoint) => {
            let mut config = RemoteModelConfig::new(endpoint);
            if let Some(model) = &options.clip_model {
                config = config.with_model(model);
            }
            ModelHandle::new(Arc::new(RemoteModelLoader::new(config)))
        }
        None => ModelHandle::disabled(),
    }
}

fn delivery_config(options: &DeliveryOptions) -> DeliveryConfig {
    let mut config = DeliveryConfig::new()
        .with_backend(options.backend)
        .with_local_root(&options.local_root);
    if let (Some(zone), Some(key)) = (&options.bunny_zone, &options.bunny_access_key) {
        let mut bunny = BunnyConfig::new(zone, key);
        if let Some(host) = &options.bunny_host {
            bunny = bunny.with_region_host(host);
        }
        if let Some(base_url) = &options.bunny_cdn_base_url {
            bunny = bunny.with_cdn_base_url(base_url);
        }
        config = config.with_bunny(bunny);
    }
    if let Some(bucket) = &options.s3_bucket {
        let mut s3 = S3Config::new(bucket).with_region(&options.s3_region).with_credentials(
            options.aws_access_key_id.as_deref().unwrap_or_default(),
            options.aws_secret_access_key.as_deref().unwrap_or_default(),
        );
        if let Some(endpoint) = &options.s3_endpoint {
            s3 = s3.with_endpoint_url(endpoint);
        }
        if let Some(base_url) = &options.bunny_cdn_base_url {
            s3 = s3.with_cdn_base_url(base_url);
        }
        config = config.with_s3(s3);
    }
    config
}

fn frame_request(
    source: VideoSource,
    time: Option<&str>,
    prompt: Option<Prompt>,
    geometry: TargetGeometry,
) -> Result<ThumbnailRequest, Box<dyn std::error::Error>> {
    match (time, prompt) {
        (Some(time), prompt) => {
            if prompt.is_some() {
                warn("both --time and a prompt were given; using --time");
            }
            Ok(ThumbnailRequest::at_timestamp(source, parse_timecode(time)?, geometry)?)
        }
        (None, Some(prompt)) => Ok(ThumbnailRequest::from_prompt(source, prompt, geometry)),
        (None, None) => Err(Box::new(ThumbnailError::InvalidRequest(
            "one of --time, --prompt or --auto is required".to_string(),
        ))),
    }
}

fn load_font(path: Option<&Path>) -> Result<Option<TitleFont>, ThumbnailError> {
    match path {
        Some(path) => TitleFont::from_file(path).map(Some),
        None => Ok(TitleFont::system_default()),
    }
}

fn thumbnailer_config(
    global: &GlobalOptions,
    render: &RenderOptions,
    needs_font: bool,
) -> Result<ThumbnailerConfig, Box<dyn std::error::Error>> {
    let mut config = ThumbnailerConfig::new()
        .with_jpeg_quality(render.quality)
        .with_request_timeout(Duration::from_secs(render.timeout));
    if render.contain {
        config = config.with_resize_policy(ResizePolicy::Contain {
            background: image::Rgb([0, 0, 0]),
        });
    }
    if let Some(threads) = global.threads {
        config = config.with_worker_threads(threads);
    }
    if needs_font {
        match load_font(render.font.as_deref())? {
            Some(font) => config = config.with_font(font),
            None => warn("no title font found; titles will render as a bare bar (set THUMB_FONT)"),
        }
    }
    if global.progress {
        config = config.with_progress(Arc::new(TerminalProgress::new()));
    }
    Ok(config)
}

struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        if let Ok(style) =
            ProgressStyle::with_template("{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("##-"));
        }
        Self { bar }
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        match info.stage {
            Stage::Sampling => {
                if let Some(total) = info.total {
                    self.bar.set_length(total);
                }
                self.bar.set_position(info.current);
                if let Some(timestamp) = info.timestamp {
                    self.bar.set_message(format!("sampled {timestamp:.2}s"));
                }
            }
            Stage::Scoring => self.bar.set_message("scored"),
            Stage::Compositing => self.bar.set_message("composited"),
            Stage::Delivery => self.bar.finish_with_message("delivered"),
            _ => {}
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(level) = cli.global.log_level {
        clip_thumbnailer::set_ffmpeg_log_level(level);
    }
    let backend = Arc::new(FfmpegBackend::new());

    match cli.command {
        Commands::Generate {
            input,
            prompt,
            auto,
            time,
            title,
            width,
            height,
            samples,
            key_prefix,
            out,
            json,
            render,
            model,
            delivery,
        } => {
            let geometry = TargetGeometry::from_optional(width, height)?;
            let source = VideoSource::parse(&input);
            let prompt = if auto {
                Some(Prompt::default_phrases())
            } else {
                Prompt::from_phrases(prompt)
            };

            let mut request = frame_request(source, time.as_deref(), prompt, geometry)?;
            if let Some(samples) = samples {
                request = request.with_sample_count(samples)?;
            }
            if let Some(title) = &title {
                request = request.with_overlay(OverlaySpec::new(title));
            }
            if let Some(prefix) = key_prefix {
                request = request.with_key_prefix(prefix);
            }

            let config = thumbnailer_config(&cli.global, &render, title.is_some())?;
            let thumbnailer = Thumbnailer::new(
                backend,
                Arc::new(model_handle(&model)),
                delivery_config(&delivery).build()?,
                config,
            );

            if let Some(out) = out {
                let rendered = thumbnailer.render(&request).await?;
                tokio::fs::write(&out, &rendered.image.bytes).await?;
                if json {
                    let payload = json!({
                        "path": out.display().to_string(),
                        "width": rendered.image.width,
                        "height": rendered.image.height,
                        "timestamp": rendered.timestamp,
                        "score": rendered.score,
                        "candidates": rendered.scores,
                    });
                    println!("{}", serde_json::to_string_pretty(&payload)?);
                } else {
                    println!(
                        "{} {} ({}x{}, frame at {:.2}s)",
                        "wrote".green().bold(),
                        out.display(),
                        rendered.image.width,
                        rendered.image.height,
                        rendered.timestamp
                    );
                    if cli.global.verbose {
                        for entry in &rendered.scores {
                            println!("  {:>8.2}s  {:.4}", entry.timestamp, entry.score);
                        }
                    }
                }
            } else {
                let generated = thumbnailer.generate(&request).await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&generated)?);
                } else {
                    println!(
                        "{} {} ({}x{}, frame at {:.2}s)",
                        "delivered".green().bold(),
                        generated.reference,
                        generated.width,
                        generated.height,
                        generated.timestamp
                    );
                }
            }
        }
        Commands::Probe { input, json } => {
            let info = clip_thumbnailer::probe(backend.as_ref(), &VideoSource::parse(&input))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("Duration: {:.3}s", info.duration_seconds);
                if !info.duration_known {
                    warn("container reports no duration");
                }
                println!(
                    "Video: {}x{} @ {:.2} fps [{}]",
                    info.width, info.height, info.frames_per_second, info.codec
                );
            }
        }
        Commands::Plan {
            input,
            samples,
            margin,
            json,
        } => {
            let info = clip_thumbnailer::probe(backend.as_ref(), &VideoSource::parse(&input))?;
            let mut spec = SampleSpec::new(samples);
            if let Some(fraction) = margin {
                spec = spec.with_margins(Margin::Fraction(fraction), Margin::Fraction(fraction));
            }
            let timestamps = sample_timestamps(info.duration_seconds, &spec);
            if json {
                let payload = json!({
                    "duration_seconds": info.duration_seconds,
                    "interval": spec.interval(info.duration_seconds),
                    "timestamps": timestamps,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                for (index, timestamp) in timestamps.iter().enumerate() {
                    println!("{:>3}  {:.3}s", index + 1, timestamp);
                }
            }
        }
        #[cfg(feature = "server")]
        Commands::Serve {
            bind,
            render,
            model,
            delivery,
        } => {
            let config = thumbnailer_config(&cli.global, &render, true)?;
            let delivery_backend = delivery_config(&delivery).build()?;
            let static_root = (delivery_backend.name() == "local").then(|| delivery.local_root.clone());
            let thumbnailer = Arc::new(Thumbnailer::new(
                backend,
                Arc::new(model_handle(&model)),
                delivery_backend,
                config,
            ));
            let state = clip_thumbnailer::ServerState::new(thumbnailer, static_root);
            clip_thumbnailer::serve(bind, state).await?;
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "clip-thumbnailer", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn exit_code(error: &(dyn std::error::Error + 'static)) -> i32 {
    match error.downcast_ref::<ThumbnailError>().map(ThumbnailError::kind) {
        Some(ErrorKind::InvalidRequest) => 2,
        Some(ErrorKind::Media) => 3,
        Some(ErrorKind::ScoringUnavailable) => 4,
        Some(ErrorKind::Delivery) => 5,
        Some(ErrorKind::Timeout) => 6,
        Some(ErrorKind::Internal) | None => 1,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    if let Err(error) = run(cli).await {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(exit_code(error.as_ref()));
    }
}
