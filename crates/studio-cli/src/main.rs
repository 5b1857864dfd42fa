use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::json;
use studio_contracts::events::ProgressLog;
use studio_contracts::{
    AspectRatio, ColorGradingStyle, HistoryStore, JsonHistoryStore, LightingIntensity, QualityMode,
    StyleSettings,
};
use studio_engine::prompt::face_swap_prompt;
use studio_engine::{
    apply_adjustments, Adjustments, BatchEvent, BatchItem, DryrunBackend, GeminiBackend,
    GeneratedImage, GenerationBackend, GenerationOutcome, PortraitPrompt, PromptFactory,
    PromptSpec, SingleJob, SourceImage, Studio, StudioConfig,
};

#[derive(Debug, Parser)]
#[command(name = "studio-rs", version, about = "Cinema portrait studio CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Restyle one photo.
    Generate(GenerateArgs),
    /// Put the face from one photo onto another.
    Faceswap(FaceSwapArgs),
    /// Restyle several photos with the same settings.
    Batch(BatchArgs),
    /// Ask for changes to a previous result. Not saved to history.
    Refine(RefineArgs),
    /// Apply tonal adjustments locally; writes a PNG.
    Edit(EditArgs),
    #[command(subcommand)]
    History(HistoryCommand),
}

#[derive(Debug, Subcommand)]
enum HistoryCommand {
    List(HistoryListArgs),
    Delete(HistoryDeleteArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    Gemini,
    Dryrun,
}

#[derive(Debug, Args)]
struct RuntimeArgs {
    #[arg(long, value_enum, default_value = "gemini")]
    backend: BackendKind,
    /// Overrides STUDIO_HISTORY_DIR.
    #[arg(long)]
    history: Option<PathBuf>,
    /// Overrides STUDIO_IMAGE_MODEL.
    #[arg(long)]
    model: Option<String>,
}

#[derive(Debug, Args)]
struct StyleArgs {
    #[arg(long)]
    prompt: Option<String>,
    #[arg(long)]
    preset: Option<String>,
    #[arg(long, default_value = "auto")]
    aspect: AspectRatio,
    #[arg(long, value_parser = parse_lighting, default_value = "cinematic")]
    lighting: LightingIntensity,
    #[arg(long, value_parser = parse_grading, default_value = "teal_orange")]
    grading: ColorGradingStyle,
    #[arg(long, value_parser = parse_quality, default_value = "high")]
    quality: QualityMode,
    #[arg(long, default_value_t = 75, value_parser = clap::value_parser!(u8).range(0..=100))]
    face_detail: u8,
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u8).range(0..=100))]
    creativity: u8,
    #[arg(long)]
    no_skin_texture: bool,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    out: PathBuf,
    #[command(flatten)]
    style: StyleArgs,
    #[command(flatten)]
    runtime: RuntimeArgs,
}

#[derive(Debug, Parser)]
struct FaceSwapArgs {
    #[arg(long)]
    target: PathBuf,
    #[arg(long)]
    face: PathBuf,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    prompt: Option<String>,
    #[arg(long, default_value = "auto")]
    aspect: AspectRatio,
    #[arg(long, value_parser = parse_quality, default_value = "high")]
    quality: QualityMode,
    #[command(flatten)]
    runtime: RuntimeArgs,
}

#[derive(Debug, Parser)]
struct BatchArgs {
    #[arg(long = "image", required = true)]
    images: Vec<PathBuf>,
    #[arg(long)]
    out: PathBuf,
    /// JSONL progress log; defaults to `<out>/events.jsonl`.
    #[arg(long)]
    events: Option<PathBuf>,
    #[command(flatten)]
    style: StyleArgs,
    #[command(flatten)]
    runtime: RuntimeArgs,
}

#[derive(Debug, Parser)]
struct RefineArgs {
    /// Previously generated image.
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    text: String,
    #[arg(long)]
    out: PathBuf,
    #[arg(long, default_value = "auto")]
    aspect: AspectRatio,
    #[command(flatten)]
    runtime: RuntimeArgs,
}

#[derive(Debug, Parser)]
struct EditArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    out: PathBuf,
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u16).range(0..=200))]
    brightness: u16,
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u16).range(0..=200))]
    contrast: u16,
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u16).range(0..=200))]
    saturation: u16,
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=100))]
    sepia: u8,
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=10))]
    blur: u8,
}

impl EditArgs {
    fn adjustments(&self) -> Adjustments {
        Adjustments {
            brightness: self.brightness,
            contrast: self.contrast,
            saturation: self.saturation,
            sepia: self.sepia,
            blur: self.blur,
        }
    }
}

#[derive(Debug, Parser)]
struct HistoryListArgs {
    #[arg(long)]
    history: Option<PathBuf>,
    #[arg(long, default_value_t = 0)]
    offset: usize,
    #[arg(long, default_value_t = 10)]
    limit: usize,
}

#[derive(Debug, Parser)]
struct HistoryDeleteArgs {
    id: String,
    #[arg(long)]
    history: Option<PathBuf>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("studio-rs error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = StudioConfig::from_env();
    match cli.command {
        Command::Generate(args) => run_generate(&config, args),
        Command::Faceswap(args) => run_faceswap(&config, args),
        Command::Batch(args) => run_batch(&config, args),
        Command::Refine(args) => run_refine(&config, args),
        Command::Edit(args) => run_edit(args),
        Command::History(HistoryCommand::List(args)) => run_history_list(&config, args),
        Command::History(HistoryCommand::Delete(args)) => run_history_delete(&config, args),
    }
}

fn run_generate(config: &StudioConfig, args: GenerateArgs) -> Result<i32> {
    let mut studio = open_studio(config, &args.runtime)?;
    let source = SourceImage::from_path(&args.image)?;
    let job = SingleJob::new(source, portrait_prompt(&args.style).prompt_spec());
    let outcome = studio.generate(&job);
    finish_single(outcome, &args.out, "portrait")
}

fn run_faceswap(config: &StudioConfig, args: FaceSwapArgs) -> Result<i32> {
    let mut studio = open_studio(config, &args.runtime)?;
    let target = SourceImage::from_path(&args.target)?;
    let face = SourceImage::from_path(&args.face)?;
    let prompt =
        PromptSpec::new(face_swap_prompt(args.prompt.as_deref(), args.quality), args.aspect);
    let outcome = studio.generate(&SingleJob::face_swap(target, face, prompt));
    finish_single(outcome, &args.out, "faceswap")
}

fn run_batch(config: &StudioConfig, args: BatchArgs) -> Result<i32> {
    fs::create_dir_all(&args.out)
        .with_context(|| format!("failed creating {}", args.out.display()))?;
    let events_path = args
        .events
        .clone()
        .unwrap_or_else(|| args.out.join("events.jsonl"));
    let session_id = args
        .out
        .file_name()
        .and_then(|value| value.to_str())
        .filter(|value| !value.is_empty())
        .unwrap_or("batch-rs")
        .to_string();
    let mut studio = open_studio(config, &args.runtime)?
        .with_progress_log(ProgressLog::new(events_path, session_id));

    let sources = args
        .images
        .iter()
        .map(|path| SourceImage::from_path(path))
        .collect::<Result<Vec<_>>>()?;
    let mut items = BatchItem::from_sources(sources);
    let prompt = portrait_prompt(&args.style);

    let report = studio.run_batch(&mut items, &prompt, &mut |event: &BatchEvent| match event {
        BatchEvent::ItemStarted { current, total, .. } => {
            log::info!("processing {current}/{total}");
        }
        BatchEvent::ItemFinished {
            item_id,
            status,
            error_kind,
            ..
        } => match error_kind {
            Some(kind) => log::warn!("{item_id}: {status} ({kind})"),
            None => log::info!("{item_id}: {status}"),
        },
        BatchEvent::Completed { .. } => {}
    });

    for item in &items {
        if let Some(image) = item.result() {
            let path = write_image(&args.out, item.id(), image)?;
            println!("{}\t{}", item.id(), path.display());
        } else if let Some(failure) = item.failure() {
            println!("{}\terror\t{}", item.id(), failure.user_message());
        }
    }
    println!(
        "{}",
        json!({
            "total": report.total,
            "succeeded": report.succeeded,
            "failed": report.failed,
            "skipped": report.skipped,
            "preview_item_id": report.preview_item_id,
        })
    );
    Ok(if report.failed > 0 && report.succeeded == 0 { 1 } else { 0 })
}

fn run_refine(config: &StudioConfig, args: RefineArgs) -> Result<i32> {
    if args.text.trim().is_empty() {
        bail!("--text must not be blank");
    }
    let mut studio = open_studio(config, &args.runtime)?;
    let previous = SourceImage::from_path(&args.image)?;
    let previous = GeneratedImage {
        bytes: previous.bytes,
        mime_type: previous.mime_type,
    };
    let outcome = studio.refine(&previous, args.text.trim(), args.aspect);
    finish_single(outcome, &args.out, "refined")
}

fn run_edit(args: EditArgs) -> Result<i32> {
    let source = SourceImage::from_path(&args.image)?;
    let source = GeneratedImage {
        bytes: source.bytes,
        mime_type: source.mime_type,
    };
    let adjusted = apply_adjustments(&source, &args.adjustments())
        .with_context(|| format!("failed adjusting {}", args.image.display()))?;
    let path = write_image(&args.out, "edited", &adjusted)?;
    println!("{}", path.display());
    Ok(0)
}

fn run_history_list(config: &StudioConfig, args: HistoryListArgs) -> Result<i32> {
    let root = args.history.unwrap_or_else(|| config.history_dir.clone());
    let mut store = JsonHistoryStore::new(root);
    let total = store.count()?;
    for entry in store.list(args.offset, args.limit)? {
        println!(
            "{}",
            json!({
                "id": entry.id,
                "timestamp": entry.timestamp,
                "mode": entry.mode,
                "aspect_ratio": entry.aspect_ratio,
                "mime_type": entry.mime_type,
                "bytes": entry.image_bytes.len(),
                "prompt": entry.prompt,
            })
        );
    }
    log::info!("{total} history entries");
    Ok(0)
}

fn run_history_delete(config: &StudioConfig, args: HistoryDeleteArgs) -> Result<i32> {
    let root = args.history.unwrap_or_else(|| config.history_dir.clone());
    let mut store = JsonHistoryStore::new(root);
    store.delete(&args.id)?;
    println!("deleted {}", args.id);
    Ok(0)
}

fn open_studio(config: &StudioConfig, runtime: &RuntimeArgs) -> Result<Studio> {
    let mut config = config.clone();
    if let Some(history) = &runtime.history {
        config.history_dir = history.clone();
    }
    if let Some(model) = &runtime.model {
        config.model = model.clone();
    }
    let backend: Box<dyn GenerationBackend> = match runtime.backend {
        BackendKind::Gemini => Box::new(GeminiBackend::from_config(&config)?),
        BackendKind::Dryrun => Box::new(DryrunBackend::default()),
    };
    let mut studio = Studio::open(&config, backend);
    studio.history_mut().load_more()?;
    Ok(studio)
}

fn portrait_prompt(args: &StyleArgs) -> PortraitPrompt {
    PortraitPrompt {
        custom_prompt: args.prompt.clone(),
        preset_id: args.preset.clone(),
        style: StyleSettings {
            skin_texture: !args.no_skin_texture,
            face_detail: args.face_detail,
            creativity_level: args.creativity,
            lighting: args.lighting,
            color_grading: args.grading,
            quality: args.quality,
        },
        aspect_ratio: args.aspect,
    }
}

fn finish_single(outcome: GenerationOutcome, out_dir: &Path, stem: &str) -> Result<i32> {
    match outcome {
        GenerationOutcome::Success(image) => {
            let path = write_image(out_dir, stem, &image)?;
            println!("{}", path.display());
            Ok(0)
        }
        GenerationOutcome::Failure(failure) => {
            eprintln!("{}", failure.user_message());
            if !failure.kind.is_retryable() {
                eprintln!("({} is not retryable)", failure.kind);
            }
            Ok(1)
        }
    }
}

fn write_image(out_dir: &Path, stem: &str, image: &GeneratedImage) -> Result<PathBuf> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed creating {}", out_dir.display()))?;
    let path = out_dir.join(format!("{stem}.{}", extension_for(&image.mime_type)));
    fs::write(&path, &image.bytes)
        .with_context(|| format!("failed writing {}", path.display()))?;
    Ok(path)
}

fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        _ => "png",
    }
}

fn parse_lighting(raw: &str) -> Result<LightingIntensity, String> {
    LightingIntensity::parse(raw).ok_or_else(|| format!("unknown lighting '{raw}'"))
}

fn parse_grading(raw: &str) -> Result<ColorGradingStyle, String> {
    ColorGradingStyle::parse(raw).ok_or_else(|| format!("unknown color grading '{raw}'"))
}

fn parse_quality(raw: &str) -> Result<QualityMode, String> {
    QualityMode::parse(raw).ok_or_else(|| format!("unknown quality '{raw}'"))
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use studio_contracts::{AspectRatio, ColorGradingStyle, QualityMode};

    use studio_engine::Adjustments;

    use super::{extension_for, portrait_prompt, Cli, Command};

    #[test]
    fn generate_flags_build_a_portrait_prompt() {
        let cli = Cli::parse_from([
            "studio-rs",
            "generate",
            "--image",
            "in.png",
            "--out",
            "out",
            "--aspect",
            "16:9",
            "--grading",
            "none",
            "--quality",
            "standard",
            "--backend",
            "dryrun",
        ]);
        let Command::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        let prompt = portrait_prompt(&args.style);
        assert_eq!(prompt.aspect_ratio, AspectRatio::Wide);
        assert_eq!(prompt.style.color_grading, ColorGradingStyle::None);
        assert_eq!(prompt.style.quality, QualityMode::Standard);
        assert!(prompt.style.skin_texture);
    }

    #[test]
    fn bad_style_values_are_rejected() {
        let parsed = Cli::try_parse_from([
            "studio-rs", "generate", "--image", "a.png", "--out", "o", "--lighting", "neon",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn edit_flags_default_to_identity() {
        let cli = Cli::parse_from(["studio-rs", "edit", "--image", "a.png", "--out", "o"]);
        let Command::Edit(args) = cli.command else {
            panic!("expected edit");
        };
        assert!(args.adjustments().is_identity());

        let cli = Cli::parse_from([
            "studio-rs", "edit", "--image", "a.png", "--out", "o", "--sepia", "60", "--blur", "2",
        ]);
        let Command::Edit(args) = cli.command else {
            panic!("expected edit");
        };
        assert_eq!(
            args.adjustments(),
            Adjustments {
                sepia: 60,
                blur: 2,
                ..Adjustments::default()
            }
        );
    }

    #[test]
    fn edit_rejects_out_of_range_blur() {
        let parsed = Cli::try_parse_from([
            "studio-rs", "edit", "--image", "a.png", "--out", "o", "--blur", "11",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn refine_requires_text() {
        let parsed =
            Cli::try_parse_from(["studio-rs", "refine", "--image", "r.png", "--out", "o"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn mime_types_map_to_extensions() {
        assert_eq!(extension_for("image/jpeg"), "jpg");
        assert_eq!(extension_for("image/png"), "png");
        assert_eq!(extension_for("application/octet-stream"), "png");
    }
}
