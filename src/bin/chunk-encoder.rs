use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use chunk_encoder::{
    ColumnarMetadata, Device, DirectoryWriter, EncodeError, EncodeOptions, FrameChunk, HistogramMapper,
    IndexMapping, MetadataSource, OperationType, ProgressCallback, ProgressInfo, RecordMetadata,
    encode_chunk,
};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;

const CLI_AFTER_HELP: &str = "Examples:\n  chunk-encoder encode videos --out encoded\n  chunk-encoder encode videos --out tokens --strategy tokens --batch-size 64 --progress\n  chunk-encoder encode videos --out captions --strategy captions --caption-key caption --json\n  chunk-encoder completions zsh > _chunk-encoder";

const FRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tiff", "webp"];

const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Parser)]
#[command(
    name = "chunk-encoder",
    version,
    about = "Encode directories of video frames into embeddings, tokens, or captions",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show a line per written video.
    #[arg(long, global = true)]
    verbose: bool,

    /// Show a progress bar.
    #[arg(long, global = true)]
    progress: bool,

    /// Allow overwriting existing records.
    #[arg(long, global = true)]
    overwrite: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Encode every video directory under INPUT.
    #[command(
        about = "Encode frame directories",
        after_help = "Each sub-directory of INPUT is one video; its image files, sorted by name, are its frames.\nAn optional INPUT/metadata.json array supplies one record per video in directory order."
    )]
    Encode {
        /// Directory containing one sub-directory of frames per video.
        input: PathBuf,
        /// Output directory for records.
        #[arg(long)]
        out: PathBuf,
        /// Strategy: embedding | tokens | captions.
        #[arg(long, default_value = "embedding")]
        strategy: String,
        /// Frames per inference batch.
        #[arg(long, default_value_t = chunk_encoder::DEFAULT_BATCH_SIZE)]
        batch_size: usize,
        /// Parallel preprocessing workers.
        #[arg(long, default_value_t = chunk_encoder::DEFAULT_WORKER_COUNT)]
        workers: usize,
        /// Videos per chunk.
        #[arg(long, default_value_t = 16)]
        chunk_videos: usize,
        /// Yield to the scheduler before every batch.
        #[arg(long)]
        low_priority: bool,
        /// Name records after the video directory instead of its position.
        #[arg(long)]
        use_dst_name: bool,
        /// Metadata key for generated captions.
        #[arg(long, default_value = chunk_encoder::DEFAULT_GENERATED_CAPTION_KEY)]
        caption_key: String,
        /// Device hint passed to the mapper (cpu, cuda, cuda:N).
        #[arg(long, default_value = "cpu")]
        device: String,
        /// Side length frames are resized to before encoding.
        #[arg(long, default_value_t = 32)]
        side: u32,
        /// Print a machine-readable summary.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

/// One video directory discovered under the input.
#[derive(Debug, Clone)]
struct VideoSource {
    name: String,
    frames: Vec<PathBuf>,
}

fn parse_strategy(value: &str) -> Option<EncodeOptions> {
    let options = EncodeOptions::new();
    match value.to_ascii_lowercase().as_str() {
        "embedding" | "embeddings" | "clip" => Some(options),
        "tokens" | "tokenize" | "tokenization" => {
            Some(options.with_frame_tokenization_strategy("histogram"))
        }
        "captions" | "caption" | "captioning" => Some(options.with_captioning_strategy("histogram")),
        _ => None,
    }
}

fn is_frame_file(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| {
            FRAME_EXTENSIONS.contains(&extension.to_ascii_lowercase().as_str())
        })
}

fn discover_videos(input: &Path) -> Result<Vec<VideoSource>, Box<dyn std::error::Error>> {
    let mut directories: Vec<PathBuf> = fs::read_dir(input)?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.is_dir())
        .collect();
    directories.sort();

    let mut videos = Vec::with_capacity(directories.len());
    for directory in directories {
        let mut frames: Vec<PathBuf> = fs::read_dir(&directory)?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.is_file() && is_frame_file(path))
            .collect();
        frames.sort();

        let name = directory
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| format!("unsupported directory name: {}", directory.display()))?
            .to_string();
        videos.push(VideoSource { name, frames });
    }
    Ok(videos)
}

fn load_metadata(
    input: &Path,
    videos: &[VideoSource],
) -> Result<Box<dyn MetadataSource>, Box<dyn std::error::Error>> {
    let path = input.join(METADATA_FILE);
    if path.is_file() {
        let value: serde_json::Value = serde_json::from_slice(&fs::read(&path)?)?;
        let records = RecordMetadata::from_json(value)?;
        if records.len() != videos.len() {
            return Err(format!(
                "{} has {} records but {} videos were found",
                path.display(),
                records.len(),
                videos.len()
            )
            .into());
        }
        return Ok(Box::new(records));
    }

    let table = ColumnarMetadata::new()
        .with_column("video", videos.iter().map(|video| json!(video.name)).collect())
        .with_column("frames", videos.iter().map(|video| json!(video.frames.len())).collect());
    Ok(Box::new(table))
}

/// Load the frames of `videos` and lay them out as one chunk.
///
/// `first` is the position of `videos[0]` in the full listing; index
/// references are global positions so ids and metadata resolve across chunks.
fn load_chunk(
    videos: &[VideoSource],
    first: usize,
) -> Result<(FrameChunk, IndexMapping), EncodeError> {
    let mut chunk = FrameChunk::default();
    let mut index = IndexMapping::new();
    let mut offset = 0;
    for (position, video) in videos.iter().enumerate() {
        let frames = video
            .frames
            .iter()
            .map(|path| image::open(path).map(|image| image.to_rgb8()))
            .collect::<Result<Vec<_>, _>>()?;
        let count = frames.len();
        chunk.push_segment(frames);
        index.push(first + position, offset, offset + count, format!("{}.mp4", video.name));
        offset += count;
    }
    Ok((chunk, index))
}

struct BarProgress {
    bar: ProgressBar,
}

impl ProgressCallback for BarProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        if info.operation == OperationType::Inference {
            if let Some(total) = info.total {
                self.bar.set_length(total);
            }
            self.bar.set_position(info.current);
        }
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Encode {
            input,
            out,
            strategy,
            batch_size,
            workers,
            chunk_videos,
            low_priority,
            use_dst_name,
            caption_key,
            device,
            side,
            json,
        } => {
            let options = parse_strategy(&strategy)
                .ok_or(format!("unsupported --strategy: {strategy}"))?
                .with_batch_size(batch_size)
                .with_worker_count(workers)
                .with_low_priority(low_priority)
                .with_use_dst_name(use_dst_name)
                .with_generated_caption_key(caption_key)
                .with_device(device.parse::<Device>()?);

            let videos = discover_videos(&input)?;
            if videos.is_empty() {
                return Err(format!("no video directories found in {}", input.display()).into());
            }
            let metadata = load_metadata(&input, &videos)?;
            let ids: Vec<String> = (0..videos.len()).map(|position| format!("{position:08}")).collect();
            let mapper = Arc::new(HistogramMapper::new().with_side(side));

            let progress_bar = if cli.global.progress {
                let pb = ProgressBar::new(0);
                let style = ProgressStyle::with_template(
                    "{spinner:.green} {bar:40.cyan/blue} {pos}/{len} batches {msg}",
                )?;
                pb.set_style(style.progress_chars("##-"));
                Some(pb)
            } else {
                None
            };
            let options = match &progress_bar {
                Some(pb) => options.with_progress(Arc::new(BarProgress { bar: pb.clone() })),
                None => options,
            };

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;

            let (written, frames, batches) = runtime.block_on(async {
                let mut writer = DirectoryWriter::create(&out)
                    .await?
                    .with_overwrite(cli.global.overwrite);
                let (mut written, mut frames, mut batches) = (0, 0, 0);

                for (chunk_number, group) in videos.chunks(chunk_videos.max(1)).enumerate() {
                    let first = chunk_number * chunk_videos.max(1);
                    let (chunk, index) = load_chunk(group, first)?;
                    if let Some(pb) = &progress_bar {
                        pb.set_message(format!("chunk {}", chunk_number + 1));
                    }

                    let encoded = encode_chunk(
                        chunk,
                        &index,
                        &mut writer,
                        Arc::clone(&mapper),
                        metadata.as_ref(),
                        &ids,
                        &options,
                    )
                    .await?;

                    if cli.global.verbose {
                        for (payload, video_id, _) in encoded.records() {
                            let rows = payload.map_or(0, |payload| payload.rows());
                            eprintln!("wrote {video_id} ({rows} rows) -> {}", out.display());
                        }
                    }
                    written += encoded.stats.videos_written;
                    frames += encoded.stats.frames;
                    batches += encoded.stats.batches;
                }
                Ok::<_, Box<dyn std::error::Error>>((written, frames, batches))
            })?;

            if let Some(pb) = progress_bar {
                pb.finish_with_message("done");
            }

            if json {
                let payload = json!({
                    "strategy": options.strategy()?.to_string(),
                    "videos": written,
                    "frames": frames,
                    "batches": batches,
                    "output": out.display().to_string(),
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!(
                    "{} {}",
                    "success:".green().bold(),
                    format!(
                        "Encoded {written} video(s), {frames} frame(s) in {batches} batch(es) to {}",
                        out.display()
                    )
                    .green()
                );
            }
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "chunk-encoder", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}
