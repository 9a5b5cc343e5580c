//! CLI entry point for `mailbinder`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Args, CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use mailbinder::config::{self, Config, ConversionOptions};
use mailbinder::document::message::MessageDocument;
use mailbinder::document::split::OutputPart;
use mailbinder::export::{report, PdfPartWriter, Workspace};
use mailbinder::pipeline::source::discover_inputs;
use mailbinder::pipeline::{convert_batch, PartSink};
use mailbinder::render::PdfTextBackend;

#[derive(Parser)]
#[command(
    name = "mailbinder",
    version,
    about = "Convert EML files and MBOX archives into PDF documents"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert messages to PDF
    Convert(ConvertArgs),
    /// List the sources and message counts that would be converted
    Inspect {
        #[arg(required = true, value_name = "INPUT")]
        inputs: Vec<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

#[derive(Args)]
struct ConvertArgs {
    /// .eml files, MBOX archives, or directories containing them
    #[arg(required = true, value_name = "INPUT")]
    inputs: Vec<PathBuf>,

    /// Output directory
    #[arg(short, long, value_name = "DIR")]
    output: PathBuf,

    /// Also write merged PDFs of all messages
    #[arg(long)]
    merge: bool,

    /// Write a text report into the output directory
    #[arg(long)]
    report: bool,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,

    /// Maximum bytes per merged part (0 = unbounded)
    #[arg(long, value_name = "BYTES", allow_negative_numbers = true)]
    max_part_bytes: Option<i64>,

    /// Maximum pages per merged part (0 = unbounded)
    #[arg(long, value_name = "PAGES", allow_negative_numbers = true)]
    max_part_pages: Option<i64>,

    /// Embed every PDF attachment, even repeated ones
    #[arg(long)]
    no_dedup: bool,

    /// Worker threads (default: from config, else number of CPUs)
    #[arg(short, long, value_name = "N", env = "MAILBINDER_JOBS")]
    jobs: Option<usize>,

    /// Skip the per-message PDFs
    #[arg(long)]
    no_per_message: bool,

    /// Root for the run's scratch directory
    #[arg(long, value_name = "DIR")]
    temp_dir: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = config::load_config();

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Convert(args) => cmd_convert(args, &config),
        Commands::Inspect { inputs, json } => cmd_inspect(&inputs, json, &config),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mailbinder.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailbinder", &mut std::io::stdout());
    Ok(())
}

fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

/// Forwards to the PDF writer and ticks the spinner once per message.
struct ProgressSink<'a> {
    inner: &'a mut PdfPartWriter,
    pb: &'a ProgressBar,
}

impl PartSink for ProgressSink<'_> {
    fn accept_document(&mut self, document: &MessageDocument) -> mailbinder::Result<()> {
        self.inner.accept_document(document)?;
        self.pb.inc(1);
        Ok(())
    }

    fn accept(&mut self, part: OutputPart) -> mailbinder::Result<()> {
        self.pb.set_message(format!("part {} sealed", part.index));
        self.inner.accept(part)
    }
}

fn cmd_convert(args: ConvertArgs, config: &Config) -> anyhow::Result<()> {
    let mut builder = ConversionOptions::from_config(config);
    if let Some(bytes) = args.max_part_bytes {
        builder = builder.max_bytes_per_part(bytes);
    }
    if let Some(pages) = args.max_part_pages {
        builder = builder.max_pages_per_part(pages);
    }
    if args.no_dedup {
        builder = builder.deduplicate_attachments(false);
    }
    if let Some(jobs) = args.jobs {
        builder = builder.workers(jobs);
    }
    let options = builder.build()?;

    let per_message = config.output.per_message && !args.no_per_message;
    let merge = config.output.merge || args.merge;
    if !per_message && !merge {
        anyhow::bail!("nothing to write: per-message output is disabled and --merge is not set");
    }

    let sources = discover_inputs(&args.inputs)?;
    if sources.is_empty() {
        anyhow::bail!("no .eml files or MBOX archives found in the given inputs");
    }

    let temp_root = args.temp_dir.as_deref().or(config.general.temp_dir.as_deref());
    let workspace = Workspace::create(temp_root)?;
    let mut writer = PdfPartWriter::new(args.output.clone(), workspace, per_message, merge)?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} Converting {pos} messages ({elapsed}) {msg}")
            .expect("valid template"),
    );
    pb.enable_steady_tick(Duration::from_millis(120));

    let start = Instant::now();
    let summary = {
        let mut sink = ProgressSink {
            inner: &mut writer,
            pb: &pb,
        };
        convert_batch(
            &sources,
            &options,
            Arc::new(PdfTextBackend::new()),
            &mut sink,
        )
    };
    pb.finish_and_clear();
    let summary = summary?;
    let written = writer.finish()?;
    let elapsed = start.elapsed();

    let lines = report::summary_lines(&summary, &written.merged);
    for line in &lines {
        tracing::info!("{line}");
    }

    if args.json {
        println!("{}", report::summary_json(&summary)?);
    } else {
        println!();
        for line in &lines {
            println!("  {line}");
        }
        println!(
            "  Wrote {} message PDFs to {} in {:.1}s",
            written.messages.len(),
            args.output.display(),
            elapsed.as_secs_f64()
        );
        println!();
    }

    if args.report || config.output.report {
        let path = report::write_text_report(&args.output, &summary, &written.merged)?;
        tracing::info!(path = %path.display(), "Wrote report");
    }

    Ok(())
}

fn cmd_inspect(inputs: &[PathBuf], json: bool, config: &Config) -> anyhow::Result<()> {
    let sources = discover_inputs(inputs)?;
    let max_size = config.performance.max_message_size;

    let mut rows = Vec::with_capacity(sources.len());
    for source in &sources {
        let messages = source.count_messages(max_size)?;
        rows.push((source, messages, file_size(source.path())));
    }

    if json {
        let value: Vec<serde_json::Value> = rows
            .iter()
            .map(|(source, messages, size)| {
                serde_json::json!({
                    "path": source.path().display().to_string(),
                    "kind": source.kind(),
                    "messages": messages,
                    "size_bytes": size,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    use humansize::{format_size, BINARY};
    println!();
    for (source, messages, size) in &rows {
        println!(
            "  {:<5} {:>8} msgs {:>10}  {}",
            source.kind(),
            messages,
            format_size(*size, BINARY),
            source.path().display()
        );
    }
    let total: u64 = rows.iter().map(|(_, m, _)| m).sum();
    println!();
    println!("  {:<25} {}", "Sources", rows.len());
    println!("  {:<25} {}", "Total messages", total);
    println!();
    Ok(())
}

fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}
