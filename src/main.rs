// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{anyhow, Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use log::{info, warn, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use vidscribe::app_config::{self, Config, TranslationProvider};
use vidscribe::app_controller::Controller;
use vidscribe::jobs::models::short_id;
use vidscribe::language_utils;

/// CLI Wrapper for TranslationProvider to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliTranslationProvider {
    Ollama,
    OpenAI,
    Anthropic,
    Gemini,
}

impl From<CliTranslationProvider> for TranslationProvider {
    fn from(cli_provider: CliTranslationProvider) -> Self {
        match cli_provider {
            CliTranslationProvider::Ollama => TranslationProvider::Ollama,
            CliTranslationProvider::OpenAI => TranslationProvider::OpenAI,
            CliTranslationProvider::Anthropic => TranslationProvider::Anthropic,
            CliTranslationProvider::Gemini => TranslationProvider::Gemini,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Transcribe and translate video files (default command)
    Translate(TranslateArgs),

    /// List jobs recorded in the job database
    Jobs {
        /// Configuration file path
        #[arg(short, long, default_value = "conf.json")]
        config_path: String,
    },

    /// Generate shell completions for vidscribe
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser, Debug)]
struct TranslateArgs {
    /// Input video file or directory to process
    #[arg(value_name = "INPUT_PATH")]
    input_path: PathBuf,

    /// Force overwrite of existing output files
    #[arg(short, long)]
    force_overwrite: bool,

    /// Translation provider to use
    #[arg(short, long, value_enum)]
    provider: Option<CliTranslationProvider>,

    /// Model name to use for translation
    #[arg(short, long)]
    model: Option<String>,

    /// Spoken language of the videos (e.g., 'en', 'es', 'fr')
    #[arg(short, long)]
    source_language: Option<String>,

    /// Subtitle language (e.g., 'en', 'es', 'fr')
    #[arg(short, long)]
    target_language: Option<String>,

    /// Number of videos processed at once
    #[arg(short = 'j', long)]
    max_concurrent_jobs: Option<usize>,

    /// Directory for the subtitle files (defaults to next to each video;
    /// folder layouts are mirrored below it)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Also write the transcript and translation as CSV files
    #[arg(long)]
    save_transcript: bool,

    /// INPUT_PATH is a transcript CSV (translated without transcribing) or a
    /// translation CSV (turned straight into subtitles)
    #[arg(long)]
    from_csv: bool,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: String,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,
}

/// vidscribe - translated subtitles for videos
///
/// Extracts the audio of a video, transcribes it, and translates the
/// transcript with an AI provider into an SRT subtitle file.
#[derive(Parser, Debug)]
#[command(name = "vidscribe")]
#[command(version)]
#[command(about = "AI-powered video transcription and subtitle translation")]
#[command(long_about = "vidscribe transcribes the speech of video files and translates it into subtitles.

EXAMPLES:
    vidscribe translate talk.mp4                      # Translate using default config
    vidscribe translate -f talk.mp4                   # Force overwrite existing files
    vidscribe translate -p openai -m gpt-4o talk.mp4  # Use specific provider and model
    vidscribe translate -s en -t es talk.mp4          # Transcribe English, write Spanish
    vidscribe translate -l debug /videos/             # Process entire directory with debug logging
    vidscribe translate -j 2 /videos/                 # At most two videos at a time
    vidscribe translate --save-transcript talk.mp4    # Keep talk.transcript.csv and talk.es.csv
    vidscribe translate --from-csv talk.transcript.csv # Translate an edited transcript
    vidscribe jobs                                    # Show recorded jobs
    vidscribe completions bash > vidscribe.bash       # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config-path. If the config file doesn't exist, a default one
    will be created automatically.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,
}

// @struct: Custom logger implementation, filtered by the global max level
struct CustomLogger;

impl CustomLogger {
    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_boxed_logger(Box::new(CustomLogger))?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI color for log level
    fn color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let _ = writeln!(
                std::io::stderr(),
                "{}{} {:<5} {}\x1B[0m",
                Self::color_for_level(record.level()),
                now,
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    CustomLogger::init(LevelFilter::Info)?;

    let cli = CommandLineOptions::parse();

    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "vidscribe", &mut std::io::stdout());
            Ok(())
        }
        Commands::Jobs { config_path } => run_jobs(&config_path).await,
        Commands::Translate(args) => run_translate(args).await,
    }
}

/// Load the configuration file, writing a default one when it is missing
fn load_or_create_config(config_path: &str) -> Result<Config> {
    if Path::new(config_path).exists() {
        let file = File::open(config_path).context(format!("Failed to open config file: {}", config_path))?;
        serde_json::from_reader(BufReader::new(file)).context(format!("Failed to parse config file: {}", config_path))
    } else {
        warn!("Config file not found at '{}', creating default config.", config_path);
        let config = Config::default();
        let config_json =
            serde_json::to_string_pretty(&config).context("Failed to serialize default config to JSON")?;
        std::fs::write(config_path, config_json)
            .context(format!("Failed to write default config to file: {}", config_path))?;
        Ok(config)
    }
}

async fn run_translate(options: TranslateArgs) -> Result<()> {
    let mut config = load_or_create_config(&options.config_path)?;

    // CLI options override the file
    if let Some(provider) = &options.provider {
        config.translation.provider = provider.clone().into();
    }
    if let Some(model) = &options.model {
        config.translation.set_model(model.clone());
    }
    if let Some(source_lang) = &options.source_language {
        config.source_language = source_lang.clone();
    }
    if let Some(target_lang) = &options.target_language {
        config.target_language = target_lang.clone();
    }
    if let Some(max_jobs) = options.max_concurrent_jobs {
        config.jobs.max_concurrent_jobs = max_jobs;
    }
    if let Some(log_level) = &options.log_level {
        config.log_level = log_level.clone().into();
    }

    log::set_max_level(config.log_level.to_level_filter());
    config.validate().context("Configuration validation failed")?;

    info!(
        "vidscribe: {} → {} with {} - {}",
        language_utils::get_language_name(&config.source_language).unwrap_or_else(|_| config.source_language.clone()),
        language_utils::get_language_name(&config.target_language).unwrap_or_else(|_| config.target_language.clone()),
        config.translation.provider.display_name(),
        config.translation.get_model()
    );

    let controller = Controller::with_config(config).await?.with_csv_export(options.save_transcript);

    if options.input_path.is_file() {
        let output_dir = match &options.output_dir {
            Some(dir) => dir.clone(),
            None => options.input_path.parent().unwrap_or(Path::new(".")).to_path_buf(),
        };
        if options.from_csv {
            controller
                .run_csv(options.input_path.clone(), output_dir, options.force_overwrite)
                .await?;
        } else {
            controller
                .run(options.input_path.clone(), output_dir, options.force_overwrite)
                .await?;
        }
    } else if options.input_path.is_dir() {
        if options.from_csv {
            return Err(anyhow!("--from-csv expects a CSV file, not a directory"));
        }
        controller
            .run_folder(options.input_path.clone(), options.output_dir.clone(), options.force_overwrite)
            .await?;
    } else {
        return Err(anyhow!("Input path does not exist: {:?}", options.input_path));
    }

    Ok(())
}

async fn run_jobs(config_path: &str) -> Result<()> {
    let config = load_or_create_config(config_path)?;
    log::set_max_level(config.log_level.to_level_filter());

    let jobs = Controller::stored_jobs(&config).await?;
    if jobs.is_empty() {
        info!("No recorded jobs");
        return Ok(());
    }

    for status in jobs {
        let detail = match &status.error {
            Some(error) => error.to_string(),
            None => format!("{}%", status.progress),
        };
        println!(
            "{}  {:<16} {}  {} -> {}  {}  {}",
            short_id(&status.id),
            status.state.to_string(),
            status.created_at.format("%Y-%m-%d %H:%M:%S"),
            status.source_language,
            status.target_language,
            status.video_ref,
            detail
        );
    }
    Ok(())
}
