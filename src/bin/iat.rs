//! IAT CLI - Command-line interface for the IAT D-score pipeline
//!
//! Commands:
//! - score: Run the cleaning and scoring pipeline over a trial table
//! - validate: Check columns and values without scoring
//! - overview: Print rows, participants and stage labels
//! - config: Print a configuration template with default values

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use iat_dscore::config::Direction;
use iat_dscore::pipeline::IatProcessor;
use iat_dscore::types::ScoreTable;
use iat_dscore::{
    IatError, InputFormat, PipelineOutput, RawTable, SchemaValidator, ScoringConfig, IAT_VERSION,
};

/// IAT - Cleaning and D-score computation for Implicit Association Test data
#[derive(Parser)]
#[command(name = "iat")]
#[command(version = IAT_VERSION)]
#[command(about = "Clean IAT trial data and compute D-scores", long_about = None)]
struct Cli {
    /// Log pipeline stages to stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline and write reports and scores
    Score {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "csv")]
        input_format: InputFormatArg,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        format: OutputFormat,

        /// Configuration JSON file (defaults: every rule enabled at its default value)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Congruent stage label (repeatable, replaces the configured set)
        #[arg(long)]
        congruent: Vec<String>,

        /// Incongruent stage label (repeatable, replaces the configured set)
        #[arg(long)]
        incongruent: Vec<String>,

        /// Sign convention of the D-score
        #[arg(long)]
        direction: Option<DirectionArg>,

        /// Score on natural-log reaction times
        #[arg(long)]
        log_transform: bool,
    },

    /// Check columns and values without scoring
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "csv")]
        input_format: InputFormatArg,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print rows, participants and stage labels of the input
    Overview {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "csv")]
        input_format: InputFormatArg,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a configuration template with default values
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum InputFormatArg {
    /// Comma-separated values with a header row
    Csv,
    /// JSON array of row objects
    Json,
    /// Newline-delimited JSON (one row object per line)
    Ndjson,
}

impl From<InputFormatArg> for InputFormat {
    fn from(arg: InputFormatArg) -> Self {
        match arg {
            InputFormatArg::Csv => InputFormat::Csv,
            InputFormatArg::Json => InputFormat::Json,
            InputFormatArg::Ndjson => InputFormat::Ndjson,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Report envelope as compact JSON
    Json,
    /// Report envelope as pretty-printed JSON
    JsonPretty,
    /// Score table as CSV
    Csv,
}

#[derive(Clone, Copy, ValueEnum)]
enum DirectionArg {
    IncongruentMinusCongruent,
    CongruentMinusIncongruent,
}

impl From<DirectionArg> for Direction {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::IncongruentMinusCongruent => Direction::IncongruentMinusCongruent,
            DirectionArg::CongruentMinusIncongruent => Direction::CongruentMinusIncongruent,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

/// `-v` turns on the per-stage library logs and the binary's run summary
fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "iat=info,iat_dscore=debug"
    } else {
        "warn"
    }
}

fn init_tracing(verbose: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter(verbose))),
        )
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), IatCliError> {
    match cli.command {
        Commands::Score {
            input,
            output,
            input_format,
            format,
            config,
            congruent,
            incongruent,
            direction,
            log_transform,
        } => {
            let config = build_config(
                config.as_deref(),
                congruent,
                incongruent,
                direction,
                log_transform,
            )?;
            cmd_score(&input, &output, input_format, format, config)
        }

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Overview {
            input,
            input_format,
            json,
        } => cmd_overview(&input, input_format, json),

        Commands::Config => {
            println!("{}", ScoringConfig::template().to_json()?);
            Ok(())
        }
    }
}

fn build_config(
    path: Option<&Path>,
    congruent: Vec<String>,
    incongruent: Vec<String>,
    direction: Option<DirectionArg>,
    log_transform: bool,
) -> Result<ScoringConfig, IatCliError> {
    let mut config = match path {
        Some(path) => ScoringConfig::from_json(&fs::read_to_string(path)?)?,
        None => ScoringConfig::template(),
    };

    if !congruent.is_empty() {
        config.congruent_labels = congruent.into_iter().collect();
    }
    if !incongruent.is_empty() {
        config.incongruent_labels = incongruent.into_iter().collect();
    }
    if let Some(direction) = direction {
        config.direction = direction.into();
    }
    if log_transform {
        config.log_transform = true;
    }

    Ok(config)
}

fn read_input(input: &Path) -> Result<String, IatCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn read_table(input: &Path, format: InputFormatArg) -> Result<RawTable, IatCliError> {
    let data = read_input(input)?;
    Ok(RawTable::parse(&data, format.into())?)
}

fn cmd_score(
    input: &Path,
    output: &Path,
    input_format: InputFormatArg,
    format: OutputFormat,
    config: ScoringConfig,
) -> Result<(), IatCliError> {
    let processor = IatProcessor::new(config)?;
    let table = read_table(input, input_format)?;
    let result = processor.score(&table)?;

    let output_data = match format {
        OutputFormat::JsonPretty => processor.encode(&result)?,
        OutputFormat::Json => serde_json::to_string(&processor.payload(&result))?,
        OutputFormat::Csv => score_table_csv(&result.scores)?,
    };

    if output.to_string_lossy() == "-" {
        print!("{}", output_data);
        if !output_data.ends_with('\n') {
            println!();
        }
    } else {
        fs::write(output, output_data)?;
    }

    log_summary(&result);
    Ok(())
}

fn log_summary(output: &PipelineOutput) {
    tracing::info!(
        input_rows = output.overview.rows,
        trials_scored = output.trials_scored,
        participants_excluded = output.reports.participant.len(),
        trials_excluded = output.reports.trial.len(),
        trials_corrected = output.reports.correction.len(),
        scored = output.scores.scored.len(),
        unscorable = output.scores.unscorable.len(),
        "scoring complete"
    );
}

/// One CSV row per participant; unscorable participants have empty values
#[derive(serde::Serialize)]
struct ScoreRow<'a> {
    participant_id: &'a str,
    congruent_rt_mean: Option<f64>,
    congruent_rt_std: Option<f64>,
    incongruent_rt_mean: Option<f64>,
    incongruent_rt_std: Option<f64>,
    all_rt_mean: Option<f64>,
    all_rt_std: Option<f64>,
    d_value: Option<f64>,
    unscorable: Option<&'static str>,
}

fn score_table_csv(scores: &ScoreTable) -> Result<String, IatCliError> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    for record in &scores.scored {
        writer.serialize(ScoreRow {
            participant_id: &record.participant_id,
            congruent_rt_mean: Some(record.congruent_rt_mean),
            congruent_rt_std: Some(record.congruent_rt_std),
            incongruent_rt_mean: Some(record.incongruent_rt_mean),
            incongruent_rt_std: Some(record.incongruent_rt_std),
            all_rt_mean: Some(record.all_rt_mean),
            all_rt_std: Some(record.all_rt_std),
            d_value: Some(record.d_value),
            unscorable: None,
        })?;
    }
    for entry in &scores.unscorable {
        writer.serialize(ScoreRow {
            participant_id: &entry.participant_id,
            congruent_rt_mean: None,
            congruent_rt_std: None,
            incongruent_rt_mean: None,
            incongruent_rt_std: None,
            all_rt_mean: None,
            all_rt_std: None,
            d_value: None,
            unscorable: Some(entry.reason.as_str()),
        })?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| IatCliError::Io(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| IatCliError::Iat(IatError::EncodingError(e.to_string())))
}

fn cmd_validate(input: &Path, input_format: InputFormatArg, json: bool) -> Result<(), IatCliError> {
    let table = read_table(input, input_format)?;
    let inspection = SchemaValidator::inspect(&table)?;
    let report = &inspection.report;

    if json {
        let out = serde_json::json!({
            "total_rows": table.len(),
            "valid_rows": inspection.dataset.len(),
            "missing": report.missing,
            "invalid": report.invalid,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total rows:   {}", table.len());
        println!("Valid rows:   {}", inspection.dataset.len());
        println!("Missing:      {}", report.missing.len());
        println!("Invalid:      {}", report.invalid.len());

        if !report.missing.is_empty() {
            println!("\nRows with missing values:");
            for row in &report.missing {
                println!("  - Row {}: {}", row.row, row.columns.join(", "));
            }
        }
        if !report.invalid.is_empty() {
            println!("\nInvalid values:");
            for value in &report.invalid {
                println!(
                    "  - Row {} {} = {:?}: {}",
                    value.row, value.column, value.value, value.reason
                );
            }
        }
    }

    if report.is_clean() {
        Ok(())
    } else {
        Err(IatCliError::ValidationFailed(
            report.missing.len() + report.invalid.len(),
        ))
    }
}

fn cmd_overview(input: &Path, input_format: InputFormatArg, json: bool) -> Result<(), IatCliError> {
    let table = read_table(input, input_format)?;
    let inspection = SchemaValidator::inspect(&table)?;
    if !inspection.report.is_clean() {
        tracing::warn!(report = %inspection.report, "overview covers valid rows only");
    }

    let overview = inspection.dataset.overview();
    if json {
        println!("{}", serde_json::to_string_pretty(&overview)?);
    } else {
        println!("Rows:          {}", overview.rows);
        println!("Participants:  {}", overview.participants);
        println!("Stage labels:  {}", overview.stage_labels.join(", "));
    }

    Ok(())
}

// Error types

#[derive(Debug)]
enum IatCliError {
    Io(io::Error),
    Iat(IatError),
    Json(serde_json::Error),
    Csv(csv::Error),
    ValidationFailed(usize),
}

impl From<io::Error> for IatCliError {
    fn from(e: io::Error) -> Self {
        IatCliError::Io(e)
    }
}

impl From<IatError> for IatCliError {
    fn from(e: IatError) -> Self {
        IatCliError::Iat(e)
    }
}

impl From<serde_json::Error> for IatCliError {
    fn from(e: serde_json::Error) -> Self {
        IatCliError::Json(e)
    }
}

impl From<csv::Error> for IatCliError {
    fn from(e: csv::Error) -> Self {
        IatCliError::Csv(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl CliError {
    fn new(code: &str, message: String, hint: &str) -> Self {
        Self {
            code: code.to_string(),
            message,
            hint: Some(hint.to_string()),
        }
    }
}

impl From<IatCliError> for CliError {
    fn from(e: IatCliError) -> Self {
        match e {
            IatCliError::Io(e) => {
                CliError::new("IO_ERROR", e.to_string(), "Check file paths and permissions")
            }
            IatCliError::Json(e) => CliError::new("JSON_ERROR", e.to_string(), "Check JSON syntax"),
            IatCliError::Csv(e) => CliError::new("CSV_ERROR", e.to_string(), "Check CSV syntax"),
            IatCliError::ValidationFailed(count) => CliError::new(
                "VALIDATION_FAILED",
                format!("{} problems found", count),
                "Fix the listed rows upstream and retry",
            ),
            IatCliError::Iat(e) => {
                let message = e.to_string();
                match e {
                    IatError::Schema { .. } => CliError::new(
                        "SCHEMA_ERROR",
                        message,
                        "Input needs Participant, Running, Stim_ACC and Stim_RT columns",
                    ),
                    IatError::DataQuality(_) => CliError::new(
                        "DATA_QUALITY",
                        message,
                        "Run 'iat validate' for the offending rows",
                    ),
                    IatError::Configuration(_) => CliError::new(
                        "CONFIG_ERROR",
                        message,
                        "Run 'iat config' for a valid template",
                    ),
                    IatError::ParseError(_) | IatError::JsonError(_) | IatError::CsvError(_) => {
                        CliError::new("PARSE_ERROR", message, "Check --input-format")
                    }
                    IatError::EncodingError(_) => {
                        CliError::new("ENCODING_ERROR", message, "Report this as a bug")
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_filter_shows_run_summary() {
        let filter = default_filter(true);
        assert!(filter.split(',').any(|d| d == "iat=info"));
        assert!(filter.split(',').any(|d| d == "iat_dscore=debug"));
        assert_eq!(default_filter(false), "warn");
    }

    #[test]
    fn test_verbose_filter_parses() {
        assert!(tracing_subscriber::EnvFilter::try_new(default_filter(true)).is_ok());
    }
}
