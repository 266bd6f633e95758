use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use food_screen_api::{field_catalog, AnalysisReport, FoodScreenApi};
use food_screen_artifacts::{ArtifactPaths, ArtifactStore};
use food_screen_core::{SampleField, SampleRecord};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

const CLI_CONTRACT_VERSION: &str = "cli.v1";

#[derive(Debug, Parser)]
#[command(name = "fa")]
#[command(about = "Food adulteration screening CLI")]
struct Cli {
    #[arg(long, env = "FOOD_SCREEN_ARTIFACTS", default_value = "./artifacts")]
    artifacts: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the input fields and their default choices.
    Fields(FieldsArgs),
    /// Inspect the loaded model artifacts.
    Artifacts {
        #[command(subcommand)]
        command: ArtifactsCommand,
    },
    /// Analyze one sample.
    Analyze(Box<SampleArgs>),
    /// Analyze every record of a JSON-lines file in one session.
    Batch(BatchArgs),
}

#[derive(Debug, Subcommand)]
enum ArtifactsCommand {
    /// Print the feature schema width, model kinds, classes and file digests.
    Inspect,
}

#[derive(Debug, Args)]
struct SampleArgs {
    #[arg(long)]
    food_item: String,
    #[arg(long)]
    source_type: String,
    #[arg(long)]
    storage_type: String,
    #[arg(long)]
    color: String,
    #[arg(long)]
    smell: String,
    #[arg(long)]
    texture: String,
    #[arg(long)]
    foreign_particles: String,
    #[arg(long)]
    appearance: String,
    #[arg(long)]
    float_or_settle_test: String,
    #[arg(long)]
    dissolves_in_water: String,
    #[arg(long)]
    foam_after_mixing: String,
    #[arg(long)]
    burn_test_result: String,
    #[arg(long)]
    taste: String,
}

#[derive(Debug, Args)]
struct FieldsArgs {
    /// Show one field, named by key, column prefix or label.
    #[arg(long)]
    field: Option<String>,
}

#[derive(Debug, Args)]
struct BatchArgs {
    #[arg(long = "in")]
    input: PathBuf,
}

impl From<SampleArgs> for SampleRecord {
    fn from(args: SampleArgs) -> Self {
        Self {
            food_item: args.food_item,
            source_type: args.source_type,
            storage_type: args.storage_type,
            color: args.color,
            smell: args.smell,
            texture: args.texture,
            foreign_particles: args.foreign_particles,
            appearance: args.appearance,
            float_or_settle_test: args.float_or_settle_test,
            dissolves_in_water: args.dissolves_in_water,
            foam_after_mixing: args.foam_after_mixing,
            burn_test_result: args.burn_test_result,
            taste: args.taste,
        }
    }
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn load_api(artifacts_dir: &Path) -> Result<FoodScreenApi> {
    let paths = ArtifactPaths::in_dir(artifacts_dir)
        .with_context(|| format!("failed to resolve artifacts in {}", artifacts_dir.display()))?;
    let store = ArtifactStore::load(&paths)
        .with_context(|| format!("failed to load artifacts from {}", artifacts_dir.display()))?;
    Ok(FoodScreenApi::new(Arc::new(store)))
}

fn run_fields(args: &FieldsArgs) -> Result<()> {
    let catalog = field_catalog();
    let Some(name) = args.field.as_deref() else {
        return emit_json(serde_json::json!({ "fields": catalog }));
    };
    let field = SampleField::parse(name).ok_or_else(|| anyhow!("unknown field `{name}`"))?;
    let entry = catalog
        .into_iter()
        .find(|entry| entry.key == field.as_str())
        .ok_or_else(|| anyhow!("field `{name}` is missing from the catalog"))?;
    emit_json(serde_json::json!({ "fields": [entry] }))
}

fn read_batch(path: &Path) -> Result<Vec<(usize, SampleRecord)>> {
    let body = fs::read_to_string(path)
        .with_context(|| format!("failed to read batch file {}", path.display()))?;
    body.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            let line_no = index + 1;
            let record = serde_json::from_str::<SampleRecord>(line).with_context(|| {
                format!("{}:{line_no}: invalid sample record", path.display())
            })?;
            Ok((line_no, record))
        })
        .collect()
}

fn run_analyze(api: &FoodScreenApi, args: SampleArgs) -> Result<()> {
    let mut session = api.open_session();
    let report = api.analyze(&mut session, &SampleRecord::from(args))?;
    emit_json(serde_json::to_value(report)?)
}

fn run_batch(api: &FoodScreenApi, args: &BatchArgs) -> Result<()> {
    let records = read_batch(&args.input)?;
    let mut session = api.open_session();
    let reports = records
        .iter()
        .map(|(line, record)| {
            api.analyze(&mut session, record)
                .with_context(|| format!("{}:{line}: analysis failed", args.input.display()))
        })
        .collect::<Result<Vec<AnalysisReport>>>()?;

    emit_json(serde_json::json!({
        "session_id": session.id(),
        "analyzed": reports.len(),
        "reports": reports,
        "history": api.history(&session),
    }))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Fields(args) => {
            // The input form is only offered once the models are usable.
            load_api(&cli.artifacts)?;
            run_fields(&args)
        }
        Command::Artifacts { command: ArtifactsCommand::Inspect } => {
            let api = load_api(&cli.artifacts)?;
            emit_json(serde_json::to_value(api.artifact_summary())?)
        }
        Command::Analyze(args) => {
            let api = load_api(&cli.artifacts)?;
            run_analyze(&api, *args)
        }
        Command::Batch(args) => {
            let api = load_api(&cli.artifacts)?;
            run_batch(&api, &args)
        }
    }
}
