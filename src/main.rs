use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use recipe_engine::{
    config::EngineConfig,
    logging::init_logging,
    models::{Recipe, RecipeStep, Row, RunOptions, Value, WriteBackStrategy},
    pipeline::RecipeEngine,
    upsert::{BatchUpserter, BoardWriteBack, ExportWriteBack, HttpBoardClient, StrategyRouter},
};

#[derive(Parser)]
#[command(name = "recipe-engine")]
#[command(version)]
#[command(about = "Normalize tabular rows with a recipe and write them back to a board")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Dry run: print transformed rows, diff and findings
    Preview(RunArgs),
    /// Run every step including write-back
    Execute {
        #[command(flatten)]
        run: RunArgs,

        /// Board API token, required for external_upsert steps
        #[arg(long, env = "BOARD_API_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Where export steps write their CSV (stdout when omitted)
        #[arg(long, value_name = "FILE")]
        export_to: Option<PathBuf>,
    },
    /// Print the effective configuration
    Config,
}

#[derive(Args)]
struct RunArgs {
    /// Recipe JSON file
    #[arg(short, long)]
    recipe: PathBuf,

    /// Input rows: a JSON array of objects, or a CSV file with a header
    #[arg(long)]
    rows: PathBuf,

    /// Caller is entitled to fuzzy dedupe
    #[arg(long)]
    allow_fuzzy: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = EngineConfig::load(cli.config.as_deref())?;
    init_logging(&config.logging);
    info!("Starting recipe-engine v{}", env!("CARGO_PKG_VERSION"));

    let engine = RecipeEngine::with_fuzzy_threshold(config.dedupe.default_threshold);

    match cli.command {
        Command::Config => {
            print!("{}", config.to_toml_string()?);
        }
        Command::Preview(args) => {
            let (recipe, rows) = load_inputs(&args).await?;
            let result = engine
                .preview(&recipe, &rows, RunOptions::with_fuzzy(args.allow_fuzzy))
                .await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Execute {
            run,
            token,
            export_to,
        } => {
            let (recipe, rows) = load_inputs(&run).await?;
            recipe.check_write_back_ready()?;

            let board = if uses_strategy(&recipe, WriteBackStrategy::ExternalUpsert) {
                let Some(token) = token else {
                    bail!("external_upsert needs a board token (--token or BOARD_API_TOKEN)");
                };
                let client = HttpBoardClient::new(token, &config.board)?;
                Some(BoardWriteBack::new(BatchUpserter::new(
                    Arc::new(client),
                    config.upsert.clone(),
                )))
            } else {
                None
            };
            let export = ExportWriteBack::new();

            let mut router = StrategyRouter::new().export(&export);
            if let Some(board) = &board {
                router = router.upsert(board);
            }

            let result = engine
                .execute(&recipe, &rows, RunOptions::with_fuzzy(run.allow_fuzzy), &router)
                .await?;

            if let Some(csv) = export.output() {
                match &export_to {
                    Some(path) => tokio::fs::write(path, csv)
                        .await
                        .with_context(|| format!("writing export to {}", path.display()))?,
                    None => print!("{csv}"),
                }
            }
            let upsert = board.as_ref().and_then(BoardWriteBack::last_result);
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "result": result,
                    "upsert": upsert,
                }))?
            );
        }
    }

    Ok(())
}

fn uses_strategy(recipe: &Recipe, strategy: WriteBackStrategy) -> bool {
    recipe
        .steps
        .iter()
        .any(|step| matches!(step, RecipeStep::WriteBack(c) if c.strategy == strategy))
}

async fn load_inputs(args: &RunArgs) -> Result<(Recipe, Vec<Row>)> {
    let recipe_json = tokio::fs::read_to_string(&args.recipe)
        .await
        .with_context(|| format!("reading recipe {}", args.recipe.display()))?;
    let recipe = Recipe::from_json(&recipe_json)?;

    let rows = read_rows(&args.rows).await?;
    info!(
        "Loaded recipe '{}' v{} and {} rows",
        recipe.name,
        recipe.version,
        rows.len()
    );
    Ok((recipe, rows))
}

async fn read_rows(path: &Path) -> Result<Vec<Row>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading rows {}", path.display()))?;

    let is_csv = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    if !is_csv {
        return serde_json::from_str(&text)
            .with_context(|| format!("{} is not a JSON array of objects", path.display()));
    }

    let mut reader = csv::Reader::from_reader(text.as_bytes());
    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: Row = headers
            .iter()
            .zip(record.iter())
            .map(|(field, value)| (field.to_string(), Value::String(value.to_string())))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}
