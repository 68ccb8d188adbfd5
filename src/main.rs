use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tasklens::llm::{self, CancellationToken, LlmClient};
use tasklens::{
    ConfigError, Database, Diagnostics, FilterWarning, IndexStatus, MarkdownScanner, ParsedQuery,
    SearchError, SearchMode, SearchResponse, Settings, StoreTaskIndex, Summary, Task,
    TaskSearchServiceBuilder,
};
use tracing_subscriber::EnvFilter;

/// tasklens - natural-language search over Markdown task lists
#[derive(Parser)]
#[command(name = "tasklens")]
#[command(about = "Search your Markdown tasks with natural-language queries")]
#[command(version)]
struct Cli {
    /// Path to the task database (defaults to the platform data directory)
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Scan a directory of Markdown files and replace the task index
    Import(ImportCommand),
    /// Search the imported tasks
    Query(QueryCommand),
    /// Print the effective configuration with secrets redacted
    Config,
}

/// Import tasks from Markdown files
#[derive(Parser)]
struct ImportCommand {
    /// Directory to scan recursively
    #[arg(value_name = "DIR")]
    dir: PathBuf,
}

/// Search tasks
#[derive(Parser)]
struct QueryCommand {
    /// The query, e.g. "p1 overdue" or "fix bug #work"
    #[arg(value_name = "TEXT")]
    text: String,

    /// simple (no model), smart (model-assisted parsing) or chat (parsing plus summary)
    #[arg(short, long, default_value = "simple")]
    mode: SearchMode,

    /// Print the full response as JSON
    #[arg(long)]
    json: bool,

    /// Maximum number of tasks to show
    #[arg(short, long, value_name = "N")]
    limit: Option<usize>,
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Import(cmd) => handle_import(cmd, cli.db.as_deref()),
        Commands::Query(cmd) => handle_query(cmd, cli.db.as_deref()),
        Commands::Config => handle_config(),
    };

    if let Err(e) = result {
        let exit_code = if is_user_error(&e) { 1 } else { 2 };
        eprintln!("Error: {e:#}");
        std::process::exit(exit_code);
    }
}

/// Logs go to stderr so `--json` output stays parseable. `RUST_LOG`
/// overrides the default `warn` level.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Determines if an error is a user error (vs internal error).
///
/// Configuration problems and invalid arguments are user errors. Database
/// and I/O failures are internal.
fn is_user_error(error: &anyhow::Error) -> bool {
    if error.chain().any(|cause| {
        cause.downcast_ref::<ConfigError>().is_some()
            || cause.downcast_ref::<SearchError>().is_some()
    }) {
        return true;
    }
    let error_msg = error.to_string();
    error_msg.contains("cannot be empty") || error_msg.contains("cannot be zero")
}

fn handle_import(cmd: &ImportCommand, db_override: Option<&Path>) -> Result<()> {
    if !cmd.dir.is_dir() {
        anyhow::bail!("Import directory not found: {}", cmd.dir.display());
    }
    let settings = Settings::load()?;
    let db = open_database(db_override)?;

    let (count, version) = execute_import(&cmd.dir, &settings, db)?;
    println!(
        "Imported {count} tasks from {} (index version {version})",
        cmd.dir.display()
    );
    Ok(())
}

/// Scans `dir` and replaces the stored task set. Returns the task count and
/// the new index version.
fn execute_import(dir: &Path, settings: &Settings, mut db: Database) -> Result<(usize, u64)> {
    let scanner = MarkdownScanner::new(&settings.status_categories);
    let tasks = scanner
        .scan_dir(dir)
        .with_context(|| format!("Failed to scan {}", dir.display()))?;
    let root = dir.display().to_string();
    let version = db
        .replace_all(&tasks, Some(&root))
        .context("Failed to store tasks")?;
    Ok((tasks.len(), version))
}

fn handle_query(cmd: &QueryCommand, db_override: Option<&Path>) -> Result<()> {
    if cmd.text.trim().is_empty() {
        anyhow::bail!("Query cannot be empty");
    }
    if cmd.limit == Some(0) {
        anyhow::bail!("Limit cannot be zero");
    }

    let settings = Settings::load()?;
    let client = if cmd.mode.uses_model() {
        Some(llm::build_client(&settings.provider)?)
    } else {
        None
    };
    let db = open_database(db_override)?;

    let output = execute_query(cmd, settings, db, client)?;
    print!("{output}");
    Ok(())
}

/// Runs one query and renders the response.
///
/// This function is separated from `handle_query` to allow testing with
/// in-memory databases and mock clients.
fn execute_query(
    cmd: &QueryCommand,
    mut settings: Settings,
    db: Database,
    client: Option<Arc<dyn LlmClient>>,
) -> Result<String> {
    if let Some(limit) = cmd.limit {
        settings.max_direct_results = limit;
    }

    let mut builder =
        TaskSearchServiceBuilder::new(settings).index(Arc::new(StoreTaskIndex::new(db)));
    if let Some(client) = client {
        builder = builder.client(client);
    }
    let mut service = builder.build()?;

    let response = service.search(&cmd.text, cmd.mode, &CancellationToken::new())?;
    if let IndexStatus::Unavailable { reason } = &response.diagnostics.index {
        anyhow::bail!("Task store is unavailable: {reason}");
    }
    if cmd.json {
        let mut rendered = serde_json::to_string_pretty(&JsonResponse::from(&response))
            .context("Failed to serialize response")?;
        rendered.push('\n');
        Ok(rendered)
    } else {
        Ok(render_text(&response))
    }
}

/// Serializable view of a [`SearchResponse`].
#[derive(Serialize)]
struct JsonResponse<'a> {
    query: &'a ParsedQuery,
    total_matches: usize,
    tasks: Vec<JsonTask<'a>>,
    summary: Option<&'a Summary>,
    warnings: &'a [FilterWarning],
    diagnostics: &'a Diagnostics,
}

#[derive(Serialize)]
struct JsonTask<'a> {
    #[serde(flatten)]
    task: &'a Task,
    score: f64,
}

impl<'a> From<&'a SearchResponse> for JsonResponse<'a> {
    fn from(response: &'a SearchResponse) -> Self {
        Self {
            query: &response.query,
            total_matches: response.total_matches,
            tasks: response
                .tasks
                .iter()
                .map(|scored| JsonTask {
                    task: &scored.task,
                    score: scored.score,
                })
                .collect(),
            summary: response.summary.as_ref(),
            warnings: &response.warnings,
            diagnostics: &response.diagnostics,
        }
    }
}

fn render_text(response: &SearchResponse) -> String {
    let mut out = String::new();
    for warning in &response.warnings {
        out.push_str(&format!("warning: {warning}\n"));
    }
    if let Some(disclosure) = &response.diagnostics.disclosure {
        out.push_str(&format!("note: {disclosure}\n"));
    }
    if let Some(summary) = &response.summary {
        out.push_str(&summary.text);
        out.push_str("\n\n");
    }

    if response.tasks.is_empty() {
        out.push_str("No matching tasks.\n");
        return out;
    }

    for (rank, scored) in response.tasks.iter().enumerate() {
        let task = &scored.task;
        out.push_str(&format!(
            "{:>3}. [{}] {}  ({}:{}, score {:.2})\n",
            rank + 1,
            task.status_symbol,
            task.text,
            task.source_path,
            task.source_line + 1,
            scored.score
        ));
    }
    if response.total_matches > response.tasks.len() {
        out.push_str(&format!(
            "Showing {} of {} matching tasks.\n",
            response.tasks.len(),
            response.total_matches
        ));
    }
    out
}

fn handle_config() -> Result<()> {
    let settings = Settings::load()?;
    println!("{}", execute_config(&settings)?);
    Ok(())
}

fn execute_config(settings: &Settings) -> Result<String> {
    serde_json::to_string_pretty(&settings.redacted()).context("Failed to serialize settings")
}

fn open_database(db_override: Option<&Path>) -> Result<Database> {
    let db_path = match db_override {
        Some(path) => path.to_path_buf(),
        None => get_database_path()?,
    };
    ensure_database_directory(&db_path)?;
    Database::open(&db_path).context("Failed to open database")
}

/// Gets the cross-platform database path.
///
/// Returns the path as `{data_dir}/tasklens/tasks.db` where `data_dir` is:
/// - Linux: `~/.local/share`
/// - macOS: `~/Library/Application Support`
/// - Windows: `C:\Users\<user>\AppData\Roaming`
fn get_database_path() -> Result<PathBuf> {
    let data_dir =
        dirs::data_dir().ok_or_else(|| anyhow::anyhow!("Failed to determine data directory"))?;

    Ok(data_dir.join("tasklens").join("tasks.db"))
}

/// Ensures the parent directory of the database file exists.
fn ensure_database_directory(db_path: &Path) -> Result<()> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create database directory: {}", parent.display())
        })?;
    }
    Ok(())
}
