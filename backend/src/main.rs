//! Sheetsmith CLI - edit CSV files with natural-language instructions
//!
//! # Commands
//!
//! ```bash
//! sheetsmith serve                              # Start the model service (port 5000)
//! sheetsmith edit input.csv                     # Interactive editing session
//! sheetsmith apply input.csv --snippet "df = df.dropna()" -o out.csv
//! sheetsmith validate "df = df.head(3)"         # Check a snippet against the filter
//! sheetsmith operations                         # Show supported operations
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use sheetsmith::error::{CliError, CliResult};
use sheetsmith::{operations_description, parse_csv_file_auto, CodeGenerator, Repl, Reply, Settings};
use sheetsmith_editor::{
    check_snippet, export_csv_file, render_table, EditorSession, EngineRuntime, ModelServiceClient,
};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "sheetsmith")]
#[command(about = "Edit CSV files with natural-language instructions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the model service
    Serve {
        /// Port to listen on (default: SHEETSMITH_PORT or 5000)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run one snippet against a CSV file
    Apply {
        /// Input CSV file
        input: PathBuf,

        /// Transformation snippet, e.g. "df = df.dropna()"
        #[arg(short, long)]
        snippet: String,

        /// Output CSV file (default: print the table)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Interactive editing session
    Edit {
        /// Input CSV file
        input: PathBuf,

        /// Model service URL (default: SHEETSMITH_MODEL_URL)
        #[arg(long)]
        model_url: Option<String>,

        /// Model provider: openai, gemini, groq or anthropic
        #[arg(long)]
        provider: Option<String>,

        /// Apply suggested snippets without asking
        #[arg(long)]
        auto_apply: bool,
    },

    /// Check a snippet against the safety filter
    Validate {
        /// Snippet to check
        snippet: String,
    },

    /// Show supported operations
    Operations,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let settings = Settings::from_env();

    let result = match cli.command {
        Commands::Serve { port } => cmd_serve(&settings, port).await,
        Commands::Apply {
            input,
            snippet,
            output,
        } => cmd_apply(&settings, &input, &snippet, output.as_deref()).await,
        Commands::Edit {
            input,
            model_url,
            provider,
            auto_apply,
        } => cmd_edit(&settings, &input, model_url, provider, auto_apply).await,
        Commands::Validate { snippet } => cmd_validate(&snippet),
        Commands::Operations => {
            println!("{}", operations_description());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn runtime(settings: &Settings) -> Arc<EngineRuntime> {
    Arc::new(EngineRuntime::with_limits(settings.execution_limits()))
}

fn load(settings: &Settings, input: &Path, session: EditorSession) -> CliResult<EditorSession> {
    eprintln!("📄 Loading: {}", input.display());
    let parsed = parse_csv_file_auto(input)?;
    eprintln!("   Encoding: {}", parsed.encoding);
    eprintln!("   Delimiter: '{}'", format_delimiter(parsed.delimiter));
    eprintln!("   Columns: {}", parsed.headers.join(", "));
    eprintln!("   Rows: {}", parsed.dataset.len());

    let session = session.with_max_history(settings.max_history);
    session.load(parsed.dataset);
    Ok(session)
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

async fn cmd_serve(settings: &Settings, port: Option<u16>) -> CliResult<()> {
    let generator = CodeGenerator::new(settings.keys.clone());
    sheetsmith::start_server(port.unwrap_or(settings.port), generator).await?;
    Ok(())
}

async fn cmd_apply(
    settings: &Settings,
    input: &Path,
    snippet: &str,
    output: Option<&Path>,
) -> CliResult<()> {
    let session = load(settings, input, EditorSession::new(runtime(settings)))?;
    let result = session.apply(snippet).await?;
    eprintln!("⚙️  Applied: {} rows, {} columns", result.len(), result.columns().len());

    match output {
        Some(path) => {
            export_csv_file(&result, path)?;
            eprintln!("💾 Output written to: {}", path.display());
        }
        None => println!("{}", render_table(&result, true)),
    }
    Ok(())
}

async fn cmd_edit(
    settings: &Settings,
    input: &Path,
    model_url: Option<String>,
    provider: Option<String>,
    auto_apply: bool,
) -> CliResult<()> {
    let model = ModelServiceClient::new(model_url.unwrap_or_else(|| settings.model_url.clone()))
        .with_provider(provider.as_deref().unwrap_or(&settings.provider))
        .with_context_rows(settings.context_rows);
    eprintln!("🤖 Model service: {} ({})", model.base_url(), model.provider());

    let session = EditorSession::new(runtime(settings)).with_model(model);
    let session = Arc::new(load(settings, input, session)?);
    let mut repl = Repl::new(session, settings.edit_debounce).with_auto_apply(auto_apply);

    println!("{}", render_table(&repl.session().current(), true));
    eprintln!("Type :help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("> ");
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match repl.handle(&line).await {
            Ok(Reply::Quit) => break,
            Ok(Reply::Output(text)) if text.is_empty() => {}
            Ok(Reply::Output(text)) => println!("{}", text),
            // a failed command leaves the table as it was; keep going
            Err(e) => eprintln!("❌ {}", e),
        }
    }
    Ok(())
}

fn cmd_validate(snippet: &str) -> CliResult<()> {
    match check_snippet(snippet) {
        Ok(()) => {
            println!("✅ Snippet accepted");
            Ok(())
        }
        Err(rejection) => Err(CliError::Usage(format!("Snippet rejected: {}", rejection))),
    }
}
