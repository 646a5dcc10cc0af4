//! Lineage CLI - Command-line interface for the script lineage store.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use lineage_core::{LineageConfig, ProjectRows};
use lineage_service::{
    CanonicalParams, EditParams, LineageService, PathParams, ToolResult, UpdateParams,
};

/// Lineage - derivation history of AI-assisted script projects
#[derive(Parser)]
#[command(name = "lineage")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database path (default from config, else the local data directory)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Config file (default: search the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Project to operate on (default from config)
    #[arg(short, long, global = true)]
    project: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Import a JSON dump of project rows
    Import {
        /// File holding documents, transforms and edge rows
        file: PathBuf,
    },

    /// Find the latest version of a document path
    Resolve {
        document_id: String,

        /// Derivation path, e.g. `[0]` or `title`
        #[arg(default_value = "$")]
        path: String,
    },

    /// Show the canonical document of each category
    Canonical,

    /// Check whether a document path has a human edit
    Override {
        document_id: String,

        #[arg(default_value = "$")]
        path: String,
    },

    /// Show what editing a document path would do
    Editable {
        document_id: String,

        #[arg(default_value = "$")]
        path: String,
    },

    /// Create a human edit of a document path
    Edit {
        document_id: String,

        #[arg(default_value = "$")]
        path: String,

        /// Transform name
        #[arg(long, default_value = "edit")]
        name: String,

        /// Field to set, as key=value (value parsed as JSON, else taken as text)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        fields: Vec<String>,
    },

    /// Replace the data of a user-input document
    Update {
        document_id: String,

        /// New data as JSON
        data: String,
    },

    /// Show the lineage chain of a document path
    History {
        document_id: String,

        #[arg(default_value = "$")]
        path: String,
    },

    /// Show statistics
    Stats,
}

fn load_config(
    config: Option<PathBuf>,
    database: Option<PathBuf>,
    project: Option<String>,
) -> Result<LineageConfig, Box<dyn std::error::Error>> {
    let mut config = match config {
        Some(path) => LineageConfig::load(&path)?,
        None => LineageConfig::load_default()?,
    };
    if let Some(path) = database {
        config.database.path = path;
    }
    if project.is_some() {
        config.sync.default_project = project;
    }
    Ok(config)
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = load_config(cli.config, cli.database, cli.project.clone())?;
    let project_id = cli.project;

    match cli.command {
        Commands::Init => {
            init_database(config)?;
        }
        Commands::Import { file } => {
            let service = get_service(config)?;
            import(&service, &file).await?;
        }
        Commands::Resolve { document_id, path } => {
            let service = get_service(config)?;
            let params = path_params(project_id, document_id, path);
            report(service.resolve(params).await);
        }
        Commands::Canonical => {
            let service = get_service(config)?;
            report(service.canonical(CanonicalParams { project_id }).await);
        }
        Commands::Override { document_id, path } => {
            let service = get_service(config)?;
            let params = path_params(project_id, document_id, path);
            report(service.check_override(params).await);
        }
        Commands::Editable { document_id, path } => {
            let service = get_service(config)?;
            let params = path_params(project_id, document_id, path);
            report(service.editable(params).await);
        }
        Commands::Edit {
            document_id,
            path,
            name,
            fields,
        } => {
            let service = get_service(config)?;
            let params = EditParams {
                project_id,
                document_id,
                path,
                transform_name: name,
                field_updates: parse_fields(&fields)?,
            };
            report(service.edit(params).await);
        }
        Commands::Update { document_id, data } => {
            let service = get_service(config)?;
            let params = UpdateParams {
                project_id,
                document_id,
                data: serde_json::from_str(&data)?,
            };
            report(service.update(params).await);
        }
        Commands::History { document_id, path } => {
            let service = get_service(config)?;
            let params = path_params(project_id, document_id, path);
            report(service.history(params).await);
        }
        Commands::Stats => {
            let service = get_service(config)?;
            report(service.stats(project_id.as_deref()).await);
        }
    }

    Ok(())
}

fn init_database(config: LineageConfig) -> Result<(), Box<dyn std::error::Error>> {
    let db_path = config.database.path.clone();
    // Opening the service creates the file and schema
    let _service = LineageService::new(config)?;
    println!("Initialized database at: {}", db_path.display());
    Ok(())
}

fn get_service(config: LineageConfig) -> Result<LineageService, Box<dyn std::error::Error>> {
    if !config.database.path.exists() {
        eprintln!(
            "Database does not exist. Run 'lineage init' first, or specify a path with -d."
        );
        std::process::exit(1);
    }

    Ok(LineageService::new(config)?)
}

fn path_params(project_id: Option<String>, document_id: String, path: String) -> PathParams {
    PathParams {
        project_id,
        document_id,
        path,
    }
}

async fn import(service: &LineageService, file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let content = fs::read_to_string(file)?;
    let rows: ProjectRows = serde_json::from_str(&content)?;
    println!(
        "Importing {} documents and {} transforms from {}...",
        rows.documents.len(),
        rows.transforms.len(),
        file.display()
    );
    report(service.import(rows).await);
    Ok(())
}

fn parse_fields(fields: &[String]) -> Result<Map<String, Value>, String> {
    let mut updates = Map::new();
    for field in fields {
        let (key, raw) = field
            .split_once('=')
            .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", field))?;
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        updates.insert(key.to_string(), value);
    }
    Ok(updates)
}

fn report(result: ToolResult) {
    if result.success {
        println!("{}", result.message);
    } else {
        eprintln!("Error: {}", result.message);
        std::process::exit(1);
    }
}
