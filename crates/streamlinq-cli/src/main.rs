//! streamlinq
//!
//! Renders ksqlDB statements from a model file of entities and queries.
//!
//! ```bash
//! # CREATE STREAM/TABLE statements for every entity
//! streamlinq --model model.yaml ddl
//!
//! # Statement text for one query
//! streamlinq --model model.yaml render --query large_sales
//!
//! # Persistent query writing into a new topic
//! streamlinq --model model.yaml render --query totals --create-as ProductTotals --sink-topic product-totals
//!
//! # Plan diagnostics as JSON
//! streamlinq --model model.yaml plan --query totals
//! ```
//!
//! Statements are written to stdout, logs to stderr (see `logging`).

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use streamlinq_cli::{logging, Config, Model, QueryModel};
use streamlinq_ksql::{StatementCache, Translator};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "streamlinq")]
#[command(about = "Translate stream queries into ksqlDB statements", long_about = None)]
struct Cli {
    /// Configuration file; defaults plus environment overrides when omitted
    #[arg(short, long, env = "STREAMLINQ_CONFIG")]
    config: Option<PathBuf>,

    /// Entity and query model
    #[arg(short, long, env = "STREAMLINQ_MODEL")]
    model: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print CREATE STREAM / CREATE TABLE statements
    Ddl {
        /// Only this entity
        #[arg(short, long)]
        entity: Option<String>,

        /// Print the column definitions as JSON instead of statements
        #[arg(long)]
        json: bool,
    },
    /// Print statement text for queries
    Render {
        /// Only this query
        #[arg(short, long)]
        query: Option<String>,

        /// Wrap the query in CREATE ... AS SELECT with this object name
        #[arg(long, requires = "sink_topic")]
        create_as: Option<String>,

        /// Topic for the persistent query's output
        #[arg(long, requires = "create_as")]
        sink_topic: Option<String>,
    },
    /// Print plan diagnostics as JSON
    Plan {
        #[arg(short, long)]
        query: Option<String>,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::from_env().context("Invalid configuration in environment")?,
    };
    config.apply_logging_env();
    logging::init();

    let model = Model::load(&cli.model)
        .with_context(|| format!("Failed to load model from {}", cli.model.display()))?;
    info!(
        entities = model.entities.len(),
        queries = model.queries.len(),
        "Model loaded"
    );

    let translator = Translator::with_settings(config.translation.settings());

    match cli.command {
        Commands::Ddl { entity, json } => ddl(&model, &translator, entity.as_deref(), json),
        Commands::Render {
            query,
            create_as,
            sink_topic,
        } => {
            let sink = create_as.zip(sink_topic);
            render(&model, &translator, query.as_deref(), sink)
        }
        Commands::Plan { query } => plan(&model, query.as_deref()),
    }
}

fn selected_queries<'a>(model: &'a Model, name: Option<&str>) -> Result<Vec<&'a QueryModel>> {
    match name {
        Some(name) => Ok(vec![model.query(name)?]),
        None => Ok(model.queries.iter().collect()),
    }
}

fn ddl(model: &Model, translator: &Translator, entity: Option<&str>, json: bool) -> Result<()> {
    let schemas = match entity {
        Some(name) => vec![model.schema(name)?],
        None => model.schemas(),
    };

    for schema in &schemas {
        if json {
            let ddl = translator
                .ddl(schema)
                .with_context(|| format!("Entity {}", schema.entity()))?;
            println!("{}", serde_json::to_string_pretty(&ddl)?);
        } else {
            let statement = translator
                .create_statement(schema)
                .with_context(|| format!("Entity {}", schema.entity()))?;
            println!("{}", statement);
        }
    }
    Ok(())
}

fn render(
    model: &Model,
    translator: &Translator,
    name: Option<&str>,
    sink: Option<(String, String)>,
) -> Result<()> {
    let queries = selected_queries(model, name)?;
    if sink.is_some() && queries.len() != 1 {
        bail!("--create-as needs exactly one query; pass --query");
    }

    let cache = StatementCache::new();
    for query in queries {
        let plan = model.plan(query)?;
        let topic = model.topic_for(query)?;

        if let Some((sink_name, sink_topic)) = &sink {
            let statement = translator
                .generator()
                .render_create_as(&plan, &topic, sink_name, sink_topic)
                .with_context(|| format!("Query {}", query.name))?;
            println!("{}", statement);
            continue;
        }

        if cache.is_registered(&plan, &topic) {
            warn!(query = %query.name, topic = %topic, "Query duplicates an earlier one");
        }
        let statement = cache
            .get_or_render(translator.generator(), &plan, &topic)
            .with_context(|| format!("Query {}", query.name))?;
        println!("{}", statement);
    }
    Ok(())
}

fn plan(model: &Model, name: Option<&str>) -> Result<()> {
    for query in selected_queries(model, name)? {
        let plan = model.plan(query)?;
        let diagnostics = plan.diagnostics();
        for warning in &diagnostics.warnings {
            warn!(query = %query.name, "{}", warning);
        }
        println!("{}", serde_json::to_string_pretty(&diagnostics)?);
    }
    Ok(())
}
