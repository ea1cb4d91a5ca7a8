use anyhow::Context as AnyhowContext;
use clap::{Parser, Subcommand};
use flowtree::compiler::loader;
use flowtree::config::{Config, load_config};
use flowtree::nodes::registry::VariantRegistry;
use flowtree::overlay::ExecutionRecord;
use flowtree::runtime::catalog::{StaticCatalog, TaskCatalog};
use flowtree::runtime::session::WorkflowSession;
use flowtree::tree::WorkflowTree;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the node tree of a definition file
    Inspect {
        /// Path to the workflow JSON or YAML file
        file: PathBuf,
        /// Task catalog used to label steps
        #[arg(long)]
        catalog: Option<PathBuf>,
        /// Print the render view as JSON instead of an outline
        #[arg(long)]
        json: bool,
    },
    /// Build and re-serialize a definition, reporting any drift
    Roundtrip {
        file: PathBuf,
        /// Write the re-serialized definition here
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Overlay execution records (a JSON list) onto a definition
    Overlay { file: PathBuf, records: PathBuf },
    /// Load a definition through the configured store
    Fetch {
        name: String,
        #[arg(long)]
        version: Option<u32>,
        /// Configuration file; defaults to the in-memory store
        #[arg(long)]
        config: Option<PathBuf>,
        /// Apply one poll of this execution's records
        #[arg(long)]
        execution: Option<String>,
    },
}

fn build(file: &Path) -> anyhow::Result<WorkflowTree> {
    let definition = loader::load_workflow(file)?;
    info!("Loaded workflow: {}", definition.name);
    Ok(WorkflowTree::build(definition, Arc::new(VariantRegistry::standard())))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect {
            file,
            catalog,
            json,
        } => {
            let tree = build(&file)?;
            if json {
                let catalog = catalog.as_deref().map(StaticCatalog::load).transpose()?;
                let view = tree.render_view(catalog.as_ref().map(|c| c as &dyn TaskCatalog));
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                print!("{}", tree.outline());
            }
        }
        Commands::Roundtrip { file, output } => {
            let original = loader::load_workflow(&file)?;
            let tree = WorkflowTree::build(original.clone(), Arc::new(VariantRegistry::standard()));
            let serialized = tree.serialize().context("Workflow tree could not be serialized")?;
            if serialized == original {
                info!("Round trip is lossless ({} nodes)", tree.len());
            } else {
                warn!("Round trip changed the definition; see the logged anomalies");
            }
            match output {
                Some(path) => loader::save_workflow(&path, &serialized)?,
                None => println!("{}", serde_json::to_string_pretty(&serialized)?),
            }
        }
        Commands::Overlay { file, records } => {
            let mut tree = build(&file)?;
            let content = fs::read_to_string(&records)
                .with_context(|| format!("Failed to read records file {}", records.display()))?;
            let records: Vec<ExecutionRecord> =
                serde_json::from_str(&content).context("Failed to parse execution records")?;
            let report = tree.apply_execution(records);
            info!(
                "Applied {} records, discarded {}, {} for joins",
                report.applied, report.discarded, report.derived
            );
            print!("{}", tree.outline());
        }
        Commands::Fetch {
            name,
            version,
            config,
            execution,
        } => {
            let config = match config {
                Some(path) => load_config(&path)?,
                None => Config::default(),
            };
            let store = config.open_store()?;
            let catalog = config
                .open_catalog()?
                .map(|c| Arc::new(c) as Arc<dyn TaskCatalog>);
            let registry = Arc::new(VariantRegistry::standard());
            let (session, worker) = WorkflowSession::spawn(registry, store, catalog);

            session.load(&name, version);
            let watch = match execution {
                Some(id) => Some(session.watch_execution(
                    config.open_feed()?,
                    &id,
                    config.feed.poll_interval(),
                )),
                None => None,
            };
            // Give the fetch and one poll time to land.
            tokio::time::sleep(config.feed.poll_interval()).await;

            let status = session.status().await?;
            match status.workflow {
                Some(workflow) => info!("Loaded workflow: {} (generation {})", workflow, status.generation),
                None => anyhow::bail!("Workflow {} could not be loaded", name),
            }
            let definition = session.serialize().await?;
            println!("{}", serde_json::to_string_pretty(&definition)?);
            for (id, summary) in session.summaries().await? {
                if let Some(latest) = summary.latest() {
                    println!("{}: {} ({} iterations)", id, latest.status, summary.iteration_count());
                }
            }

            if let Some(watch) = watch {
                watch.abort();
            }
            session.shutdown().await?;
            worker.await?;
        }
    }

    Ok(())
}
