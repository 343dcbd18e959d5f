use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use etlgraph_catalog::{
    BigQueryAdapter, CatalogAdapter, Crawler, QueryAnalyzer, QueryLogExtractor, SqlParserAnalyzer,
    ViewReferenceResolver,
};
use etlgraph_core::{AnalyzerKind, Config, EdgeAggregator, ListingStore, SkipReason};

const DEFAULT_CONFIG_FILE: &str = "etlgraph.toml";

/// etlgraph - Table lineage graph for a BigQuery project
#[derive(Parser)]
#[command(name = "etlgraph")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: etlgraph.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl datasets and tables, then resolve the tables each view reads
    Crawl {
        /// Listing store root
        #[arg(long)]
        data_root: Option<PathBuf>,

        /// Project to crawl
        #[arg(short, long)]
        project: Option<String>,

        /// Reuse the table listing of an earlier crawl
        #[arg(long)]
        reuse_listing: bool,

        /// Resolve every view again instead of resuming
        #[arg(long)]
        fresh: bool,

        /// Also write the resolver summary as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Extract lineage edges from the project's query logs
    QueryLogs {
        /// Listing store root
        #[arg(long)]
        data_root: Option<PathBuf>,

        /// Project whose job history is read
        #[arg(short, long)]
        project: Option<String>,
    },

    /// Merge all lineage artifacts into edges.json and edges.csv
    Index {
        /// Listing store root
        #[arg(long)]
        data_root: Option<PathBuf>,

        /// Also write the aggregation summary as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let config = load_config(cli.config.as_deref(), cli.verbose)?;

    match cli.command {
        Commands::Crawl {
            data_root,
            project,
            reuse_listing,
            fresh,
            report,
        } => {
            let (root, project) = settings(&config, data_root, project);
            crawl_command(&config, &root, &project, reuse_listing, fresh, report.as_deref()).await
        }
        Commands::QueryLogs { data_root, project } => {
            let (root, project) = settings(&config, data_root, project);
            query_logs_command(&config, &root, &project).await
        }
        Commands::Index { data_root, report } => {
            let (root, _) = settings(&config, data_root, None);
            index_command(&root, report.as_deref(), cli.verbose)
        }
    }
}

fn load_config(path: Option<&Path>, verbose: bool) -> Result<Config> {
    if let Some(path) = path {
        return Config::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()));
    }

    let default = Path::new(DEFAULT_CONFIG_FILE);
    if default.exists() {
        return Config::from_file(default)
            .with_context(|| format!("Failed to load config {}", default.display()));
    }

    if verbose {
        eprintln!("{}", "No config file found, using defaults".yellow());
    }
    Ok(Config::default())
}

/// Listing root and project, command-line flags taking precedence
fn settings(config: &Config, data_root: Option<PathBuf>, project: Option<String>) -> (PathBuf, String) {
    (
        data_root.unwrap_or_else(|| config.resolved_data_root()),
        project.unwrap_or_else(|| config.project.clone()),
    )
}

async fn connect(config: &Config, project: &str) -> Result<Arc<BigQueryAdapter>> {
    match config.catalog.catalog_type.to_lowercase().as_str() {
        "bigquery" => {
            let adapter = BigQueryAdapter::connect(project, config.catalog.credentials.as_deref())
                .await
                .context("Failed to connect to BigQuery")?;
            Ok(Arc::new(adapter))
        }
        other => Err(anyhow::anyhow!(
            "Unsupported catalog type '{}'. Supported: bigquery",
            other
        )),
    }
}

fn analyzer(config: &Config, adapter: &Arc<BigQueryAdapter>) -> Arc<dyn QueryAnalyzer> {
    match config.resolver.analyzer {
        AnalyzerKind::DryRun => Arc::clone(adapter) as Arc<dyn QueryAnalyzer>,
        AnalyzerKind::SqlParser => Arc::new(SqlParserAnalyzer::default()),
    }
}

async fn crawl_command(
    config: &Config,
    root: &Path,
    project: &str,
    reuse_listing: bool,
    fresh: bool,
    report: Option<&Path>,
) -> Result<()> {
    let store = ListingStore::new(root);
    let adapter = connect(config, project).await?;
    let crawler = Crawler::new(adapter.as_ref(), &store, project);

    let tables = if reuse_listing {
        crawler.load_table_listing().context("Failed to read table listing")?
    } else {
        println!("{} {}", "Crawling".cyan(), project);
        let datasets = crawler.fetch_dataset_listing().await.context("Failed to list datasets")?;
        crawler.fetch_table_listing(&datasets).await.context("Failed to list tables")?
    };

    let catalog: Arc<dyn CatalogAdapter> = adapter.clone();
    let summary = ViewReferenceResolver::new(catalog, analyzer(config, &adapter))
        .with_config(config.resolver.clone())
        .fresh(fresh)
        .resolve(&tables, &crawler.project_dir())
        .await
        .context("Failed to resolve view references")?;

    if let Some(report) = report {
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(report, json)
            .with_context(|| format!("Failed to write report {}", report.display()))?;
    }

    println!();
    println!("{}", "View references:".bold());
    println!("  Views:            {}", summary.views);
    println!("  Resolved:         {}", summary.resolved.to_string().green());
    println!("  Already resolved: {}", summary.already_resolved);
    if summary.failed() > 0 {
        println!("  Failed:           {}", summary.failed().to_string().red());
        for failure in &summary.failures {
            println!(
                "    {} {}.{}.{}: {}",
                "✗".red(),
                failure.view.project_id,
                failure.view.dataset_id,
                failure.view.table_id,
                failure.error
            );
        }
    }
    println!("  Output:           {}", summary.output.display());

    Ok(())
}

async fn query_logs_command(config: &Config, root: &Path, project: &str) -> Result<()> {
    let store = ListingStore::new(root);
    let adapter = connect(config, project).await?;

    let summary = QueryLogExtractor::new(adapter.as_ref(), &store)
        .extract(project)
        .await
        .context("Failed to extract query-log edges")?;

    println!("{}", "Query-log edges:".bold());
    println!("  Rows:    {}", summary.rows);
    println!("  Edges:   {}", summary.edges.to_string().green());
    if summary.skipped > 0 {
        println!("  Skipped: {}", summary.skipped.to_string().yellow());
    }
    println!("  Output:  {}", summary.output.display());

    Ok(())
}

fn index_command(root: &Path, report: Option<&Path>, verbose: bool) -> Result<()> {
    let store = ListingStore::new(root);
    let aggregation = EdgeAggregator::new(&store)
        .run()
        .with_context(|| format!("Failed to index {}", root.display()))?;
    let summary = &aggregation.summary;

    if let Some(report) = report {
        summary
            .save_to_file(report)
            .with_context(|| format!("Failed to write report {}", report.display()))?;
    }

    println!("{}", "Lineage index:".bold());
    println!("  View reference files: {}", summary.view_reference_files);
    println!("  Query edgelist files: {}", summary.query_edgelist_files);
    println!("  Records read:         {}", summary.records_read);
    println!("  Unique edges:         {}", summary.unique_edges.to_string().green());
    println!("  Duplicates dropped:   {}", summary.duplicates());

    if !summary.skipped.is_empty() {
        println!("  Skipped inputs:       {}", summary.skipped.len().to_string().yellow());
        for reason in [
            SkipReason::UnreadableFile,
            SkipReason::MalformedRecord,
            SkipReason::InvalidDestination,
            SkipReason::InvalidReference,
        ] {
            let count = summary.skipped_with(reason);
            if count > 0 {
                println!("    {}: {}", reason, count);
            }
        }
        if verbose {
            for skip in &summary.skipped {
                match skip.line {
                    Some(line) => eprintln!("    {} {}:{} {}", "⚠".yellow(), skip.path.display(), line, skip.message),
                    None => eprintln!("    {} {} {}", "⚠".yellow(), skip.path.display(), skip.message),
                }
            }
        }
    }

    println!(
        "{} {} and {}",
        "Wrote".green(),
        store.path(etlgraph_core::EDGES_JSON).display(),
        store.path(etlgraph_core::EDGES_CSV).display()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_override_config() {
        let config = Config::from_toml("data_root = \"/srv/lineage\"\nproject = \"from-config\"\n").unwrap();

        let (root, project) = settings(&config, None, None);
        assert_eq!(root, PathBuf::from("/srv/lineage"));
        assert_eq!(project, "from-config");

        let (root, project) = settings(&config, Some(PathBuf::from("out")), Some("from-flag".to_string()));
        assert_eq!(root, PathBuf::from("out"));
        assert_eq!(project, "from-flag");
    }

    #[test]
    fn parses_subcommands() {
        let cli = Cli::try_parse_from(["etlgraph", "--verbose", "crawl", "--project", "p", "--fresh"]).unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Crawl { project, fresh, reuse_listing, .. } => {
                assert_eq!(project.as_deref(), Some("p"));
                assert!(fresh);
                assert!(!reuse_listing);
            }
            _ => panic!("Expected crawl"),
        }

        let cli = Cli::try_parse_from(["etlgraph", "index", "--data-root", "public/data"]).unwrap();
        assert!(matches!(cli.command, Commands::Index { data_root: Some(_), report: None }));
    }

    #[test]
    fn index_writes_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("data");
        let report = dir.path().join("summary.json");

        index_command(&root, Some(&report), false).unwrap();

        assert_eq!(std::fs::read_to_string(root.join("edges.csv")).unwrap(), "Source,Target\n");
        assert_eq!(std::fs::read_to_string(root.join("edges.json")).unwrap(), "[]");
        assert!(report.exists());
    }

    #[test]
    fn unsupported_catalog_type() {
        let config = Config::from_toml("[catalog]\ntype = \"oracle\"\n").unwrap();
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let err = runtime.block_on(connect(&config, "p")).err().unwrap();
        assert!(err.to_string().contains("Unsupported catalog type"));
    }
}
