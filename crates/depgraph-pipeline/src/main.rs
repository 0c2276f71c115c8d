use depgraph_pipeline::{loaders, workers};
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_help() {
    eprintln!("depgraph {VERSION} - PyPI dependency-graph ingestion pipeline");
    eprintln!();
    eprintln!("Usage: depgraph <COMMAND>");
    eprintln!();
    eprintln!("Subscribers (long-running):");
    eprintln!("  process-package-names        consume package names, enumerate versions/distributions");
    eprintln!("  process-distributions        consume distributions, extract requirements");
    eprintln!("  correlate-candidates         consume requirements, compute candidate versions");
    eprintln!("  reprocess-requirements       consume requirements, normalize extras arrays");
    eprintln!("  cdc-requirements-subscriber  feed requirement CDC events into correlation");
    eprintln!();
    eprintln!("Publishers (long-running):");
    eprintln!("  cdc-publisher                drain the CDC event log to the broker");
    eprintln!();
    eprintln!("One-shot:");
    eprintln!("  load-unprocessed             push stored records back onto their queues");
    eprintln!("  load-simple-index            discover package names from the Simple index");
    eprintln!("  load-popular-packages        discover the most-downloaded packages");
    eprintln!("  process-package-names-db     sweep stale package names from the database");
    eprintln!("  process-distributions-db     sweep unprocessed distributions from the database");
    eprintln!("  reprocess-requirements-db    sweep this shard's incomplete requirements");
    eprintln!("  propagate-dependency-names   make dependency names crawl targets");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --version   Print version information");
    eprintln!("  --help      Print this help message");
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        print_help();
        std::process::exit(2);
    };

    match command {
        "--version" | "-V" => {
            println!("depgraph {VERSION}");
            return;
        }
        "--help" | "-h" => {
            print_help();
            return;
        }
        _ => {}
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(command, "starting depgraph v{VERSION}");

    let result = match command {
        "process-package-names" => workers::package_names::run().await,
        "process-package-names-db" => workers::package_names::run_db().await,
        "propagate-dependency-names" => workers::package_names::propagate().await,
        "process-distributions" => workers::distributions::run().await,
        "process-distributions-db" => workers::distributions::run_db().await,
        "correlate-candidates" => workers::candidates::run().await,
        "reprocess-requirements" => workers::reprocess::run().await,
        "reprocess-requirements-db" => workers::reprocess::run_db_sweep().await,
        "cdc-publisher" => workers::cdc::run_publisher().await,
        "cdc-requirements-subscriber" => workers::cdc::run_requirements_subscriber().await,
        "load-unprocessed" => loaders::unprocessed::run().await,
        "load-simple-index" => loaders::simple_index::run().await,
        "load-popular-packages" => loaders::popular::run().await,
        unknown => {
            eprintln!("Unknown command: {unknown}");
            eprintln!("Run 'depgraph --help' for usage information.");
            std::process::exit(2);
        }
    };

    if let Err(error) = result {
        tracing::error!(%error, "exited with error");
        std::process::exit(1);
    }
}
