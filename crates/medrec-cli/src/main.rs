//! Cohort query binary.
//!
//! Usage: `medrec-query [QUERY_FILE]`. The request is read from stdin when
//! the file is `-` or omitted; the response is printed as JSON.

use std::sync::Arc;

use medrec_cli::{load_store, read_request, run_query, CliConfig};
use medrec_store::CohortQueryEngine;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so stdout carries only the response
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = CliConfig::from_env()?;
    let source = std::env::args().nth(1).unwrap_or_else(|| "-".to_string());

    let request = read_request(&source, std::io::stdin())?;

    tracing::info!("Loading clinical data from: {}", config.data_path.display());
    let store = load_store(&config.data_path)?;

    let engine = CohortQueryEngine::new(Arc::new(store), config.query_config());
    let response = run_query(&engine, &request)?;

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
