use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tandem_store::{router, SnapshotLog};

/// Snapshot store for collaborative documents
#[derive(Parser, Debug)]
#[command(name = "tandem-store", version)]
struct Args {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 3000)]
    port: u16,

    /// Keep snapshots in this JSON file across restarts
    #[arg(long)]
    data_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let log = match &args.data_file {
        Some(path) => SnapshotLog::open(path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?,
        None => SnapshotLog::new(),
    };

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Snapshot store listening on http://{}", addr);

    axum::serve(listener, router(Arc::new(log))).await?;
    Ok(())
}
