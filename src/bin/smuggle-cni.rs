use anyhow::Result;
use smuggle_cni::commands::run_cni;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn main() -> Result<()> {
    // Set up tracing; stdout belongs to the CNI result
    let filter = EnvFilter::try_from_env("SMUGGLE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);

    // Run the CNI plugin, reporting failures in CNI format
    if let Err(reply) = run_cni() {
        reply.print()?;
        std::process::exit(1);
    }

    Ok(())
}
