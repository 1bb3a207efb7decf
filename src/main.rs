//! Worker binary entrypoint.
//!
//! Stdout carries the wire protocol, so all logging goes to stderr.

use embedcss_worker::compiler::compile_command;
use embedcss_worker::service::ServiceBuilder;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("starting service");

    let status = ServiceBuilder::new()
        .command("compile", compile_command)
        .serve(tokio::io::stdin(), tokio::io::stdout())
        .await;

    std::process::exit(status);
}
