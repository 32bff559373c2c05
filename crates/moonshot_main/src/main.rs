use clap::Parser;
use moonshot::{execute, init_tracing, log_dir, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let guard = init_tracing(log_dir(), cli.verbose)?;

    let code = execute(cli).await?;

    drop(guard);
    std::process::exit(code);
}
