use backup_run_cli::cli::replicate::{run, Cli};
use clap::Parser;

#[tokio::main]
async fn main() {
    let args = Cli::parse();
    std::process::exit(run(args).await);
}
