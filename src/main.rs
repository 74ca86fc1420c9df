use clap::Parser;
use poolkeeper::cli::{self, Cli, Commands};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let args = Cli::parse();

    let result = match &args.command {
        Commands::Run(run) => cli::run::execute(run).await,
        Commands::Config(arg) => cli::config::execute(arg.config.as_ref()),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
