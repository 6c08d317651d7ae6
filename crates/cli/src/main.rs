use std::{path::Path, process};

use clap::{Parser, Subcommand};

mod run;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Kinescope - browse Kinesis streams over HTTP", long_about = None)]
struct Opts {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, PartialEq, Clone, Debug)]
enum Command {
    /// Start the Kinesis worker and the HTTP gateway
    Run(run::RunCommand),
}

#[tokio::main]
async fn main() {
    // Must run before parsing so flags can fall back to values from .env
    load_env_file(Path::new("."));

    let opts: Opts = match Opts::try_parse() {
        Ok(opts) => opts,
        Err(e) => {
            let _ = e.print();
            process::exit(e.exit_code());
        }
    };

    if let Err(e) = handle_command(opts).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Load environment variables from a .env file in `dir`
fn load_env_file(dir: &Path) {
    let env_file_path = dir.join(".env");

    match dotenvy::from_path(&env_file_path) {
        Ok(_) => {
            eprintln!("✓ Loaded environment from {}", env_file_path.display());
        }
        Err(e) if e.not_found() => {}
        Err(e) => {
            eprintln!(
                "Warning: Failed to load .env file at {}: {}",
                env_file_path.display(),
                e
            );
        }
    }
}

async fn handle_command(opts: Opts) -> Result<(), String> {
    match opts.command {
        Command::Run(cmd) => cmd.execute().await,
    }
}
