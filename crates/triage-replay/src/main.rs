#![forbid(unsafe_code)]

use clap::Parser;
use triage_replay::cli::Cli;

fn main() {
    let cli = Cli::parse();
    let json = cli.json;
    if let Err(error) = triage_replay::run(cli) {
        if json {
            eprintln!(
                "{}",
                serde_json::json!({
                    "status": "error",
                    "error": error.to_string(),
                    "exit_code": error.exit_code(),
                })
            );
        } else {
            eprintln!("{error}");
        }
        std::process::exit(error.exit_code());
    }
}
