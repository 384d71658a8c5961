// src/main.rs

use pipedag::engine::JobOutcome;
use pipedag::{cli, logging, run};

#[tokio::main]
async fn main() {
    let args = cli::parse();
    if let Err(err) = logging::init_logging(args.log_level) {
        eprintln!("pipedag error: {err:?}");
        std::process::exit(JobOutcome::PreExecutionError.code());
    }

    match run(args).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("pipedag error: {err:?}");
            std::process::exit(JobOutcome::PreExecutionError.code());
        }
    }
}
