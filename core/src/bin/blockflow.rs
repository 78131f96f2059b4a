/// Blockflow CLI
///
/// Runs `.flow`, JSON or TOML flowcharts in the terminal and checks them
/// for validation errors.

use blockflow_core::cli;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run_cli().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
