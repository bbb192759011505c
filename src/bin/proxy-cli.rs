use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use forward_proxy::admin::handlers::SystemStatus;

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Query a running forward proxy through its admin API", long_about = None)]
struct Cli {
    /// Base URL of the admin API
    #[arg(short, long, default_value = "http://127.0.0.1:8081")]
    url: String,

    /// Admin bearer token
    #[arg(short, long, env = "PROXY_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version, state and live connection count as JSON
    Status,
    /// Print only the number of in-flight client connections
    Connections,
}

async fn fetch_status(cli: &Cli) -> Result<SystemStatus, Box<dyn std::error::Error>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let res = client
        .get(format!("{}/admin/status", cli.url.trim_end_matches('/')))
        .bearer_auth(&cli.key)
        .send()
        .await?;

    let code = res.status();
    if !code.is_success() {
        let body = res.text().await.unwrap_or_default();
        return Err(format!("admin API answered {code}: {body}").into());
    }
    Ok(res.json().await?)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let status = match fetch_status(&cli).await {
        Ok(status) => status,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Status => match serde_json::to_string_pretty(&status) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error: {e}");
                return ExitCode::FAILURE;
            }
        },
        Commands::Connections => println!("{}", status.client_connections),
    }
    ExitCode::SUCCESS
}
