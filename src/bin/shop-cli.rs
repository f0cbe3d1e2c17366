use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "shop-cli")]
#[command(about = "Operator CLI for the shop resilience service", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Admin API key (Bearer token)
    #[arg(short, long, env = "SHOP_ADMIN_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show breaker, store and queue health
    Status,
    /// List circuit breakers and their rolling stats
    Breakers,
    /// Drop a single cache entry by exact key
    Invalidate {
        /// e.g. cache:public:/products/X1
        key: String,
    },
    /// Drop every entry in the shared store
    Flush,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let request = match cli.command {
        Commands::Status => client.get(format!("{}/status", cli.url)),
        Commands::Breakers => client
            .get(format!("{}/admin/breakers", cli.url))
            .headers(headers),
        Commands::Invalidate { key } => client
            .post(format!("{}/admin/cache/invalidate", cli.url))
            .headers(headers)
            .json(&json!({ "key": key })),
        Commands::Flush => client
            .post(format!("{}/admin/cache/flush", cli.url))
            .headers(headers),
    };

    print_response(request.send().await?).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: service returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
