use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Management CLI for the rerank proxy", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8000")]
    url: String,

    /// Status endpoint path
    #[arg(long, default_value = "/rerank/status")]
    status_path: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the proxy status document
    Status,
    /// Run a search through the proxy
    Search {
        /// Query text
        #[arg(short, long)]
        query: String,
        /// Index to search; omitted searches `/_search`
        #[arg(short, long)]
        index: Option<String>,
        /// Number of results to return
        #[arg(short, long)]
        size: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    match cli.command {
        Commands::Status => {
            let res = client.get(format!("{}{}", base, cli.status_path)).send().await?;
            print_response(res).await?;
        }
        Commands::Search { query, index, size } => {
            let path = match index {
                Some(index) => format!("/{}/_search", index.trim_matches('/')),
                None => "/_search".to_string(),
            };
            let mut body = json!({ "query": query });
            if let Some(size) = size {
                body["size"] = json!(size);
            }
            let res = client.post(format!("{}{}", base, path)).json(&body).send().await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: proxy returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
