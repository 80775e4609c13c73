use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

use submission_sdk::{Attachment, ClientConfig, Record, RelayClient};

#[derive(Parser)]
#[command(name = "relay-cli")]
#[command(about = "Operator and test CLI for the submission relay", long_about = None)]
struct Cli {
    /// Admin API base URL.
    #[arg(short, long, default_value = "http://127.0.0.1:8006")]
    url: String,

    /// Admin API key.
    #[arg(short, long, env = "RELAY_ADMIN_KEY", default_value = "")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check relay status
    Status,
    /// List configured forms and their submission counts
    Forms,
    /// Ask the relay for a form's maximum submission size
    MaxSize {
        /// Relay base URL including any base path.
        #[arg(long, default_value = "http://localhost:8005")]
        relay: String,
        /// Form identifier.
        #[arg(long)]
        form: Option<String>,
        /// External form definition URL, used without a form identifier.
        #[arg(long)]
        xform_url: Option<String>,
    },
    /// Submit a record XML file and its attachments
    Submit {
        #[arg(long, default_value = "http://localhost:8005")]
        relay: String,
        #[arg(long)]
        form: String,
        /// Instance identifier, e.g. uuid:...
        #[arg(long)]
        instance_id: String,
        #[arg(long)]
        deprecated_id: Option<String>,
        /// Cookie header carrying the anti-forgery token.
        #[arg(long)]
        cookies: Option<String>,
        /// Record XML file.
        xml: PathBuf,
        /// Attachment files; each is sent under its file name.
        files: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Status => {
            let res = admin_get(&cli.url, &cli.key, "/admin/status").await?;
            print_response(res).await?;
        }
        Commands::Forms => {
            let res = admin_get(&cli.url, &cli.key, "/admin/forms").await?;
            print_response(res).await?;
        }
        Commands::MaxSize {
            relay,
            form,
            xform_url,
        } => {
            let config = ClientConfig {
                relay_url: relay,
                form_id: form,
                xform_url,
                ..ClientConfig::default()
            };
            let size = RelayClient::new(config).max_submission_size().await;
            println!("{size}");
        }
        Commands::Submit {
            relay,
            form,
            instance_id,
            deprecated_id,
            cookies,
            xml,
            files,
        } => {
            let mut record = Record::new(instance_id, tokio::fs::read_to_string(&xml).await?);
            if let Some(id) = deprecated_id {
                record = record.with_deprecated_id(id);
            }
            for path in files {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .ok_or_else(|| format!("not a file: {}", path.display()))?;
                record = record.with_file(Attachment::new(name, tokio::fs::read(&path).await?));
            }

            let client = RelayClient::new(ClientConfig::for_form(relay, form));
            let uploader = match cookies {
                Some(cookies) => client.record_uploader_with_cookies(&cookies).await,
                None => client.record_uploader().await,
            };
            eprintln!("Uploading with limit {} bytes", uploader.limit());

            match uploader.upload_record(&record).await {
                Ok(outcome) => println!("{}", serde_json::to_string_pretty(&outcome)?),
                Err(e) => {
                    eprintln!("Error: {e}");
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

async fn admin_get(base: &str, key: &str, path: &str) -> Result<reqwest::Response, Box<dyn std::error::Error>> {
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {key}"))?);

    Ok(reqwest::Client::new()
        .get(format!("{}{}", base.trim_end_matches('/'), path))
        .headers(headers)
        .send()
        .await?)
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
