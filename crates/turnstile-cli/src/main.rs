use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use turnstile_client::{Client, Outcome};

const DEFAULT_URL: &str = "http://127.0.0.1:8777";

#[derive(Parser)]
#[command(name = "turnstile", about = "Turnstile face identification CLI")]
struct Cli {
    /// Daemon base URL (also read from TURNSTILE_URL)
    #[arg(long, env = "TURNSTILE_URL", default_value = DEFAULT_URL)]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Identify the person in a photo against a claimed identity
    Identify {
        /// Claimed identity ID
        #[arg(short, long)]
        id: String,
        /// Path to the probe photo (JPEG or PNG)
        image: PathBuf,
    },
    /// Show daemon status
    Status,
    /// Show the attempt history for an identity
    Attempts {
        /// Identity ID
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let client = Client::new(&cli.url);

    match cli.command {
        Commands::Identify { id, image } => {
            let report = client.identify_file(&id, &image).await?;
            match report.outcome {
                Outcome::Success => {
                    let confidence = report.confidence.unwrap_or(0.0);
                    println!("MATCH: {id} (confidence {confidence:.3})");
                    if let Some(position) = &report.position {
                        println!("  position: {position}");
                    }
                }
                Outcome::Failure => {
                    let reason = report.reason.as_deref().unwrap_or("unknown");
                    println!("NO MATCH: {id} ({reason})");
                    if let Some(confidence) = report.confidence {
                        println!("  confidence: {confidence:.3}");
                    }
                }
            }
            println!("  evidence: {} (attempt {})", report.evidence_path, report.attempt);
        }
        Commands::Status => {
            let status = client.status().await?;
            println!("turnstiled {}", status.version);
            println!("  identities: {}", status.identities);
            println!("  tolerance:  {}", status.tolerance);
        }
        Commands::Attempts { id } => {
            let record = client.attempts(&id).await?;
            println!("{}: {} attempt(s)", record.id, record.count);
            for ts in &record.timestamps {
                println!("  {ts}");
            }
        }
    }

    Ok(())
}
