mod client;

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use client::DaemonClient;

#[derive(Parser, Debug)]
#[command(name = "frpc-ctl", version, about = "Control the frpc supervisor daemon")]
struct Cli {
    /// Daemon base URL
    #[arg(long, global = true)]
    url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the config and launch frpc
    Start {
        /// frpc configuration file (TOML)
        file: PathBuf,
    },
    /// Stop frpc (SIGTERM, then kill after the daemon's timeout)
    Stop {
        /// Wait for shutdown to finish and print how it ended
        #[arg(long)]
        wait: bool,
    },
    /// Print buffered frpc output
    Logs {
        /// Keep polling until Ctrl+C
        #[arg(short, long)]
        follow: bool,
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },
    /// Show daemon and frpc state
    Status,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("✗ Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let client = DaemonClient::new(cli.url.as_deref())?;

    match cli.command {
        Command::Start { file } => {
            let config = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let result = client.start(&config).await?;
            println!("✓ {}", result);
        }
        Command::Stop { wait } => {
            let data = client.stop(wait).await?;
            match data.get("outcome") {
                Some(outcome) => println!("✓ stopped ({})", outcome),
                None => println!("✓ stopping"),
            }
        }
        Command::Logs { follow, interval_ms } => {
            print_logs(&client, follow, Duration::from_millis(interval_ms)).await?;
        }
        Command::Status => {
            let status = client.status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }
    Ok(())
}

async fn print_logs(client: &DaemonClient, follow: bool, interval: Duration) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout();
    loop {
        let logs = client.drain_logs().await?;
        stdout.write_all(logs.as_bytes())?;
        stdout.flush()?;
        if !follow {
            return Ok(());
        }
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_start_with_url() {
        let cli = Cli::parse_from(["frpc-ctl", "--url", "http://127.0.0.1:9000", "start", "frpc.toml"]);
        assert_eq!(cli.url.as_deref(), Some("http://127.0.0.1:9000"));
        assert!(matches!(cli.command, Command::Start { ref file } if file == &PathBuf::from("frpc.toml")));
    }

    #[test]
    fn parses_logs_follow_defaults() {
        let cli = Cli::parse_from(["frpc-ctl", "logs", "-f"]);
        match cli.command {
            Command::Logs { follow, interval_ms } => {
                assert!(follow);
                assert_eq!(interval_ms, 1000);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn stop_wait_flag() {
        let cli = Cli::parse_from(["frpc-ctl", "stop", "--wait"]);
        assert!(matches!(cli.command, Command::Stop { wait: true }));
    }

    #[tokio::test]
    async fn start_with_missing_file_fails_before_request() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cli = Cli::parse_from([
            "frpc-ctl",
            "--url",
            "http://127.0.0.1:1",
            "start",
            tmp.path().join("missing.toml").to_str().unwrap(),
        ]);
        let err = run(cli).await.unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }
}
