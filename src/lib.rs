pub mod commands;
pub mod config;
pub mod db;
pub mod errors;
pub mod lifecycle;
pub mod models;
pub mod navigation;
pub mod service;
pub mod storage;
pub mod views;

use crate::commands::{handle_raw, Session};
use crate::config::BootConfig;
use crate::service::DriveService;
use anyhow::Context;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// Serves JSON-lines commands on stdin and writes one envelope per line to stdout.
pub async fn run() -> anyhow::Result<()> {
    let config = BootConfig::load().context("loading boot config")?;
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating data dir {}", config.data_dir.display()))?;
    init_tracing(&config).map_err(anyhow::Error::msg)?;

    let service = DriveService::new(&config).context("opening drive")?;
    tracing::info!(data_dir = %config.data_dir.display(), "drive ready");

    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    serve_lines(service, stdin, stdout).await
}

/// Handles one request per input line until EOF. Blank lines are skipped.
pub async fn serve_lines<R, W>(service: DriveService, reader: R, mut writer: W) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut session = Session::default();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let service = service.clone();
        let (response, returned) = tokio::task::spawn_blocking(move || {
            let response = handle_raw(&service, &mut session, &line);
            (response, session)
        })
        .await
        .context("command worker panicked")?;
        session = returned;

        let mut encoded = serde_json::to_vec(&response)?;
        encoded.push(b'\n');
        writer.write_all(&encoded).await?;
        writer.flush().await?;
    }
    Ok(())
}

fn init_tracing(config: &BootConfig) -> Result<(), String> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter));

    if !config.log_to_file {
        // stdout carries responses, so console logs go to stderr.
        return tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|error| error.to_string());
    }

    let log_dir = config.log_dir();
    std::fs::create_dir_all(&log_dir).map_err(|error| error.to_string())?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "drive.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_one_envelope_per_line() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = BootConfig {
            data_dir: dir.path().to_path_buf(),
            ..BootConfig::default()
        };
        let service = DriveService::new(&config).expect("service");

        let input = concat!(
            "{\"action\":\"create\",\"name\":\"Projects\",\"kind\":\"folder\"}\n",
            "\n",
            "{\"action\":\"selectView\",\"view\":\"trash\"}\n",
            "garbage\n",
        );
        let mut output = Vec::new();
        serve_lines(service, input.as_bytes(), &mut output).await.expect("serve");

        let responses: Vec<serde_json::Value> = String::from_utf8(output)
            .expect("utf8")
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect();
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0]["success"], true);
        assert_eq!(responses[1]["data"]["view"], "trash");
        assert_eq!(responses[2]["success"], false);
    }
}
