// Alert sink: structured log event, terminal block, and JSON-lines file.
//
// All three outputs for one alert are written while holding a single async
// mutex, so alerts from concurrent community loops never interleave.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;

use super::traits::AlertSink;
use super::TriggerAlert;
use crate::output::terminal;

pub struct AlertLog {
    file: Mutex<Option<File>>,
    path: Option<PathBuf>,
    terminal: bool,
}

impl AlertLog {
    /// Append alerts to `path` (parent directories are created) and echo
    /// them to the terminal.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("Failed to open alert log {}", path.display()))?;

        Ok(Self {
            file: Mutex::new(Some(file)),
            path: Some(path.to_path_buf()),
            terminal: true,
        })
    }

    /// Log-only sink with no file and no terminal output.
    pub fn quiet() -> Self {
        Self {
            file: Mutex::new(None),
            path: None,
            terminal: false,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[async_trait]
impl AlertSink for AlertLog {
    async fn report_trigger(&self, alert: &TriggerAlert) -> Result<()> {
        let mut file = self.file.lock().await;

        info!(
            community = %alert.community,
            post_id = %alert.post_id,
            title = %alert.title,
            url = %alert.url,
            score = alert.score,
            current_rate = alert.current_rate,
            moving_avg_rate = alert.moving_avg_rate,
            comment_rate = alert.comment_rate,
            initial_rate = alert.initial_rate,
            followup_threshold = alert.thresholds.followup,
            snapshots = alert.snapshot_count,
            "Rising post detected in {}",
            alert.display_name
        );

        if self.terminal {
            terminal::display_alert(alert);
        }

        if let Some(file) = file.as_mut() {
            let mut line = serde_json::to_string(alert).context("Failed to encode alert")?;
            line.push('\n');
            file.write_all(line.as_bytes())
                .await
                .context("Failed to append alert")?;
            file.flush().await.context("Failed to flush alert log")?;
        }

        Ok(())
    }
}
