//! CLI commands

use anyhow::{Context, Result};
use colored::Colorize;
use memorybank_core::{PersistedState, StorageConfig};
use memorybank_state::{
    ChangeNotifier, KeyValueBackend, PersistenceManager, SharedKeyValueBackend,
    StructuredBackend,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

use crate::sample::sample_state;

/// Everything a command needs: the manager and a handle on the key-value
/// backend for change watching
pub struct Workspace {
    config: StorageConfig,
    manager: PersistenceManager,
    key_value: SharedKeyValueBackend,
}

impl Workspace {
    pub fn open(config: StorageConfig) -> Self {
        let key_value = Arc::new(KeyValueBackend::from_config(&config));
        let manager = PersistenceManager::with_backends(
            Arc::new(StructuredBackend::from_config(&config)),
            key_value.clone(),
            &config.schema_version,
        );
        Self {
            config,
            manager,
            key_value,
        }
    }

    pub fn manager(&self) -> &PersistenceManager {
        &self.manager
    }

    /// Print backend availability and stored size
    pub async fn info(&self) -> Result<()> {
        let info = self.manager.storage_info().await;

        println!("{}", "Memory Bank".bold());
        println!("==================");
        println!("Data dir:       {}", self.config.data_dir.display());
        println!("Schema version: {}", self.manager.schema_version());
        println!("Structured:     {}", availability(info.structured_available));
        println!("Key-value:      {}", availability(info.key_value_available));
        match info.preferred {
            Some(kind) => println!("Preferred:      {}", kind),
            None => println!("Preferred:      {}", "none (degraded)".red()),
        }
        println!("Stored size:    {} bytes", info.approximate_size_bytes);

        if let Some(state) = self.manager.load().await? {
            print_summary(&state);
        }
        Ok(())
    }

    /// Persist the sample dataset
    pub async fn seed(&self) -> Result<()> {
        let state = sample_state();
        self.manager.save(&state).await.context("saving sample data")?;
        println!("{} Sample data saved", "✓".green());
        print_summary(&state);
        Ok(())
    }

    /// Write an export document to `output`, or stdout
    pub async fn export(&self, output: Option<&Path>) -> Result<()> {
        let document = self.manager.export().await?;
        write_document(&document, output)
    }

    pub async fn import(&self, input: &Path) -> Result<()> {
        let document = read_document(input)?;
        let state = self.manager.import(&document).await?;
        println!("{} Imported {}", "✓".green(), input.display());
        print_summary(&state);
        Ok(())
    }

    /// Write a backup document to `output`, or a timestamped file in the data dir
    pub async fn backup(&self, output: Option<PathBuf>) -> Result<()> {
        let document = self.manager.create_backup().await?;
        let path = output.unwrap_or_else(|| {
            let stamp = chrono::Utc::now().format("%Y-%m-%d-%H%M%S");
            self.config.data_dir.join(format!("backup-{}.json", stamp))
        });
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        write_document(&document, Some(path.as_path()))?;
        println!("{} Backup written to {}", "✓".green(), path.display());
        Ok(())
    }

    pub async fn restore(&self, input: &Path) -> Result<()> {
        let document = read_document(input)?;
        let state = self.manager.restore_backup(&document).await?;
        println!("{} Restored {}", "✓".green(), input.display());
        print_summary(&state);
        Ok(())
    }

    /// Clear stored data, asking first unless `assume_yes`
    pub async fn clear(&self, assume_yes: bool) -> Result<()> {
        if !assume_yes {
            let confirmed = dialoguer::Confirm::new()
                .with_prompt("Delete all stored data?")
                .default(false)
                .interact()?;
            if !confirmed {
                println!("Aborted.");
                return Ok(());
            }
        }

        self.manager.clear().await?;
        println!("{} Memory bank cleared", "✓".green());
        Ok(())
    }

    /// Print a line for every change made by another process until Ctrl-C
    pub async fn watch(&self) -> Result<()> {
        let interval = Duration::from_millis(self.config.watch_interval_ms);
        let notifier = ChangeNotifier::spawn(self.key_value.clone(), interval);
        let mut changes = notifier.subscribe();
        println!("Watching for external changes (Ctrl-C to stop)...");

        loop {
            tokio::select! {
                change = changes.recv() => {
                    match change {
                        Ok(_) | Err(RecvError::Lagged(_)) => {}
                        Err(RecvError::Closed) => break,
                    }
                    let stamp = chrono::Local::now().format("%H:%M:%S");
                    println!("[{}] {}", stamp, "data changed externally".yellow());
                    match self.manager.load().await? {
                        Some(state) => print_summary(&state),
                        None => println!("  (nothing stored)"),
                    }
                }
                _ = tokio::signal::ctrl_c() => break,
            }
        }

        notifier.stop();
        Ok(())
    }
}

fn availability(available: bool) -> colored::ColoredString {
    if available {
        "available".green()
    } else {
        "unavailable".red()
    }
}

fn read_document(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn write_document(document: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, document).with_context(|| format!("writing {}", path.display()))
        }
        None => {
            println!("{}", document);
            Ok(())
        }
    }
}

/// Entity counts per collection and total revenue
pub fn summary_lines(state: &PersistedState) -> Vec<String> {
    let mut lines: Vec<String> = state
        .collections()
        .iter()
        .map(|(name, records)| format!("{:<16} {}", name, records.len()))
        .collect();
    lines.push(format!("{:<16} {:.2}", "revenue", state.total_revenue()));
    lines
}

fn print_summary(state: &PersistedState) {
    for line in summary_lines(state) {
        println!("  {}", line);
    }
}
