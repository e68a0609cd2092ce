//! `screenlink pairing get|reset`.

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use screenlink_infra::{PairedSessionStore, PairingCodeStore};

pub const WATCH_INTERVAL: Duration = Duration::from_secs(5);

pub async fn describe(code_store: &PairingCodeStore, paired_store: &PairedSessionStore) -> Result<String> {
    let paired = paired_store
        .load()
        .await
        .context("Failed to read paired descriptor")?;
    if let Some(descriptor) = paired {
        let mode = if descriptor.is_encrypted() { "encrypted" } else { "plaintext" };
        return Ok(format!("Paired with {} ({mode})", descriptor.server_ws));
    }

    let code = code_store.load().await.context("Failed to read pairing code")?;
    Ok(match code {
        Some(code) => format!("Pairing code: {code}"),
        None => "No active pairing code.".to_string(),
    })
}

/// Polls until Ctrl-C, printing the state whenever it changes.
pub async fn watch(code_store: &PairingCodeStore, paired_store: &PairedSessionStore) -> Result<()> {
    let mut last = None;
    let mut ticker = tokio::time::interval(WATCH_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let current = describe(code_store, paired_store).await?;
                if last.as_ref() != Some(&current) {
                    println!("{current}");
                    last = Some(current);
                }
            }
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    NothingToReset,
    Reset { code_removed: bool, pairing_removed: bool },
}

impl fmt::Display for ResetOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResetOutcome::NothingToReset => f.write_str("Not paired yet. Nothing to reset."),
            ResetOutcome::Reset { pairing_removed: true, .. } => {
                f.write_str("Pairing reset. A running agent will disconnect and wait for a new pairing.")
            }
            ResetOutcome::Reset { .. } => f.write_str("Pending pairing code discarded."),
        }
    }
}

pub async fn reset(code_store: &PairingCodeStore, paired_store: &PairedSessionStore) -> Result<ResetOutcome> {
    let code_removed = code_store.delete().await.context("Failed to delete pairing code")?;
    let pairing_removed = paired_store
        .delete()
        .await
        .context("Failed to delete paired descriptor")?;

    Ok(if code_removed || pairing_removed {
        ResetOutcome::Reset { code_removed, pairing_removed }
    } else {
        ResetOutcome::NothingToReset
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use screenlink_infra::PairedDescriptor;

    fn stores(dir: &tempfile::TempDir) -> (PairingCodeStore, PairedSessionStore) {
        (PairingCodeStore::new(dir.path()), PairedSessionStore::new(dir.path()))
    }

    #[tokio::test]
    async fn describe_reports_code_then_pairing() {
        let dir = tempfile::tempdir().unwrap();
        let (codes, paired) = stores(&dir);

        assert_eq!(describe(&codes, &paired).await.unwrap(), "No active pairing code.");

        codes.save("K7Q2ZD").await.unwrap();
        assert_eq!(describe(&codes, &paired).await.unwrap(), "Pairing code: K7Q2ZD");

        paired
            .save(&PairedDescriptor::new("wss://controller.local/ws", "a2V5"))
            .await
            .unwrap();
        assert_eq!(
            describe(&codes, &paired).await.unwrap(),
            "Paired with wss://controller.local/ws (encrypted)"
        );
    }

    #[tokio::test]
    async fn reset_with_nothing_stored() {
        let dir = tempfile::tempdir().unwrap();
        let (codes, paired) = stores(&dir);
        let outcome = reset(&codes, &paired).await.unwrap();
        assert_eq!(outcome, ResetOutcome::NothingToReset);
        assert_eq!(outcome.to_string(), "Not paired yet. Nothing to reset.");
    }

    #[tokio::test]
    async fn reset_removes_code_and_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let (codes, paired) = stores(&dir);
        codes.save("ABC123").await.unwrap();
        paired
            .save(&PairedDescriptor::new("ws://10.0.0.5:9000", ""))
            .await
            .unwrap();

        let outcome = reset(&codes, &paired).await.unwrap();
        assert_eq!(
            outcome,
            ResetOutcome::Reset { code_removed: true, pairing_removed: true }
        );
        assert!(codes.load().await.unwrap().is_none());
        assert!(!paired.exists().await);
    }
}
