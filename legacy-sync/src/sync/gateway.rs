//! Legacy system gateway
//!
//! The gateway is a black box that may fail. Every error it returns is
//! treated as transient by the worker; delivery is at-least-once, so
//! implementations should tolerate duplicates where they can.

use super::snapshot::StoreSnapshot;
use crate::config::GatewaySettings;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Errors raised by a legacy gateway call
#[derive(Debug, Error)]
pub enum LegacyGatewayError {
    /// IO failure while handing the change off
    #[error("Failed to sync store to legacy system: {0}")]
    Io(#[from] std::io::Error),

    /// The legacy system could not be reached
    #[error("Legacy system unavailable: {0}")]
    Unavailable(String),
}

/// Pushes committed store state to the legacy system
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LegacyGateway: Send + Sync {
    /// Announce a newly created store
    async fn create_on_legacy_system(&self, store: &StoreSnapshot)
        -> Result<(), LegacyGatewayError>;

    /// Announce changes to an existing store
    async fn update_on_legacy_system(&self, store: &StoreSnapshot)
        -> Result<(), LegacyGatewayError>;
}

/// Gateway that hands changes off through files
///
/// Each call writes a short description of the store to a fresh file in the
/// output directory and removes it again unless `keep_files` is set.
#[derive(Debug, Clone)]
pub struct TempFileLegacyGateway {
    output_dir: PathBuf,
    keep_files: bool,
}

impl TempFileLegacyGateway {
    /// Create a gateway writing into `output_dir`
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            keep_files: false,
        }
    }

    /// Create a gateway from configuration
    #[must_use]
    pub fn from_settings(settings: &GatewaySettings) -> Self {
        let output_dir = settings
            .output_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        Self::new(output_dir).with_keep_files(settings.keep_files)
    }

    /// Keep hand-off files after writing them
    #[must_use]
    pub const fn with_keep_files(mut self, keep_files: bool) -> Self {
        self.keep_files = keep_files;
        self
    }

    /// Directory the gateway writes into
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    async fn hand_off(&self, store: &StoreSnapshot, verb: &str) -> Result<(), LegacyGatewayError> {
        let path = self.output_dir.join(format!(
            "{}-{}-{}.txt",
            file_stem(&store.name),
            store.id,
            Uuid::new_v4().simple()
        ));
        let content = format!(
            "Store {verb}. [ name ={} ] [ items on stock ={}]",
            store.name, store.quantity_products_in_stock
        );

        tokio::fs::write(&path, content).await?;
        debug!(store_id = store.id, path = %path.display(), "Legacy hand-off file written");

        if !self.keep_files {
            tokio::fs::remove_file(&path).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl LegacyGateway for TempFileLegacyGateway {
    async fn create_on_legacy_system(
        &self,
        store: &StoreSnapshot,
    ) -> Result<(), LegacyGatewayError> {
        self.hand_off(store, "created").await
    }

    async fn update_on_legacy_system(
        &self,
        store: &StoreSnapshot,
    ) -> Result<(), LegacyGatewayError> {
        self.hand_off(store, "updated").await
    }
}

fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> StoreSnapshot {
        StoreSnapshot::new(Some(3), "Den Haag", 12, Some(0)).unwrap()
    }

    fn files_in(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect()
    }

    #[tokio::test]
    async fn test_hand_off_files_removed_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = TempFileLegacyGateway::new(dir.path());

        gateway.create_on_legacy_system(&snapshot()).await.unwrap();
        gateway.update_on_legacy_system(&snapshot()).await.unwrap();

        assert!(files_in(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_hand_off_file_content() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = TempFileLegacyGateway::new(dir.path()).with_keep_files(true);

        gateway.create_on_legacy_system(&snapshot()).await.unwrap();

        let files = files_in(dir.path());
        assert_eq!(files.len(), 1);
        let name = files[0].file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("Den_Haag-3-"));

        let content = std::fs::read_to_string(&files[0]).unwrap();
        assert_eq!(content, "Store created. [ name =Den Haag ] [ items on stock =12]");
    }

    #[tokio::test]
    async fn test_missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = TempFileLegacyGateway::new(dir.path().join("missing"));

        let err = gateway.create_on_legacy_system(&snapshot()).await.unwrap_err();
        assert!(matches!(err, LegacyGatewayError::Io(_)));
    }

    #[test]
    fn test_error_messages() {
        let unavailable = LegacyGatewayError::Unavailable("connection refused".into());
        assert_eq!(
            unavailable.to_string(),
            "Legacy system unavailable: connection refused"
        );

        let io = LegacyGatewayError::from(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        assert_eq!(io.to_string(), "Failed to sync store to legacy system: denied");
    }

    #[test]
    fn test_from_settings_defaults_to_temp_dir() {
        let gateway = TempFileLegacyGateway::from_settings(&GatewaySettings::default());
        assert_eq!(gateway.output_dir(), std::env::temp_dir());
    }
}
