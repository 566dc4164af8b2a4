//! Shared state handed to the HTTP handlers

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::config::AppConfig;
use crate::reader::ReaderControl;
use crate::recorder::CsvRecorder;

pub struct AppState {
    pub reader: Arc<dyn ReaderControl>,
    pub recorder: Arc<CsvRecorder>,
    config: Mutex<AppConfig>,
    /// Where changed settings are persisted; `None` keeps them in memory only
    app_dir: Option<PathBuf>,
    /// Serializes writers so the file always ends with the newest snapshot
    persist: tokio::sync::Mutex<()>,
}

impl AppState {
    pub fn new(
        reader: Arc<dyn ReaderControl>,
        recorder: Arc<CsvRecorder>,
        config: AppConfig,
        app_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            reader,
            recorder,
            config: Mutex::new(config),
            app_dir,
            persist: tokio::sync::Mutex::new(()),
        }
    }

    pub fn config(&self) -> AppConfig {
        self.config.lock().clone()
    }

    /// Apply `change` and write the result to the app directory
    ///
    /// A failed write is logged; the in-memory value stays updated.
    pub async fn update_config<F: FnOnce(&mut AppConfig)>(&self, change: F) {
        let _persist = self.persist.lock().await;
        let snapshot = {
            let mut config = self.config.lock();
            change(&mut config);
            config.clone()
        };

        if let Some(dir) = &self.app_dir {
            if let Err(e) = snapshot.save(dir).await {
                warn!("Failed to persist configuration: {}", e);
            }
        }
    }
}
