//! Inputs that are already on disk.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use smv_core::{BackgroundSpec, Error, Result};

use super::{BackgroundFetcher, Fetched, SourceFetcher};

/// Uses local files in place. They are never ephemeral.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFetcher;

impl LocalFetcher {
    fn check(what: &str, locator: &str) -> Result<PathBuf> {
        let path = PathBuf::from(locator);
        let meta = std::fs::metadata(&path)
            .map_err(|e| Error::fetch(what, format!("{locator}: {e}")))?;
        if !meta.is_file() {
            return Err(Error::fetch(what, format!("{locator} is not a file")));
        }
        if meta.len() == 0 {
            return Err(Error::fetch(what, format!("{locator} is empty")));
        }
        Ok(path)
    }
}

#[async_trait]
impl SourceFetcher for LocalFetcher {
    async fn fetch_source(&self, locator: &str, _dest_dir: &Path) -> Result<Fetched> {
        let path = Self::check("source", locator)?;
        Ok(Fetched {
            path,
            ephemeral: false,
            title: None,
        })
    }
}

#[async_trait]
impl BackgroundFetcher for LocalFetcher {
    async fn fetch_background(&self, spec: &BackgroundSpec, _dest_dir: &Path) -> Result<Fetched> {
        let path = Self::check("background", &spec.locator)?;
        Ok(Fetched {
            path,
            ephemeral: false,
            title: None,
        })
    }
}
