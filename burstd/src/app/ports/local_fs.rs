// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::app::errors::AppResult;

#[async_trait]
/// Local filesystem boundary for the core.
/// Working-directory files, spool directories and atomic rewrites.
pub trait LocalFilesystemPort: Send + Sync {
    async fn read_to_string(&self, path: &Path) -> AppResult<String>;
    async fn write_string(&self, path: &Path, contents: &str) -> AppResult<()>;
    /// Write to `<path>-tmp`, then rename over `path`.
    async fn write_atomic(&self, path: &Path, contents: &str) -> AppResult<()>;
    async fn rename(&self, from: &Path, to: &Path) -> AppResult<()>;
    /// Create `dir` and any missing parents; existing directories are fine.
    async fn create_dir_all(&self, dir: &Path) -> AppResult<()>;
    async fn list_dir(&self, dir: &Path) -> AppResult<Vec<PathBuf>>;
}
