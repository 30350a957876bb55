// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::LocalFilesystemPort;

#[derive(Clone, Default)]
pub struct LocalFilesystem;

impl LocalFilesystem {
    pub fn new() -> Self {
        Self
    }
}

fn io_error(action: &str, path: &Path, err: io::Error) -> AppError {
    let kind = if err.kind() == io::ErrorKind::NotFound {
        AppErrorKind::NotFound
    } else {
        AppErrorKind::Internal
    };
    let code = if kind == AppErrorKind::NotFound {
        codes::NOT_FOUND
    } else {
        codes::LOCAL_ERROR
    };
    AppError::with_message(
        kind,
        code,
        format!("failed to {action} {}: {err}", path.display()),
    )
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push("-tmp");
    PathBuf::from(tmp)
}

#[async_trait]
impl LocalFilesystemPort for LocalFilesystem {
    #[tracing::instrument(name = "fs", level = "debug", skip(self, path), fields(op = "read_to_string", path = %path.display()))]
    async fn read_to_string(&self, path: &Path) -> AppResult<String> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|err| io_error("read", path, err))
    }

    #[tracing::instrument(name = "fs", level = "debug", skip(self, path, contents), fields(op = "write_string", path = %path.display()))]
    async fn write_string(&self, path: &Path, contents: &str) -> AppResult<()> {
        tokio::fs::write(path, contents)
            .await
            .map_err(|err| io_error("write", path, err))
    }

    #[tracing::instrument(name = "fs", level = "debug", skip(self, path, contents), fields(op = "write_atomic", path = %path.display()))]
    async fn write_atomic(&self, path: &Path, contents: &str) -> AppResult<()> {
        let tmp = tmp_path(path);
        tokio::fs::write(&tmp, contents)
            .await
            .map_err(|err| io_error("write", &tmp, err))?;
        if let Err(err) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_error("replace", path, err));
        }
        Ok(())
    }

    #[tracing::instrument(name = "fs", level = "debug", skip(self, from, to), fields(op = "rename", from = %from.display(), to = %to.display()))]
    async fn rename(&self, from: &Path, to: &Path) -> AppResult<()> {
        tokio::fs::rename(from, to)
            .await
            .map_err(|err| io_error("move", from, err))
    }

    #[tracing::instrument(name = "fs", level = "debug", skip(self, dir), fields(op = "create_dir_all", path = %dir.display()))]
    async fn create_dir_all(&self, dir: &Path) -> AppResult<()> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|err| io_error("create", dir, err))
    }

    async fn list_dir(&self, dir: &Path) -> AppResult<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|err| io_error("list", dir, err))?;
        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| io_error("list", dir, err))?
        {
            let is_file = entry
                .file_type()
                .await
                .map(|kind| kind.is_file())
                .unwrap_or(false);
            if is_file {
                paths.push(entry.path());
            }
        }
        paths.sort();
        Ok(paths)
    }
}
