// Ethash Farm - Free and Open Source Software Statement
//
// This project, ethash-farm, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/miner/dag_file.rs
// Version: 1.0.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file stores exported datasets on disk. Each epoch is written as a raw
// `<tag>.dag` file plus a `<tag>.json` metadata file, both replaced
// atomically through a temporary file and rename. The tag is the first 16
// hex characters of the epoch seed hash.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

const LOG_TARGET: &str = "ethash_farm::dag_file";

#[derive(Error, Debug)]
pub enum DagFileError {
    #[error("Path {path:?} is not a directory")]
    NotADirectory { path: PathBuf },

    #[error("Directory {path:?} is read-only")]
    ReadOnlyDirectory { path: PathBuf },

    #[error("Cannot export an empty dataset")]
    EmptyDataset,

    #[error("Invalid epoch tag {tag:?}")]
    InvalidTag { tag: String },

    #[error("DAG file does not exist at {path:?}")]
    FileNotFound { path: PathBuf },

    #[error("Failed to serialize DAG metadata")]
    SerializationError {
        #[from]
        source: serde_json::Error,
    },

    #[error("Failed to deserialize DAG metadata: {message}")]
    DeserializationError { message: String },

    #[error("DAG size mismatch: metadata says {expected} bytes, file has {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("IO operation failed on {path:?}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path:?} atomically")]
    AtomicWriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Sidecar description of an exported dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagFileMetadata {
    /// Full seed hash, hex
    pub seed_hash: String,
    pub items: u64,
    pub item_bytes: u32,
    /// Name of the device that exported it
    pub device: String,
    /// Unix seconds
    pub exported_at: u64,
}

impl DagFileMetadata {
    pub fn new(seed_hash: &[u8], items: u64, item_bytes: u32, device: impl Into<String>) -> Self {
        let exported_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            seed_hash: hex::encode(seed_hash),
            items,
            item_bytes,
            device: device.into(),
            exported_at,
        }
    }

    pub fn size_bytes(&self) -> u64 {
        self.items * self.item_bytes as u64
    }
}

#[derive(Debug, Clone)]
pub struct DagFileManager {
    directory_path: PathBuf,
}

impl DagFileManager {
    pub fn new(directory_path: impl Into<PathBuf>) -> Result<Self, DagFileError> {
        let directory_path = directory_path.into();
        if !directory_path.is_dir() {
            return Err(DagFileError::NotADirectory {
                path: directory_path,
            });
        }

        let metadata = fs::metadata(&directory_path).map_err(|e| DagFileError::IoError {
            path: directory_path.clone(),
            source: e,
        })?;
        if metadata.permissions().readonly() {
            return Err(DagFileError::ReadOnlyDirectory {
                path: directory_path,
            });
        }

        Ok(Self { directory_path })
    }

    fn check_tag(tag: &str) -> Result<(), DagFileError> {
        if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DagFileError::InvalidTag {
                tag: tag.to_string(),
            });
        }
        Ok(())
    }

    pub fn dag_path(&self, tag: &str) -> PathBuf {
        self.directory_path.join(format!("{}.dag", tag))
    }

    pub fn metadata_path(&self, tag: &str) -> PathBuf {
        self.directory_path.join(format!("{}.json", tag))
    }

    pub fn exists(&self, tag: &str) -> bool {
        self.dag_path(tag).is_file() && self.metadata_path(tag).is_file()
    }

    fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), DagFileError> {
        let temp_path = path.with_extension("tmp");
        let atomic = |e| DagFileError::AtomicWriteError {
            path: path.to_path_buf(),
            source: e,
        };

        {
            let mut temp_file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)
                .map_err(atomic)?;
            temp_file.write_all(contents).map_err(atomic)?;
            temp_file.flush().map_err(atomic)?;
        }

        fs::rename(&temp_path, path).map_err(atomic)
    }

    /// Writes the dataset and its metadata, returning the dataset path
    pub fn save(
        &self,
        tag: &str,
        metadata: &DagFileMetadata,
        data: &[u8],
    ) -> Result<PathBuf, DagFileError> {
        Self::check_tag(tag)?;
        if data.is_empty() {
            return Err(DagFileError::EmptyDataset);
        }
        if metadata.size_bytes() != data.len() as u64 {
            return Err(DagFileError::SizeMismatch {
                expected: metadata.size_bytes(),
                actual: data.len() as u64,
            });
        }

        let dag_path = self.dag_path(tag);
        debug!(target: LOG_TARGET, "Writing DAG file to {:?}", dag_path);
        Self::write_atomic(&dag_path, data)?;

        let contents = serde_json::to_vec_pretty(metadata)?;
        Self::write_atomic(&self.metadata_path(tag), &contents)?;

        info!(target: LOG_TARGET,
            "💾 Exported DAG {} ({} items) to {:?}",
            tag, metadata.items, dag_path
        );
        Ok(dag_path)
    }

    pub fn load_metadata(&self, tag: &str) -> Result<DagFileMetadata, DagFileError> {
        Self::check_tag(tag)?;
        let path = self.metadata_path(tag);
        if !path.exists() {
            return Err(DagFileError::FileNotFound { path });
        }
        let contents = fs::read_to_string(&path).map_err(|e| DagFileError::IoError {
            path: path.clone(),
            source: e,
        })?;
        serde_json::from_str(&contents).map_err(|e| DagFileError::DeserializationError {
            message: e.to_string(),
        })
    }

    /// Loads metadata and raw dataset bytes, checking their sizes agree
    pub fn load(&self, tag: &str) -> Result<(DagFileMetadata, Vec<u8>), DagFileError> {
        let metadata = self.load_metadata(tag)?;
        let path = self.dag_path(tag);
        if !path.exists() {
            return Err(DagFileError::FileNotFound { path });
        }
        let data = fs::read(&path).map_err(|e| DagFileError::IoError {
            path: path.clone(),
            source: e,
        })?;
        if data.len() as u64 != metadata.size_bytes() {
            return Err(DagFileError::SizeMismatch {
                expected: metadata.size_bytes(),
                actual: data.len() as u64,
            });
        }
        debug!(target: LOG_TARGET, "Loaded DAG {} from {:?}", tag, path);
        Ok((metadata, data))
    }

    pub fn directory_path(&self) -> &PathBuf {
        &self.directory_path
    }
}

// Changelog:
// - v1.0.0 (2026-10-12): DAG export store.
//   - Directory validation and atomic temp-file writes from the GPU status file manager.
//   - Switched to std::fs; exports run on blocking threads.
//   - Raw dataset plus JSON metadata keyed by epoch tag.
