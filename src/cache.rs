use std::{
    fs::{self, File},
    io::{self, BufReader, BufWriter},
    path::{Path, PathBuf},
};

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache io error at {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("cache entry {} is not valid JSON: {source}", .path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// JSON files in one directory, one file per key. Entries never expire; deleting the
/// directory is always safe.
#[derive(Debug, Clone)]
pub struct Cache {
    path: PathBuf,
}

impl Cache {
    pub fn new(path: &Path) -> Result<Cache, CacheError> {
        fs::create_dir_all(path).map_err(|source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Cache {
            path: path.to_path_buf(),
        })
    }

    pub fn write_from<T: Serialize>(&self, key: &str, value: &T) -> Result<(), CacheError> {
        let path = self.entry_path(key);
        let file = File::create(&path).map_err(|source| CacheError::Io {
            path: path.clone(),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, value).map_err(|source| CacheError::Json { path, source })
    }

    pub fn read_into<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let path = self.entry_path(key);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CacheError::Io { path, source }),
        };
        let value = serde_json::from_reader(BufReader::new(file))
            .map_err(|source| CacheError::Json { path: path.clone(), source })?;
        debug!("cache hit: {}", path.display());
        Ok(Some(value))
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.path.join(format!("{}.json", sanitize_key(key)))
    }
}

fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect::<String>()
        .replace("..", "__")
}
