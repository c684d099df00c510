use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::config::RepositoryConfig;
use crate::error::{FuryError, Result};
use crate::protocol::ProtocolMethod;

const PROTOCOL_FILE_SUFFIX: &str = ".protocol.json";

/// Method-keyed set of protocol descriptors.
#[derive(Debug, Clone, Default)]
pub struct ProtocolRepository {
    methods: BTreeMap<String, ProtocolMethod>,
    config: RepositoryConfig,
}

impl ProtocolRepository {
    pub fn new() -> Self {
        Self::with_config(RepositoryConfig::default())
    }

    pub fn with_config(config: RepositoryConfig) -> Self {
        Self {
            methods: BTreeMap::new(),
            config,
        }
    }

    /// Add a descriptor, returning the one it replaced.
    pub fn register(&mut self, method: ProtocolMethod) -> Option<ProtocolMethod> {
        self.methods.insert(method.method.clone(), method)
    }

    /// Add descriptors from JSON text holding one descriptor or an array.
    pub fn register_json(&mut self, json: &str) -> Result<usize> {
        let value: Value = serde_json::from_str(json)?;
        let methods: Vec<ProtocolMethod> = match value {
            Value::Array(_) => serde_json::from_value(value)?,
            other => vec![serde_json::from_value(other)?],
        };
        let count = methods.len();
        for method in methods {
            self.register(method);
        }
        Ok(count)
    }

    /// Build from embedded descriptor strings.
    pub fn from_embedded(sources: &[&str]) -> Result<Self> {
        let mut repository = Self::new();
        for source in sources {
            repository.register_json(source)?;
        }
        Ok(repository)
    }

    /// Load every `*.protocol.json` file in a directory.
    pub fn from_directory(path: &Path) -> Result<Self> {
        Self::from_directory_with_config(path, RepositoryConfig::default())
    }

    /// Load every `*.protocol.json` file in a directory with explicit limits.
    ///
    /// Symlinked descriptor files are refused. Other files are ignored.
    pub fn from_directory_with_config(path: &Path, config: RepositoryConfig) -> Result<Self> {
        let mut repository = Self::with_config(config);
        let mut loaded_files = 0usize;

        let entries = std::fs::read_dir(path)
            .map_err(|err| FuryError::LoadFailed(format!("{}: {err}", path.display())))?;

        for entry in entries {
            let entry = entry.map_err(|err| FuryError::LoadFailed(err.to_string()))?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if !file_name.ends_with(PROTOCOL_FILE_SUFFIX) {
                continue;
            }

            let entry_path = entry.path();
            let metadata = std::fs::symlink_metadata(&entry_path)
                .map_err(|err| FuryError::LoadFailed(err.to_string()))?;
            if metadata.file_type().is_symlink() {
                return Err(FuryError::LoadFailed(format!(
                    "refusing to load protocol symlink: {file_name}"
                )));
            }
            if !metadata.is_file() {
                continue;
            }

            loaded_files = loaded_files.saturating_add(1);
            if loaded_files > repository.config.max_protocol_files {
                return Err(FuryError::LoadFailed(format!(
                    "protocol file count exceeds configured max ({})",
                    repository.config.max_protocol_files
                )));
            }

            let content = read_limited(&entry_path, repository.config.max_protocol_file_size)?;
            let count = repository.register_json(&content).map_err(|err| {
                FuryError::LoadFailed(format!("{}: {err}", entry_path.display()))
            })?;
            debug!(file = %file_name, methods = count, "loaded protocol file");
        }

        Ok(repository)
    }

    pub fn get(&self, method: &str) -> Option<&ProtocolMethod> {
        self.methods.get(method)
    }

    pub fn contains(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    /// Descriptors sorted by method name.
    pub fn methods(&self) -> impl Iterator<Item = &ProtocolMethod> {
        self.methods.values()
    }

    pub fn names(&self) -> Vec<String> {
        self.methods.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }
}

impl Extend<ProtocolMethod> for ProtocolRepository {
    fn extend<I: IntoIterator<Item = ProtocolMethod>>(&mut self, iter: I) {
        for method in iter {
            self.register(method);
        }
    }
}

fn read_limited(path: &Path, max_bytes: usize) -> Result<String> {
    let file = std::fs::File::open(path).map_err(|err| {
        FuryError::LoadFailed(format!("failed opening {}: {err}", path.display()))
    })?;
    let len = file
        .metadata()
        .map_err(|err| FuryError::LoadFailed(err.to_string()))?
        .len();
    if len > max_bytes as u64 {
        return Err(FuryError::LoadFailed(format!(
            "protocol file too large ({len} bytes): {}",
            path.display()
        )));
    }

    let read_limit = u64::try_from(max_bytes.saturating_add(1)).unwrap_or(u64::MAX);
    let mut content = String::new();
    file.take(read_limit)
        .read_to_string(&mut content)
        .map_err(|err| {
            FuryError::LoadFailed(format!("failed reading {}: {err}", path.display()))
        })?;
    if content.len() > max_bytes {
        return Err(FuryError::LoadFailed(format!(
            "protocol file too large while reading: {}",
            path.display()
        )));
    }
    Ok(content)
}
