/// Limits applied when loading protocol descriptors from disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepositoryConfig {
    /// Maximum number of `*.protocol.json` files loaded from a directory.
    pub max_protocol_files: usize,
    /// Maximum bytes allowed per descriptor file.
    pub max_protocol_file_size: usize,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            max_protocol_files: 256,
            max_protocol_file_size: 256 * 1024,
        }
    }
}

impl RepositoryConfig {
    pub fn with_max_protocol_files(mut self, max: usize) -> Self {
        self.max_protocol_files = max;
        self
    }

    pub fn with_max_protocol_file_size(mut self, max: usize) -> Self {
        self.max_protocol_file_size = max;
        self
    }
}
