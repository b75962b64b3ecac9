//! Sync configuration types.

/// Which copy of the index a sync pass is updating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SyncHandlerType {
    /// The shared in-memory head map. Expunge handlers run.
    #[default]
    Head,
    /// A map being brought up to date before it is written to disk.
    /// Expunge handlers run.
    File,
    /// A reader's private view. Expunge handlers never run.
    View,
}

impl SyncHandlerType {
    /// Returns true if expunge handlers run for this sync type.
    #[must_use]
    pub const fn runs_expunge_handlers(self) -> bool {
        matches!(self, Self::Head | Self::File)
    }
}

impl std::fmt::Display for SyncHandlerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Head => "head",
            Self::File => "file",
            Self::View => "view",
        })
    }
}

/// Limits and switches for a sync pass.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SyncConfig {
    /// Handler type used by [`crate::Index::sync`].
    pub handler_type: SyncHandlerType,
    /// Maximum number of distinct keywords per map.
    pub max_keywords: usize,
    /// Maximum extension header size in bytes.
    pub max_ext_header_size: u32,
    /// Maximum per-message extension record size in bytes.
    pub max_ext_record_size: u16,
    /// Run [`crate::IndexMap::check`] after every pass.
    pub verify_after_sync: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            handler_type: SyncHandlerType::Head,
            max_keywords: 4096,
            max_ext_header_size: 1024 * 1024,
            max_ext_record_size: 4096,
            verify_after_sync: cfg!(debug_assertions),
        }
    }
}

impl SyncConfig {
    /// Creates a configuration with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::new()
    }
}

/// Builder for sync configuration.
#[derive(Debug, Clone, Default)]
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    /// Creates a new builder with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the handler type.
    #[must_use]
    pub const fn handler_type(mut self, handler_type: SyncHandlerType) -> Self {
        self.config.handler_type = handler_type;
        self
    }

    /// Sets the keyword limit.
    #[must_use]
    pub const fn max_keywords(mut self, max: usize) -> Self {
        self.config.max_keywords = max;
        self
    }

    /// Sets the extension header size limit.
    #[must_use]
    pub const fn max_ext_header_size(mut self, max: u32) -> Self {
        self.config.max_ext_header_size = max;
        self
    }

    /// Sets the extension record size limit.
    #[must_use]
    pub const fn max_ext_record_size(mut self, max: u16) -> Self {
        self.config.max_ext_record_size = max;
        self
    }

    /// Enables or disables the post-sync consistency check.
    #[must_use]
    pub const fn verify_after_sync(mut self, verify: bool) -> Self {
        self.config.verify_after_sync = verify;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> SyncConfig {
        self.config
    }
}
