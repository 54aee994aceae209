use serde::Deserialize;

/// Default limit of a non file multipart field, 1 MB: enough for your queries.
pub const DEFAULT_MAX_FIELD_SIZE: u64 = 1_000_000;

/// Limits enforced by a [`ProcessRequest`](crate::processor::ProcessRequest) implementation.
///
/// Built once and forwarded unchanged to the processor on every request. Can also be
/// deserialized from host configuration using camelCase keys:
///
/// ```
/// use micro_upload::processor::ProcessRequestOptions;
///
/// let options: ProcessRequestOptions = serde_json::from_str(r#"{ "maxFileSize": 10000000, "maxFiles": 10 }"#).unwrap();
/// assert_eq!(options.max_field_size(), 1_000_000);
/// assert_eq!(options.max_file_size(), Some(10_000_000));
/// assert_eq!(options.max_files(), Some(10));
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct ProcessRequestOptions {
    max_field_size: u64,
    max_file_size: Option<u64>,
    max_files: Option<usize>,
}

impl Default for ProcessRequestOptions {
    fn default() -> Self {
        Self { max_field_size: DEFAULT_MAX_FIELD_SIZE, max_file_size: None, max_files: None }
    }
}

impl ProcessRequestOptions {
    pub fn builder() -> ProcessRequestOptionsBuilder {
        ProcessRequestOptionsBuilder { options: Self::default() }
    }

    /// Maximum allowed non file multipart field size in bytes.
    #[inline]
    pub fn max_field_size(&self) -> u64 {
        self.max_field_size
    }

    /// Maximum allowed file size in bytes, `None` for unbounded.
    #[inline]
    pub fn max_file_size(&self) -> Option<u64> {
        self.max_file_size
    }

    /// Maximum allowed number of files, `None` for unbounded.
    #[inline]
    pub fn max_files(&self) -> Option<usize> {
        self.max_files
    }
}

#[derive(Debug)]
pub struct ProcessRequestOptionsBuilder {
    options: ProcessRequestOptions,
}

impl ProcessRequestOptionsBuilder {
    pub fn max_field_size(mut self, max_field_size: u64) -> Self {
        self.options.max_field_size = max_field_size;
        self
    }

    pub fn max_file_size(mut self, max_file_size: u64) -> Self {
        self.options.max_file_size = Some(max_file_size);
        self
    }

    pub fn max_files(mut self, max_files: usize) -> Self {
        self.options.max_files = Some(max_files);
        self
    }

    pub fn build(self) -> ProcessRequestOptions {
        self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_only_bound_fields() {
        let options = ProcessRequestOptions::default();
        assert_eq!(options.max_field_size(), DEFAULT_MAX_FIELD_SIZE);
        assert_eq!(options.max_file_size(), None);
        assert_eq!(options.max_files(), None);
    }

    #[test]
    fn builder_overrides_limits() {
        let options = ProcessRequestOptions::builder().max_field_size(512).max_file_size(1024).max_files(2).build();
        assert_eq!(options.max_field_size(), 512);
        assert_eq!(options.max_file_size(), Some(1024));
        assert_eq!(options.max_files(), Some(2));
    }

    #[test]
    fn empty_config_is_default() {
        let options: ProcessRequestOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, ProcessRequestOptions::default());
    }

    #[test]
    fn unknown_config_keys_are_rejected() {
        assert!(serde_json::from_str::<ProcessRequestOptions>(r#"{ "maxFileSise": 1 }"#).is_err());
    }
}
