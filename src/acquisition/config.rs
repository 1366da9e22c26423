//! Acquisition configuration types

use std::time::Duration;

use crate::acquisition::tiff::TiffCompression;

/// Per-frame retrieval timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// What the persistence sink does when a frame file cannot be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteFailurePolicy {
    /// Stop the run and return the error.
    Abort,
    /// Log the failure, record it in the report and continue with the next frame.
    Skip,
}

/// Configuration for capture and save runs
#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
    /// How long to wait for each frame before the session is aborted
    pub timeout: Duration,
    /// Report parameter reads/writes and session progress at info level
    pub verbose: bool,
    /// Compression method for persisted frames
    pub compression: TiffCompression,
    /// Predictor value for compression (typically 2 for horizontal differencing)
    pub predictor: Option<u16>,
    /// Policy for frame files that fail to write
    pub write_failure: WriteFailurePolicy,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            verbose: false,
            compression: TiffCompression::None,
            predictor: None,
            write_failure: WriteFailurePolicy::Skip,
        }
    }
}

impl AcquisitionConfig {
    pub fn builder() -> AcquisitionConfigBuilder {
        AcquisitionConfigBuilder::default()
    }
}

/// Builder for AcquisitionConfig
#[derive(Default)]
pub struct AcquisitionConfigBuilder {
    timeout: Option<Duration>,
    verbose: Option<bool>,
    compression: Option<TiffCompression>,
    predictor: Option<Option<u16>>,
    write_failure: Option<WriteFailurePolicy>,
}

impl AcquisitionConfigBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = Some(verbose);
        self
    }

    pub fn compression(mut self, compression: TiffCompression) -> Self {
        self.compression = Some(compression);
        self
    }

    pub fn predictor(mut self, predictor: Option<u16>) -> Self {
        self.predictor = Some(predictor);
        self
    }

    pub fn write_failure(mut self, policy: WriteFailurePolicy) -> Self {
        self.write_failure = Some(policy);
        self
    }

    pub fn build(self) -> AcquisitionConfig {
        let default = AcquisitionConfig::default();
        AcquisitionConfig {
            timeout: self.timeout.unwrap_or(default.timeout),
            verbose: self.verbose.unwrap_or(default.verbose),
            compression: self.compression.unwrap_or(default.compression),
            predictor: self.predictor.unwrap_or(default.predictor),
            write_failure: self.write_failure.unwrap_or(default.write_failure),
        }
    }
}
