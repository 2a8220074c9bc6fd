//! Configuration module.
//!
//! This module handles all configuration-related functionality:
//! - Provider settings (token, endpoint, timeouts, power-off policy)
//! - Parsing the `hcloud.yaml` manifest with `.env` and environment overrides
//! - Validation of manifests before anything is applied

mod spec;
mod parser;
mod validator;

pub use spec::{
    DEFAULT_ACTION_POLL_INTERVAL_MS, DEFAULT_REQUEST_TIMEOUT_SECS, DataSourceDecl, Manifest,
    PowerOffPolicy, ProviderConfig, Reference, RescueDecl, ServerDecl, SshKeyDecl, StateConfig,
};
pub use parser::{
    ConfigParser, DEFAULT_CONFIG_FILES, ENDPOINT_ENV, STATE_PATH_ENV, TOKEN_ENV, apply_overrides,
    find_config_file,
};
pub use validator::{
    BACKUP_WINDOWS, ConfigValidator, MAX_USER_DATA_BYTES, ValidationIssue, ValidationResult,
};
