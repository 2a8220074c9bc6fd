//! Manifest validation.
//!
//! Catches mistakes that would otherwise surface half way through an apply:
//! bad names, conflicting placement, malformed keys and dangling references.

use crate::error::{ConfigError, Result};
use std::collections::HashSet;
use tracing::debug;

use super::spec::{Manifest, ProviderConfig, Reference, RescueDecl, ServerDecl, SshKeyDecl};

/// Backup windows the API accepts.
pub const BACKUP_WINDOWS: &[&str] = &["22-02", "02-06", "06-10", "10-14", "14-18", "18-22"];

/// Maximum size of cloud-init user data in bytes.
pub const MAX_USER_DATA_BYTES: usize = 32 * 1024;

/// Key types accepted as SSH public keys.
const KEY_TYPES: &[&str] = &[
    "ssh-ed25519",
    "ssh-rsa",
    "ecdsa-sha2-nistp256",
    "ecdsa-sha2-nistp384",
    "ecdsa-sha2-nistp521",
    "sk-ssh-ed25519@openssh.com",
    "sk-ecdsa-sha2-nistp256@openssh.com",
];

/// Validator for manifests.
#[derive(Debug, Default)]
pub struct ConfigValidator {
    /// Skip the token check, for offline plans.
    allow_missing_token: bool,
}

/// Validation result containing all issues found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationIssue>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationIssue {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            allow_missing_token: false,
        }
    }

    /// Accepts manifests without a token.
    #[must_use]
    pub const fn allow_missing_token(mut self) -> Self {
        self.allow_missing_token = true;
        self
    }

    /// Validates a manifest.
    ///
    /// # Errors
    ///
    /// Returns the first error found; warnings never fail validation.
    pub fn validate(&self, manifest: &Manifest) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        self.validate_provider(&manifest.provider, &mut result);
        Self::validate_data(manifest, &mut result);
        Self::validate_ssh_keys(&manifest.ssh_keys, &mut result);
        Self::validate_servers(manifest, &mut result);
        Self::validate_rescues(manifest, &mut result);

        if manifest.resource_count() == 0 {
            result.warnings.push(String::from("No resources declared in manifest"));
        }

        if let Some(first_error) = result.errors.first() {
            Err(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }
            .into())
        } else {
            debug!(
                "Manifest validation passed with {} warnings",
                result.warning_count()
            );
            Ok(result)
        }
    }

    fn validate_provider(&self, provider: &ProviderConfig, result: &mut ValidationResult) {
        if provider.token.is_empty() && !self.allow_missing_token {
            result.error(
                "provider.token",
                "API token is required; set HCLOUD_TOKEN",
            );
        }

        if !provider.endpoint.starts_with("https://") && !provider.endpoint.starts_with("http://") {
            result.error(
                "provider.endpoint",
                format!("Endpoint '{}' is not an http(s) URL", provider.endpoint),
            );
        }

        if provider.power_off.max_attempts == 0 {
            result.warnings.push(String::from(
                "provider.power_off.max_attempts is 0: servers are powered off without waiting for a graceful shutdown",
            ));
        }
    }

    fn validate_data(manifest: &Manifest, result: &mut ValidationResult) {
        for (label, decl) in &manifest.data {
            let prefix = format!("data.{label}");
            if !is_valid_name(label) {
                result.error(&prefix, format!("Data source label '{label}' is invalid"));
            }
            if decl.id.is_none() && decl.name.as_deref().is_none_or(str::is_empty) {
                result.error(&prefix, format!("{} needs an id or a name", decl.kind));
            }
        }
    }

    fn validate_ssh_keys(keys: &[SshKeyDecl], result: &mut ValidationResult) {
        let mut labels = HashSet::new();
        let mut key_names = HashSet::new();

        for (i, key) in keys.iter().enumerate() {
            let prefix = format!("ssh_keys[{i}]");

            if !labels.insert(key.name.as_str()) {
                result.error(format!("{prefix}.name"), format!("Duplicate SSH key: {}", key.name));
            }
            if !is_valid_name(&key.name) {
                result.error(
                    format!("{prefix}.name"),
                    format!(
                        "SSH key label '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                        key.name
                    ),
                );
            }
            if !key_names.insert(key.key_name()) {
                result.error(
                    format!("{prefix}.key_name"),
                    format!("SSH key name '{}' is used twice", key.key_name()),
                );
            }
            if !is_valid_public_key(&key.public_key) {
                result.error(
                    format!("{prefix}.public_key"),
                    format!("SSH key '{}' is not an OpenSSH public key", key.name),
                );
            }
        }
    }

    fn validate_servers(manifest: &Manifest, result: &mut ValidationResult) {
        let mut labels = HashSet::new();
        let mut hostnames = HashSet::new();

        for (i, server) in manifest.servers.iter().enumerate() {
            let prefix = format!("servers[{i}]");

            if !labels.insert(server.name.as_str()) {
                result.error(format!("{prefix}.name"), format!("Duplicate server: {}", server.name));
            }
            if !is_valid_name(&server.name) {
                result.error(
                    format!("{prefix}.name"),
                    format!(
                        "Server label '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                        server.name
                    ),
                );
            }
            if !is_valid_hostname(server.server_name()) {
                result.error(
                    format!("{prefix}.hostname"),
                    format!("Server name '{}' is not a valid hostname", server.server_name()),
                );
            }
            if !hostnames.insert(server.server_name()) {
                result.error(
                    format!("{prefix}.hostname"),
                    format!("Server name '{}' is used twice", server.server_name()),
                );
            }

            Self::validate_server_fields(server, &prefix, result);
            validate_key_refs(manifest, &server.ssh_keys, &prefix, result);
        }
    }

    fn validate_server_fields(server: &ServerDecl, prefix: &str, result: &mut ValidationResult) {
        if server.location.is_some() && server.datacenter.is_some() {
            result.error(
                format!("{prefix}.location"),
                "Fields 'datacenter' and 'location' conflict; set only one",
            );
        }

        if !server.backup_window.is_empty() {
            if !BACKUP_WINDOWS.contains(&server.backup_window.as_str()) {
                result.error(
                    format!("{prefix}.backup_window"),
                    format!(
                        "Backup window '{}' is invalid. Expected one of: {}",
                        server.backup_window,
                        BACKUP_WINDOWS.join(", ")
                    ),
                );
            }
            if !server.backup {
                result.warnings.push(format!(
                    "{prefix}.backup_window: ignored because backup is disabled"
                ));
            }
        }

        if let Some(user_data) = &server.user_data
            && user_data.len() > MAX_USER_DATA_BYTES
        {
            result.error(
                format!("{prefix}.user_data"),
                format!("User data exceeds {MAX_USER_DATA_BYTES} bytes"),
            );
        }

        if server.ipv4_ptr.as_deref().is_some_and(|ptr| !is_valid_hostname(ptr)) {
            result.error(
                format!("{prefix}.ipv4_ptr"),
                format!(
                    "Reverse DNS entry '{}' is not a valid hostname",
                    server.ipv4_ptr.as_deref().unwrap_or_default()
                ),
            );
        }
    }

    fn validate_rescues(manifest: &Manifest, result: &mut ValidationResult) {
        let mut labels = HashSet::new();
        let mut servers: HashSet<&Reference> = HashSet::new();

        for (i, rescue) in manifest.rescues.iter().enumerate() {
            let prefix = format!("rescues[{i}]");

            if !labels.insert(rescue.name.as_str()) {
                result.error(format!("{prefix}.name"), format!("Duplicate rescue: {}", rescue.name));
            }
            if !is_valid_name(&rescue.name) {
                result.error(
                    format!("{prefix}.name"),
                    format!("Rescue label '{}' is invalid", rescue.name),
                );
            }
            if let Reference::Name(server) = &rescue.server
                && manifest.server(server).is_none()
            {
                result.error(
                    format!("{prefix}.server"),
                    format!("Rescue '{}' refers to undeclared server '{server}'", rescue.name),
                );
            }
            if !servers.insert(&rescue.server) {
                result.error(
                    format!("{prefix}.server"),
                    format!("Server {} has more than one rescue session", rescue.server),
                );
            }
            warn_restart_flags(rescue, &prefix, result);
            validate_key_refs(manifest, &rescue.ssh_keys, &prefix, result);
        }
    }
}

fn warn_restart_flags(rescue: &RescueDecl, prefix: &str, result: &mut ValidationResult) {
    if rescue.reboot_on_activation && rescue.reset_on_activation {
        debug!("{prefix}: reboot_on_activation wins over reset_on_activation");
    }
    if !rescue.reboot_on_activation && !rescue.reset_on_activation {
        result.warnings.push(format!(
            "{prefix}: server is not restarted, rescue mode takes effect on its next boot"
        ));
    }
}

fn validate_key_refs(
    manifest: &Manifest,
    keys: &[Reference],
    prefix: &str,
    result: &mut ValidationResult,
) {
    for (j, key) in keys.iter().enumerate() {
        if let Reference::Name(name) = key
            && manifest.ssh_key(name).is_none()
        {
            result.error(
                format!("{prefix}.ssh_keys[{j}]"),
                format!("Undeclared SSH key '{name}'"),
            );
        }
    }
}

/// Validates that a label follows the naming convention.
/// Labels must be lowercase alphanumeric with hyphens, starting with a letter.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {}
        _ => return false,
    }

    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.ends_with('-')
        && !name.contains("--")
}

/// Validates an RFC 1123 hostname.
fn is_valid_hostname(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 253
        && name.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

/// Checks that a key is `<type> <base64>` with an optional comment.
fn is_valid_public_key(key: &str) -> bool {
    let mut parts = key.split_whitespace();
    let (Some(key_type), Some(material)) = (parts.next(), parts.next()) else {
        return false;
    };
    KEY_TYPES.contains(&key_type)
        && material
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '='))
}

impl ValidationResult {
    fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationIssue {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;
    use crate::error::ProviderError;

    fn manifest(yaml: &str) -> Manifest {
        let mut manifest = ConfigParser::new().parse_yaml(yaml, None).unwrap();
        manifest.provider.token = String::from("token");
        manifest
    }

    fn field_of(err: ProviderError) -> Option<String> {
        match err {
            ProviderError::Config(ConfigError::ValidationError { field, .. }) => field,
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_valid_name() {
        assert!(is_valid_name("web"));
        assert!(is_valid_name("web-1"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("Web"));
        assert!(!is_valid_name("1web"));
        assert!(!is_valid_name("web_1"));
        assert!(!is_valid_name("web-"));
        assert!(!is_valid_name("web--1"));
    }

    #[test]
    fn test_valid_hostname() {
        assert!(is_valid_hostname("web-1"));
        assert!(is_valid_hostname("web-1.example.com"));
        assert!(!is_valid_hostname("web..example.com"));
        assert!(!is_valid_hostname("-web"));
        assert!(!is_valid_hostname("web_1"));
    }

    #[test]
    fn test_public_key_format() {
        assert!(is_valid_public_key("ssh-ed25519 AAAAC3NzaC1lZDI1NTE5 admin@laptop"));
        assert!(is_valid_public_key("ssh-rsa AAAAB3Nza+/=="));
        assert!(!is_valid_public_key("ssh-ed25519"));
        assert!(!is_valid_public_key("pgp AAAA"));
        assert!(!is_valid_public_key("ssh-ed25519 not-base64!"));
    }

    #[test]
    fn test_missing_token() {
        let mut m = manifest("servers: []");
        m.provider.token.clear();

        let err = ConfigValidator::new().validate(&m).unwrap_err();
        assert_eq!(field_of(err).as_deref(), Some("provider.token"));
        assert!(ConfigValidator::new().allow_missing_token().validate(&m).is_ok());
    }

    #[test]
    fn test_conflicting_placement() {
        let m = manifest(
            "servers:\n  - name: web\n    server_type: cx22\n    image: 114\n    location: fsn1\n    datacenter: fsn1-dc14\n",
        );
        let err = ConfigValidator::new().validate(&m).unwrap_err();
        assert_eq!(field_of(err).as_deref(), Some("servers[0].location"));
    }

    #[test]
    fn test_dangling_references() {
        let m = manifest(
            "servers:\n  - name: web\n    server_type: 1\n    image: 114\n    ssh_keys: [admin, 77]\nrescues:\n  - name: r\n    server: db\n",
        );
        let mut result = ValidationResult::default();
        ConfigValidator::validate_servers(&m, &mut result);
        ConfigValidator::validate_rescues(&m, &mut result);

        let fields: Vec<&str> = result.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["servers[0].ssh_keys[0]", "rescues[0].server"]);
    }

    #[test]
    fn test_backup_window() {
        let m = manifest(
            "servers:\n  - name: web\n    server_type: 1\n    image: 114\n    backup_window: 23-03\n",
        );
        let mut result = ValidationResult::default();
        ConfigValidator::validate_servers(&m, &mut result);

        assert_eq!(result.error_count(), 1);
        assert_eq!(result.warning_count(), 1);
    }

    #[test]
    fn test_duplicates() {
        let m = manifest(
            "ssh_keys:\n  - name: admin\n    public_key: ssh-ed25519 AAAA\n  - name: admin\n    public_key: ssh-ed25519 BBBB\n",
        );
        let err = ConfigValidator::new().validate(&m).unwrap_err();
        assert_eq!(field_of(err).as_deref(), Some("ssh_keys[1].name"));
    }

    #[test]
    fn test_valid_manifest_warnings() {
        let m = manifest(
            "ssh_keys:\n  - name: admin\n    public_key: ssh-ed25519 AAAA\nservers:\n  - name: web\n    server_type: cx22\n    image: ubuntu-24.04\n    ssh_keys: [admin]\nrescues:\n  - name: web-rescue\n    server: web\n    reset_on_activation: false\n",
        );
        let result = ConfigValidator::new().validate(&m).unwrap();
        assert!(result.is_valid());
        assert_eq!(result.warning_count(), 1);
    }
}
