use std::collections::HashMap;

use crate::error::StatusError;

/// Source of decrypted credentials, looked up by name.
pub trait SecretStore: Send + Sync {
    fn get(&self, name: &str) -> Result<String, StatusError>;
}

/// Reads secrets from environment variables: `github_token` -> `$GITHUB_TOKEN`.
#[derive(Debug, Default, Clone)]
pub struct EnvSecretStore {
    prefix: String,
}

impl EnvSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look secrets up as `{prefix}{NAME}`.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn var_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name.to_uppercase())
    }
}

impl SecretStore for EnvSecretStore {
    fn get(&self, name: &str) -> Result<String, StatusError> {
        let var = self.var_name(name);
        match std::env::var(&var) {
            Ok(value) if !value.is_empty() => Ok(value),
            _ => Err(StatusError::Secret(format!(
                "secret '{}' not set (expected ${})",
                name, var
            ))),
        }
    }
}

impl SecretStore for HashMap<String, String> {
    fn get(&self, name: &str) -> Result<String, StatusError> {
        HashMap::get(self, name)
            .cloned()
            .ok_or_else(|| StatusError::Secret(format!("secret '{}' not found", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_var_name_uppercases() {
        assert_eq!(EnvSecretStore::new().var_name("github_token"), "GITHUB_TOKEN");
        assert_eq!(
            EnvSecretStore::with_prefix("CI_").var_name("github_owner"),
            "CI_GITHUB_OWNER"
        );
    }

    #[test]
    fn test_env_missing_secret() {
        let store = EnvSecretStore::with_prefix("CI_STATUS_POSTER_TEST_UNSET_");
        let err = store.get("github_token").unwrap_err();
        assert!(err.to_string().contains("CI_STATUS_POSTER_TEST_UNSET_GITHUB_TOKEN"));
    }

    #[test]
    fn test_map_store() {
        let mut secrets = HashMap::new();
        secrets.insert("github_owner".to_string(), "declan".to_string());
        assert_eq!(SecretStore::get(&secrets, "github_owner").unwrap(), "declan");
        assert!(SecretStore::get(&secrets, "github_token").is_err());
    }
}
