use std::fmt;

use zeroize::Zeroize;

use crate::error::ScannerError;

const STORE_ID_PREFIX: &str = "app";
const ACCESS_TOKEN_PREFIX: &str = "pat";
const MIN_CREDENTIAL_LEN: usize = 17;

/// Record store coordinates and credentials.
///
/// `demo` routes every request to the in-memory catalogue instead of the
/// network. The token is wiped from memory on drop and never printed.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct StoreConfig {
    pub store_id: String,
    pub table_name: String,
    pub access_token: String,
    pub demo: bool,
}

impl StoreConfig {
    pub fn new(
        store_id: impl Into<String>,
        table_name: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            store_id: store_id.into(),
            table_name: table_name.into(),
            access_token: access_token.into(),
            demo: false,
        }
    }

    pub fn with_demo(mut self, demo: bool) -> Self {
        self.demo = demo;
        self
    }

    /// Returns a trimmed copy when every field is present and well formed.
    pub fn validate(&self) -> Result<Self, ScannerError> {
        let store_id = self.store_id.trim();
        let table_name = self.table_name.trim();
        let access_token = self.access_token.trim();

        if store_id.is_empty() || table_name.is_empty() || access_token.is_empty() {
            return Err(ScannerError::configuration(
                "Please fill in all configuration fields",
            ));
        }

        if !store_id.starts_with(STORE_ID_PREFIX) || store_id.chars().count() < MIN_CREDENTIAL_LEN
        {
            return Err(ScannerError::configuration(
                "Base ID should start with \"app\" and be 17+ characters",
            ));
        }

        if !access_token.starts_with(ACCESS_TOKEN_PREFIX)
            || access_token.chars().count() < MIN_CREDENTIAL_LEN
        {
            return Err(ScannerError::configuration(
                "Personal Access Token should start with \"pat\" and be 17+ characters",
            ));
        }

        Ok(Self {
            store_id: store_id.to_string(),
            table_name: table_name.to_string(),
            access_token: access_token.to_string(),
            demo: self.demo,
        })
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("store_id", &self.store_id)
            .field("table_name", &self.table_name)
            .field("access_token", &"<redacted>")
            .field("demo", &self.demo)
            .finish()
    }
}

impl Drop for StoreConfig {
    fn drop(&mut self) {
        self.access_token.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> StoreConfig {
        StoreConfig::new("appABCDEFGHIJKLMN", "Inventory", "patABCDEFGHIJKLMN")
    }

    #[test]
    fn accepts_well_formed_config_and_trims() {
        let mut raw = valid();
        raw.store_id = format!("  {}  ", raw.store_id);
        let config = raw.validate().expect("valid");
        assert_eq!(config.store_id, "appABCDEFGHIJKLMN");
        assert_eq!(config.table_name, "Inventory");
    }

    #[test]
    fn rejects_missing_fields() {
        let mut config = valid();
        config.table_name = "   ".into();
        let err = config.validate().expect_err("must fail");
        assert_eq!(
            err,
            ScannerError::ConfigurationInvalid("Please fill in all configuration fields".into())
        );
    }

    #[test]
    fn rejects_store_id_without_app_prefix() {
        let mut config = valid();
        config.store_id = "basABCDEFGHIJKLMN".into();
        let err = config.validate().expect_err("must fail");
        assert!(err.to_string().contains("Base ID"), "{err}");
    }

    #[test]
    fn rejects_short_store_id() {
        for len in 3..17 {
            let mut config = valid();
            config.store_id = format!("app{}", "x".repeat(len - 3));
            assert!(
                matches!(config.validate(), Err(ScannerError::ConfigurationInvalid(_))),
                "store id of length {len} must be rejected"
            );
        }
    }

    #[test]
    fn rejects_malformed_token() {
        let mut config = valid();
        config.access_token = "keyABCDEFGHIJKLMN".into();
        let err = config.validate().expect_err("must fail");
        assert!(err.to_string().contains("Personal Access Token"), "{err}");

        let mut config = valid();
        config.access_token = "pat123".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn debug_output_hides_token() {
        let rendered = format!("{:?}", valid());
        assert!(!rendered.contains("patABCDEFGHIJKLMN"));
        assert!(rendered.contains("<redacted>"));
    }
}
