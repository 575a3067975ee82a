use serde::{Deserialize, Serialize};

/// Error envelope returned by the record store on non-2xx responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreErrorBody {
    pub error: StoreErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoreErrorDetail {
    Structured {
        #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
        kind: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Code(String),
}

impl StoreErrorBody {
    pub fn structured(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: StoreErrorDetail::Structured {
                kind: Some(kind.into()),
                message: Some(message.into()),
            },
        }
    }

    /// Human readable message carried by the body, if any.
    pub fn message(&self) -> Option<&str> {
        match &self.error {
            StoreErrorDetail::Structured { message, .. } => message
                .as_deref()
                .map(str::trim)
                .filter(|message| !message.is_empty()),
            StoreErrorDetail::Code(code) => {
                let code = code.trim();
                (!code.is_empty()).then_some(code)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_structured_message() {
        let body: StoreErrorBody = serde_json::from_str(
            r#"{"error":{"type":"INVALID_PERMISSIONS","message":"You are not permitted"}}"#,
        )
        .expect("decode");
        assert_eq!(body.message(), Some("You are not permitted"));
    }

    #[test]
    fn reads_bare_error_code() {
        let body: StoreErrorBody =
            serde_json::from_str(r#"{"error":"NOT_FOUND"}"#).expect("decode");
        assert_eq!(body.message(), Some("NOT_FOUND"));
    }

    #[test]
    fn structured_without_message_has_none() {
        let body: StoreErrorBody =
            serde_json::from_str(r#"{"error":{"type":"SERVER_ERROR"}}"#).expect("decode");
        assert_eq!(body.message(), None);
    }
}
