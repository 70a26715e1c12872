pub mod memory;
pub mod python;

use bitcode::{Decode, Encode};
use rocket::FromFormField;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Pixel-permutation algorithm applied before the symmetric cipher.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode, FromFormField,
)]
#[serde(rename_all = "lowercase")]
pub enum MapVariant {
    Logistic,
    Arnold,
    Tent,
    Henon,
}

impl Default for MapVariant {
    fn default() -> Self {
        MapVariant::Logistic
    }
}

impl MapVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            MapVariant::Logistic => "logistic",
            MapVariant::Arnold => "arnold",
            MapVariant::Tent => "tent",
            MapVariant::Henon => "henon",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricsCategory {
    Encryption,
    Steganography,
}

impl MetricsCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricsCategory::Encryption => "encryption",
            MetricsCategory::Steganography => "steganography",
        }
    }
}

/// One fully-described computation to hand to a capability backend.
#[derive(Debug, Clone)]
pub enum CapabilityCall {
    Encrypt {
        image: PathBuf,
        key: String,
        map: MapVariant,
    },
    Decrypt {
        input: PathBuf,
        key: String,
    },
    StegoEncrypt {
        secret: PathBuf,
        cover: PathBuf,
        key: String,
        map: MapVariant,
    },
    StegoDecrypt {
        input: PathBuf,
        key: String,
    },
    Metrics {
        category: MetricsCategory,
        original: PathBuf,
        produced: PathBuf,
    },
}

impl CapabilityCall {
    pub fn name(&self) -> &'static str {
        match self {
            CapabilityCall::Encrypt { .. } => "encrypt",
            CapabilityCall::Decrypt { .. } => "decrypt",
            CapabilityCall::StegoEncrypt { .. } => "stego-encrypt",
            CapabilityCall::StegoDecrypt { .. } => "stego-decrypt",
            CapabilityCall::Metrics { .. } => "metrics",
        }
    }

    /// The payload field naming the produced artifact, for calls that yield one.
    pub fn output_field(&self) -> Option<&'static str> {
        match self {
            CapabilityCall::Encrypt { .. } => Some("encrypted_path"),
            CapabilityCall::Decrypt { .. } => Some("decrypted_path"),
            CapabilityCall::StegoEncrypt { .. } => Some("stego_path"),
            CapabilityCall::StegoDecrypt { .. } => Some("decrypted_path"),
            CapabilityCall::Metrics { .. } => None,
        }
    }
}

/// The single structured document a capability emits on completion.
///
/// `success: false` documents are protocol-valid; the calling stage decides
/// whether they are fatal.
#[derive(Debug, Clone)]
pub struct StructuredResult {
    pub success: bool,
    pub document: Value,
}

impl StructuredResult {
    pub fn error_text(&self) -> Option<&str> {
        self.document.get("error").and_then(Value::as_str)
    }

    pub fn path_field(&self, field: &str) -> Option<&str> {
        self.document.get(field).and_then(Value::as_str)
    }
}

#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("capability '{call}' exceeded the {limit:?} deadline")]
    Timeout { call: &'static str, limit: Duration },

    #[error("capability '{call}' produced more than {limit} bytes of output")]
    Overflow { call: &'static str, limit: usize },

    #[error("capability '{call}' emitted a malformed result: {detail}")]
    Protocol {
        call: &'static str,
        detail: String,
        diagnostics: String,
    },

    #[error("capability '{call}' failed: {detail}")]
    Execution {
        call: &'static str,
        detail: String,
        diagnostics: String,
    },
}

impl CapabilityError {
    /// Side-channel text captured from the backend, empty when none arrived.
    pub fn diagnostics(&self) -> &str {
        match self {
            CapabilityError::Protocol { diagnostics, .. }
            | CapabilityError::Execution { diagnostics, .. } => diagnostics,
            _ => "",
        }
    }
}

#[rocket::async_trait]
pub trait ImageCapability: Send + Sync {
    async fn invoke(&self, call: CapabilityCall) -> Result<StructuredResult, CapabilityError>;
}
