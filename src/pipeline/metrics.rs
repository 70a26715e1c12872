use bitcode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::capability::{CapabilityCall, ImageCapability, MetricsCategory};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct Entropy {
    pub original: f64,
    pub encrypted: f64,
}

/// Quality measurements attached to every record. Fields that do not apply
/// to the operation, or that could not be measured, stay at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, Encode, Decode)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub encryption_time_ms: u64,
    pub entropy: Entropy,
    pub npcr: f64,
    pub uaci: f64,
    pub correlation: f64,
    pub psnr: f64,
    pub mse: f64,
}

#[derive(Debug)]
pub enum MetricsOutcome {
    Measured(Metrics),
    Unavailable { reason: String },
}

/// Measure the produced artifact against the original. Never fails the
/// request; any problem degrades to `Unavailable`.
pub async fn measure(
    capability: &dyn ImageCapability,
    category: MetricsCategory,
    original: &Path,
    produced: &Path,
) -> MetricsOutcome {
    let call = CapabilityCall::Metrics {
        category,
        original: original.to_path_buf(),
        produced: produced.to_path_buf(),
    };
    let result = match capability.invoke(call).await {
        Ok(result) => result,
        Err(err) => {
            return MetricsOutcome::Unavailable {
                reason: err.to_string(),
            };
        }
    };
    if !result.success {
        return MetricsOutcome::Unavailable {
            reason: result
                .error_text()
                .unwrap_or("measurement reported failure")
                .to_string(),
        };
    }
    match parse_document(category, &result.document) {
        Some(metrics) => MetricsOutcome::Measured(metrics),
        None => MetricsOutcome::Unavailable {
            reason: "measurement document lacks the expected fields".to_string(),
        },
    }
}

fn parse_document(category: MetricsCategory, document: &Value) -> Option<Metrics> {
    let mut metrics = Metrics::default();
    match category {
        MetricsCategory::Encryption => {
            let entropy = document.get("entropy")?;
            metrics.entropy = Entropy {
                original: entropy.get("original")?.as_f64()?,
                encrypted: entropy.get("encrypted")?.as_f64()?,
            };
            metrics.npcr = document.get("npcr")?.as_f64()?;
            metrics.uaci = document.get("uaci")?.as_f64()?;
            // Reported either as a bare number or as {original, encrypted}.
            let correlation = document.get("correlation")?;
            metrics.correlation = correlation
                .as_f64()
                .or_else(|| correlation.get("encrypted").and_then(Value::as_f64))?;
        }
        MetricsCategory::Steganography => {
            metrics.mse = document.get("mse")?.as_f64()?;
            metrics.psnr = document.get("psnr")?.as_f64()?;
        }
    }
    Some(metrics)
}
