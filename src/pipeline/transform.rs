use log::error;
use std::path::Path;

use crate::capability::{CapabilityCall, CapabilityError, ImageCapability};
use crate::common::MIN_ENCRYPT_KEY_LENGTH;
use crate::pipeline::error::PipelineError;
use crate::pipeline::staging::{StagedFile, StagingArea};

pub fn validate_encrypt_key(key: &str) -> Result<(), PipelineError> {
    if key.chars().count() < MIN_ENCRYPT_KEY_LENGTH {
        return Err(PipelineError::validation(format!(
            "Encryption key must be at least {} characters",
            MIN_ENCRYPT_KEY_LENGTH
        )));
    }
    Ok(())
}

pub fn validate_decrypt_key(key: &str) -> Result<(), PipelineError> {
    if key.is_empty() {
        return Err(PipelineError::validation("Decryption key must not be empty"));
    }
    Ok(())
}

/// Run one transforming capability call and adopt the artifact it reports.
pub async fn run(
    capability: &dyn ImageCapability,
    staging: &StagingArea,
    call: CapabilityCall,
) -> Result<StagedFile, PipelineError> {
    let name = call.name();
    let Some(output_field) = call.output_field() else {
        return Err(PipelineError::Internal(anyhow::anyhow!(
            "measurement calls cannot run as transformations"
        )));
    };

    let result = match capability.invoke(call).await {
        Ok(result) => result,
        Err(err) => {
            if !err.diagnostics().is_empty() {
                error!("Capability '{}' diagnostics:\n{}", name, err.diagnostics());
            }
            return Err(err.into());
        }
    };

    if !result.success {
        let detail = result
            .error_text()
            .unwrap_or("capability reported failure")
            .to_string();
        return Err(CapabilityError::Execution {
            call: name,
            detail,
            diagnostics: String::new(),
        }
        .into());
    }

    let Some(reported) = result.path_field(output_field) else {
        return Err(CapabilityError::Protocol {
            call: name,
            detail: format!("success document lacks the '{}' field", output_field),
            diagnostics: String::new(),
        }
        .into());
    };

    if !staging.contains(Path::new(reported)) {
        return Err(CapabilityError::Protocol {
            call: name,
            detail: format!("reported output {:?} is outside the staging root", reported),
            diagnostics: String::new(),
        }
        .into());
    }

    Ok(staging.adopt(reported))
}
