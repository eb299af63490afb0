//! Request validation against a template's declared inputs.

use crate::error::DeployError;
use crate::types::{DeploymentRequest, Template};

/// Check that the request supplies every input the template declares.
///
/// Values are not type-checked here; a non-numeric PORT value is left for the
/// container engine to reject.
pub fn validate_request(template: &Template, request: &DeploymentRequest) -> Result<(), DeployError> {
    if request.name.trim().is_empty() {
        return Err(DeployError::Validation("deployment name is empty".into()));
    }

    let missing: Vec<&str> = template
        .inputs
        .iter()
        .map(|input| input.label.as_str())
        .filter(|label| !request.inputs.contains_key(*label))
        .collect();

    if !missing.is_empty() {
        return Err(DeployError::Validation(format!(
            "values missing for inputs: {}",
            missing.join(", ")
        )));
    }

    Ok(())
}
