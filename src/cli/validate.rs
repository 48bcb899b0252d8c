//! The `validate` subcommand: run [`crate::is_valid_pipeline`] (§4.10) over
//! a pipeline supplied as a raw JSON array, the CLI-facing counterpart to
//! feeding `compile`'s output straight back through the validator.

use serde_json::Value;

use super::CliError;

#[derive(Debug, Clone, Default)]
pub struct ValidateCliOptions {
    /// The pipeline to validate — a JSON array of one-key stage objects.
    pub pipeline: Value,
}

pub fn execute_validate(options: &ValidateCliOptions) -> Result<bool, CliError> {
    let stages = options
        .pipeline
        .as_array()
        .ok_or(CliError::MalformedRequest("pipeline body must be a JSON array"))?;
    Ok(crate::validator::is_valid_pipeline(stages))
}
