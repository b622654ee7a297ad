//! Candidate extraction and response reordering.

use serde_json::Value;
use thiserror::Error;

use crate::config::SearchConfig;

/// Why an upstream response body cannot be re-ranked.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResultsError {
    #[error("response body is not valid JSON")]
    InvalidJson,
    #[error("no candidate array at '{0}'")]
    MissingChoices(String),
}

/// Parse a response body.
pub fn parse_body(body: &[u8]) -> Result<Value, ResultsError> {
    serde_json::from_slice(body).map_err(|_| ResultsError::InvalidJson)
}

/// Texts of the candidates, in upstream order.
///
/// Candidates without a string at `choice_text_pointer` contribute their JSON text.
pub fn candidates(body: &Value, config: &SearchConfig) -> Result<Vec<String>, ResultsError> {
    let choices = body
        .pointer(&config.choices_pointer)
        .and_then(Value::as_array)
        .ok_or_else(|| ResultsError::MissingChoices(config.choices_pointer.clone()))?;

    Ok(choices
        .iter()
        .map(|choice| match choice.pointer(&config.choice_text_pointer) {
            Some(Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        })
        .collect())
}

/// Replace the candidate array with the ranked candidates, in ranking order.
///
/// `ranking` must already be validated against the array length.
pub fn reorder(body: &mut Value, config: &SearchConfig, ranking: &[usize]) -> Result<(), ResultsError> {
    let choices = body
        .pointer_mut(&config.choices_pointer)
        .and_then(Value::as_array_mut)
        .ok_or_else(|| ResultsError::MissingChoices(config.choices_pointer.clone()))?;

    let mut original: Vec<Option<Value>> = choices.drain(..).map(Some).collect();
    choices.extend(ranking.iter().filter_map(|&i| original.get_mut(i).and_then(Option::take)));
    Ok(())
}
