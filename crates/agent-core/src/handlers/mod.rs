//! Per-domain request handlers. Each module implements the contract
//! `handle(request, routed_path, state) -> Result<HttpResponse, AgentError>`.

pub mod apps;
pub mod contacts;
pub mod device;
pub mod files;
pub mod orchestrator;
pub mod peer;
pub mod ping;
pub mod shell;
pub mod sms;

/// Deserialize a JSON request body, or an empty object if the body is empty
/// — several GET-style actions accept no body at all.
pub(crate) fn body_json<T: serde::de::DeserializeOwned + Default>(
    body: &[u8],
) -> Result<T, crate::error::AgentError> {
    if body.is_empty() {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| crate::error::AgentError::ClientInput(format!("invalid JSON body: {e}")))
}

/// Deserialize a JSON request body with no default — for wire types whose
/// fields are all mandatory, where an empty body is always a client error.
pub(crate) fn required_json<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, crate::error::AgentError> {
    serde_json::from_slice(body).map_err(|e| crate::error::AgentError::ClientInput(format!("invalid JSON body: {e}")))
}
