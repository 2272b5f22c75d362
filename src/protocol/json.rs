use serde::{de::DeserializeOwned, Serialize};

use super::ProtocolError;

pub(super) fn encode<T: Serialize>(message: &T) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(message)?)
}

pub(super) fn decode<T: DeserializeOwned>(line: &str) -> Result<T, ProtocolError> {
    if line.trim().is_empty() {
        return Err(ProtocolError::Empty);
    }
    Ok(serde_json::from_str(line)?)
}
