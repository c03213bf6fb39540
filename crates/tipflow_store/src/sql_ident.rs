use crate::error::{StoreError, Result};

/// Store column names come from the config-driven `KindSchema`, not from
/// request data, but they still get interpolated into SQL text (SQLite has
/// no bind-parameter syntax for identifiers). Reject anything that isn't a
/// plain identifier before that happens.
pub fn validate_identifier(name: &str) -> Result<&str> {
    let ok = !name.is_empty()
        && name.chars().next().unwrap().is_ascii_alphabetic()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok {
        Ok(name)
    } else {
        Err(StoreError::InvalidState(format!(
            "invalid store column identifier: {name}"
        )))
    }
}
