//! Composite ids - Import ids made of comma-joined parts

use crate::provider::{ErrorKind, ProviderError, ProviderResult};

/// Split `id` into exactly `parts` non-empty comma-separated pieces.
/// `usage` is the error message shown when the id does not fit.
pub fn split(id: &str, parts: usize, usage: &str) -> ProviderResult<Vec<String>> {
    let pieces: Vec<String> = id.split(',').map(|p| p.trim().to_string()).collect();
    if pieces.len() != parts || pieces.iter().any(String::is_empty) {
        return Err(ProviderError::new(
            ErrorKind::InvalidCompositeId,
            format!("{usage} (got '{id}')"),
        ));
    }
    Ok(pieces)
}

/// Split `id` into two parts
pub fn split_pair(id: &str, usage: &str) -> ProviderResult<(String, String)> {
    let mut pieces = split(id, 2, usage)?.into_iter();
    match (pieces.next(), pieces.next()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(ProviderError::new(ErrorKind::InvalidCompositeId, usage)),
    }
}

pub fn join(parts: &[&str]) -> String {
    parts.join(",")
}
