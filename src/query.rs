//! Resource filter tokens to Anki search syntax.

/// Translate the last segment of a resource URI into an Anki search query.
///
/// `deckcurrent` becomes `deck:current`, `isdue` becomes `is:due`; anything
/// else is assumed to already be a native query (`nid:123`, `tag:foo`).
pub fn translate(token: &str) -> String {
    if let Some(rest) = token.strip_prefix("deck") {
        format!("deck:{rest}")
    } else if let Some(rest) = token.strip_prefix("is") {
        format!("is:{rest}")
    } else {
        token.to_string()
    }
}
