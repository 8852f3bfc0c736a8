//! Identifier quoting and attribute naming helpers.

/// Quote an SQL identifier with double quotes, doubling embedded quotes.
///
/// ```
/// use rowmodel_core::quote_ident;
///
/// assert_eq!(quote_ident("posts"), "\"posts\"");
/// assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
/// ```
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Turn an attribute name into a human readable label (`user_id` -> `User`).
///
/// Used when rendering full validation messages.
pub fn humanize(attribute: &str) -> String {
    let trimmed = attribute.strip_suffix("_id").unwrap_or(attribute);
    let spaced = trimmed.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
