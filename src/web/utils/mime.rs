/// Fallback content type for proxied objects whose upstream sent none.
pub fn content_type_for_path(path: &str) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string()
}
