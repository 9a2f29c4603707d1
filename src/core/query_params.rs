use std::collections::HashMap;

/// Parse query parameters from a URI string
///
/// Handles URL decoding and returns a HashMap of parameter key-value pairs.
/// Multiple values for the same key are not supported (only the last is kept).
///
/// # Example
/// ```
/// use flock::core::query_params::parse_query_params;
///
/// let params = parse_query_params("/posts?page=2&user=j%C3%BCrgen");
/// assert_eq!(params.get("page"), Some(&"2".to_string()));
/// assert_eq!(params.get("user"), Some(&"jürgen".to_string()));
/// ```
pub fn parse_query_params(uri: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    if let Some(query_start) = uri.find('?') {
        let query = &uri[query_start + 1..];
        for param in query.split('&').filter(|p| !p.is_empty()) {
            if let Some((key, encoded_value)) = param.split_once('=') {
                let decoded = urlencoding::decode(encoded_value)
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| encoded_value.to_string());
                params.insert(key.to_string(), decoded);
            } else {
                // Flag parameter without value
                params.insert(param.to_string(), String::new());
            }
        }
    }

    params
}

/// Get a page number (1-based) with a default; zero and garbage clamp to 1.
pub fn get_page(params: &HashMap<String, String>, key: &str, default: usize) -> usize {
    params
        .get(key)
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(default)
        .max(1)
}
