use std::collections::HashMap;

/// Decode one `application/x-www-form-urlencoded` component.
///
/// `+` stands for a space; invalid percent escapes are kept verbatim.
pub fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

/// Parse `key=value&flag` pairs. Repeated keys keep the last value.
pub fn parse_pairs(raw: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    for param in raw.split('&').filter(|p| !p.is_empty()) {
        match param.split_once('=') {
            Some((key, value)) => {
                params.insert(decode_component(key), decode_component(value));
            }
            None => {
                params.insert(decode_component(param), String::new());
            }
        }
    }

    params
}

/// Parse query parameters from a URI string
///
/// ```
/// let params = murmur::core::query_params::parse_query_params("/path?user=john&page=2");
/// assert_eq!(params.get("user"), Some(&"john".to_string()));
/// assert_eq!(params.get("page"), Some(&"2".to_string()));
/// ```
pub fn parse_query_params(uri: &str) -> HashMap<String, String> {
    match query_string(uri) {
        Some(query) => parse_pairs(query),
        None => HashMap::new(),
    }
}

/// The raw query string of a URI, without the leading `?` or any fragment.
pub fn query_string(uri: &str) -> Option<&str> {
    let query = &uri[uri.find('?')? + 1..];
    Some(query.split('#').next().unwrap_or(query))
}

pub fn get_string(params: &HashMap<String, String>, key: &str) -> Option<String> {
    params.get(key).filter(|s| !s.is_empty()).cloned()
}

/// Get a page-style integer parameter; missing, invalid and < 1 all mean `default`/1.
pub fn get_int(params: &HashMap<String, String>, key: &str, default: usize) -> usize {
    params
        .get(key)
        .and_then(|s| s.trim().parse::<usize>().ok())
        .unwrap_or(default)
        .max(1)
}
