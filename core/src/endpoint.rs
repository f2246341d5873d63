//! URL construction and `application/x-www-form-urlencoded` encoding.

use std::collections::BTreeMap;

use url::form_urlencoded;
use url::Url;

use crate::error::Result;

/// String-keyed, multi-valued parameters. Keys encode in sorted order.
pub type Values = BTreeMap<String, Vec<String>>;

/// `http://{host}{path}?{query}`. `host` may carry a port.
pub fn build_http_url(host: &str, path: &str, query: Option<&Values>) -> Result<Url> {
    build_url("http", host, path, query)
}

/// `https://{host}{path}?{query}`. `host` may carry a port.
pub fn build_https_url(host: &str, path: &str, query: Option<&Values>) -> Result<Url> {
    build_url("https", host, path, query)
}

fn build_url(scheme: &str, host: &str, path: &str, query: Option<&Values>) -> Result<Url> {
    let mut url = Url::parse(&format!("{scheme}://{host}"))?;
    url.set_path(path);
    if let Some(values) = query {
        let encoded = encode_values(values);
        // an empty query must not leave a dangling '?'
        if !encoded.is_empty() {
            url.set_query(Some(&encoded));
        }
    }
    Ok(url)
}

/// Encode every value of every key as `key=value` pairs joined by `&`.
pub fn encode_values(values: &Values) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, list) in values {
        for value in list {
            serializer.append_pair(key, value);
        }
    }
    serializer.finish()
}
