//! Provider endpoint configuration (spec §6): a list of `{name, endpoint,
//! api_key, api_version?, use_v1?}` records feeding the Endpoint Failover
//! Pool (§4.D), loadable from a JSON file, a JSON env var, an array env
//! var, or numbered env vars, merged in that deterministic order.

use serde::Deserialize;

use crate::domain::Endpoint;

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointRecord {
    pub name: String,
    pub endpoint: String,
    pub api_key: String,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default = "default_use_v1")]
    pub use_v1: bool,
}

fn default_use_v1() -> bool {
    true
}

impl From<EndpointRecord> for Endpoint {
    fn from(record: EndpointRecord) -> Self {
        Endpoint {
            name: record.name,
            base_url: record.endpoint,
            credential: record.api_key,
            api_version: record.api_version,
            use_v1: record.use_v1,
            rate_limited_until: None,
            consecutive_failures: 0,
        }
    }
}

/// `prefix` namespaces the env vars for a given provider, e.g. `"OPENAI"`
/// looks at `OPENAI_ENDPOINTS_FILE`, `OPENAI_ENDPOINTS_JSON`,
/// `OPENAI_ENDPOINTS`, and `OPENAI_ENDPOINT_1`/`OPENAI_API_KEY_1`, ....
/// `default_base_url`/`default_key_env` back a single-endpoint fallback when
/// none of those are set.
pub fn load_endpoints(prefix: &str, default_base_url: &str, default_key_env: &str) -> Vec<Endpoint> {
    if let Some(records) = load_from_file(prefix) {
        return into_endpoints(records);
    }
    if let Some(records) = load_from_json_env(prefix) {
        return into_endpoints(records);
    }
    if let Some(records) = load_from_array_env(prefix) {
        return into_endpoints(records);
    }
    if let Some(records) = load_from_numbered_env(prefix) {
        return into_endpoints(records);
    }
    load_single_endpoint_default(prefix, default_base_url, default_key_env)
}

fn into_endpoints(records: Vec<EndpointRecord>) -> Vec<Endpoint> {
    records.into_iter().map(Endpoint::from).collect()
}

fn load_from_file(prefix: &str) -> Option<Vec<EndpointRecord>> {
    let path = std::env::var(format!("{prefix}_ENDPOINTS_FILE")).ok()?;
    let contents = std::fs::read_to_string(&path).ok()?;
    serde_json::from_str(&contents).ok()
}

fn load_from_json_env(prefix: &str) -> Option<Vec<EndpointRecord>> {
    let raw = std::env::var(format!("{prefix}_ENDPOINTS_JSON")).ok()?;
    serde_json::from_str(&raw).ok()
}

/// `NAME1:URL1:KEY1,NAME2:URL2:KEY2` — the array form, colon-delimited
/// fields, comma-delimited entries. `api_version`/`use_v1` aren't
/// expressible in this compact form; callers that need them use the JSON
/// forms above.
fn load_from_array_env(prefix: &str) -> Option<Vec<EndpointRecord>> {
    let raw = std::env::var(format!("{prefix}_ENDPOINTS")).ok()?;
    let records: Vec<EndpointRecord> = raw
        .split(',')
        .filter(|entry| !entry.trim().is_empty())
        .filter_map(|entry| {
            let mut parts = entry.splitn(3, ':');
            let name = parts.next()?.trim().to_string();
            let endpoint = parts.next()?.trim().to_string();
            let api_key = parts.next()?.trim().to_string();
            Some(EndpointRecord { name, endpoint, api_key, api_version: None, use_v1: true })
        })
        .collect();
    if records.is_empty() {
        None
    } else {
        Some(records)
    }
}

/// `{PREFIX}_ENDPOINT_1` / `{PREFIX}_API_KEY_1`, `_2`, ... stopping at the
/// first missing index.
fn load_from_numbered_env(prefix: &str) -> Option<Vec<EndpointRecord>> {
    let mut records = Vec::new();
    for i in 1.. {
        let endpoint = std::env::var(format!("{prefix}_ENDPOINT_{i}"));
        let api_key = std::env::var(format!("{prefix}_API_KEY_{i}"));
        match (endpoint, api_key) {
            (Ok(endpoint), Ok(api_key)) => {
                records.push(EndpointRecord {
                    name: format!("{prefix}-{i}"),
                    endpoint,
                    api_key,
                    api_version: std::env::var(format!("{prefix}_API_VERSION_{i}")).ok(),
                    use_v1: true,
                });
            }
            _ => break,
        }
    }
    if records.is_empty() {
        None
    } else {
        Some(records)
    }
}

fn load_single_endpoint_default(prefix: &str, default_base_url: &str, default_key_env: &str) -> Vec<Endpoint> {
    match std::env::var(default_key_env) {
        Ok(api_key) => vec![Endpoint::new(format!("{prefix}-default"), default_base_url, api_key)],
        Err(_) => Vec::new(),
    }
}
