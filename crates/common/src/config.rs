use std::collections::HashMap;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(&EnvLookup::process())
    }

    pub fn from_lookup(lookup: &EnvLookup) -> Self {
        lookup
            .get("ENVIRONMENT")
            .map(|value| Self::parse(&value))
            .unwrap_or(Environment::Development)
    }
}

/// Key/value source that service configs are read from.
///
/// Production code reads the process environment; tests hand in a fixed map
/// so they never have to mutate global state.
pub struct EnvLookup {
    source: Box<dyn Fn(&str) -> Option<String> + Send + Sync>,
}

impl EnvLookup {
    pub fn process() -> Self {
        Self {
            source: Box::new(|key| env::var(key).ok()),
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: HashMap<String, String> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            source: Box::new(move |key| map.get(key).cloned()),
        }
    }

    /// Returns the trimmed value for `key`; blank values count as unset.
    pub fn get(&self, key: &str) -> Option<String> {
        (self.source)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    pub fn string_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    /// Parses `key`, falling back to `default` when unset or unparsable.
    pub fn parse_or<T: FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|value| value.parse().ok())
            .unwrap_or(default)
    }
}
