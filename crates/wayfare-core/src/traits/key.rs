//! Request key trait and implementations
//!
//! Two requests with the same key are the same request: they share a cache
//! entry, a circuit breaker and an in-flight slot. Keys must therefore encode
//! every filter that changes the response.

use serde::Serialize;
use std::fmt::Display;

/// Default separator between key parts
pub const KEY_SEPARATOR: &str = "-";

/// Trait for types that can be used as request keys
pub trait RequestKey: Send + Sync {
    /// Generate the key string
    fn request_key(&self) -> String;

    /// Optional prefix naming the endpoint family
    fn prefix(&self) -> Option<&str> {
        None
    }

    /// Get the full key including prefix
    fn full_key(&self) -> String {
        match self.prefix() {
            Some(prefix) => format!("{}{}{}", prefix, KEY_SEPARATOR, self.request_key()),
            None => self.request_key(),
        }
    }
}

impl RequestKey for String {
    fn request_key(&self) -> String {
        self.clone()
    }
}

impl RequestKey for &str {
    fn request_key(&self) -> String {
        self.to_string()
    }
}

impl RequestKey for &String {
    fn request_key(&self) -> String {
        (*self).clone()
    }
}

impl<T1: Display + Send + Sync, T2: Display + Send + Sync> RequestKey for (T1, T2) {
    fn request_key(&self) -> String {
        format!("{}{}{}", self.0, KEY_SEPARATOR, self.1)
    }
}

impl<T1: Display + Send + Sync, T2: Display + Send + Sync, T3: Display + Send + Sync> RequestKey
    for (T1, T2, T3)
{
    fn request_key(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}",
            self.0,
            self.1,
            self.2,
            sep = KEY_SEPARATOR
        )
    }
}

/// Render a value as compact JSON for use inside a key
///
/// Struct fields serialize in declaration order and maps should be
/// `BTreeMap`s so equal filters always render identically.
pub fn json_part<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

/// Composite key builder for endpoint + filter keys
#[derive(Debug, Clone, Default)]
pub struct CompositeKey {
    parts: Vec<String>,
    prefix: Option<String>,
}

impl CompositeKey {
    /// Create a new composite key builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Add a part to the key
    pub fn part(mut self, part: impl Display) -> Self {
        self.parts.push(part.to_string());
        self
    }

    /// Add a part rendered as JSON
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        self.parts.push(json_part(value));
        self
    }
}

impl RequestKey for CompositeKey {
    fn request_key(&self) -> String {
        self.parts.join(KEY_SEPARATOR)
    }

    fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }
}
