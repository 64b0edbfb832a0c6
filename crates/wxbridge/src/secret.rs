//! Secret values that must never be logged or exported in cleartext.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde::Serializer;

/// Fixed-length mask written in place of a secret. The length never depends on the secret.
pub const REDACTED: &str = "********";

/// Upstream API key (`ak`).
///
/// `Debug`, `Display` and `Serialize` all produce [`REDACTED`]; the only way to read the
/// key is [`ApiKey::expose`], which the gateway calls when building a request.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey({})", REDACTED)
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl Serialize for ApiKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED)
    }
}
