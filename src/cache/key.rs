//! Cache key generation.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Order-independent identity of a cached request: a resource scope plus
/// parameters. Parameters live in a sorted map, so insertion order never
/// affects equality, hashing or the canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint {
    scope: Vec<String>,
    params: BTreeMap<String, String>,
}

impl Fingerprint {
    pub fn new<I, S>(scope: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scope: scope.into_iter().map(Into::into).collect(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key.into(), value.to_string());
        self
    }

    /// Adds the parameter only when `value` is present.
    pub fn with_opt_param<V: ToString>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(v) => self.with_param(key, v),
            None => self,
        }
    }

    pub fn scope(&self) -> &[String] {
        &self.scope
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn starts_with<S: AsRef<str>>(&self, prefix: &[S]) -> bool {
        prefix.len() <= self.scope.len()
            && prefix
                .iter()
                .zip(self.scope.iter())
                .all(|(p, s)| p.as_ref() == s)
    }

    /// Stable textual form: `products/list?limit=5`.
    pub fn canonical(&self) -> String {
        let path = self.scope.join("/");
        if self.params.is_empty() {
            return path;
        }
        let query: String = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.params.iter())
            .finish();
        format!("{}?{}", path, query)
    }

    /// SHA-256 of the canonical form, hex encoded.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical().as_bytes());
        hasher.finalize().iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

/// Selects cache entries for invalidation, optimistic writes and removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryFilter {
    All,
    Exact(Fingerprint),
    /// Every fingerprint whose scope starts with these segments.
    Prefix(Vec<String>),
}

impl QueryFilter {
    pub fn prefix<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        QueryFilter::Prefix(segments.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, key: &Fingerprint) -> bool {
        match self {
            QueryFilter::All => true,
            QueryFilter::Exact(fp) => fp == key,
            QueryFilter::Prefix(p) => key.starts_with(p),
        }
    }
}

impl From<Fingerprint> for QueryFilter {
    fn from(fp: Fingerprint) -> Self {
        QueryFilter::Exact(fp)
    }
}

impl From<&Fingerprint> for QueryFilter {
    fn from(fp: &Fingerprint) -> Self {
        QueryFilter::Exact(fp.clone())
    }
}

/// Key hierarchy for product queries.
///
/// ```text
/// products
/// ├── list        ?limit=
/// ├── detail      ?id=
/// ├── categories
/// └── category    ?category=
/// ```
pub struct ProductKeys;

impl ProductKeys {
    pub const ROOT: &'static str = "products";

    pub fn all() -> QueryFilter {
        QueryFilter::prefix([Self::ROOT])
    }

    pub fn lists() -> QueryFilter {
        QueryFilter::prefix([Self::ROOT, "list"])
    }

    /// A zero limit is the unlimited list.
    pub fn list(limit: Option<u32>) -> Fingerprint {
        Fingerprint::new([Self::ROOT, "list"]).with_opt_param("limit", limit.filter(|n| *n > 0))
    }

    pub fn details() -> QueryFilter {
        QueryFilter::prefix([Self::ROOT, "detail"])
    }

    pub fn detail(id: i64) -> Fingerprint {
        Fingerprint::new([Self::ROOT, "detail"]).with_param("id", id)
    }

    pub fn categories() -> Fingerprint {
        Fingerprint::new([Self::ROOT, "categories"])
    }

    pub fn by_category(category: &str) -> Fingerprint {
        Fingerprint::new([Self::ROOT, "category"]).with_param("category", category)
    }
}
