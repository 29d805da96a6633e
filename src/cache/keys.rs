//! Cache key definitions.
//!
//! Defines `ViewQuery` for the parameters of a cached read, `CacheKey` for the
//! canonical string stored in the backend and `GroupKey` for the invalidation
//! sets that track entries.

use std::collections::BTreeMap;
use std::fmt;

use sha2::{Digest, Sha256};
use time::Date;

/// Query parts longer than this collapse into a digest.
const MAX_QUERY_LEN: usize = 200;

/// A cached read model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ViewKind {
    /// Single order detail.
    Order,
    /// Paginated orders of one customer.
    CustomerOrders,
    /// Admin order listing.
    Orders,
    /// Status-count dashboard.
    OrderStats,
}

impl ViewKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ViewKind::Order => "order",
            ViewKind::CustomerOrders => "customer_orders",
            ViewKind::Orders => "orders",
            ViewKind::OrderStats => "order_stats",
        }
    }

    /// Glob matching every key of this view.
    pub fn pattern(self, prefix: &str) -> String {
        format!("{prefix}:view:{}*", self.as_str())
    }
}

/// Parameters of a cached read.
///
/// Two queries that differ only in filter insertion order, search casing or
/// surrounding whitespace produce the same key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewQuery {
    view: ViewKind,
    entity_id: Option<i64>,
    page: Option<u32>,
    per_page: Option<u32>,
    sort: Option<String>,
    search: Option<String>,
    from: Option<Date>,
    to: Option<Date>,
    filters: BTreeMap<String, String>,
}

impl ViewQuery {
    pub fn new(view: ViewKind) -> Self {
        Self {
            view,
            entity_id: None,
            page: None,
            per_page: None,
            sort: None,
            search: None,
            from: None,
            to: None,
            filters: BTreeMap::new(),
        }
    }

    pub fn view(&self) -> ViewKind {
        self.view
    }

    pub fn entity(mut self, id: i64) -> Self {
        self.entity_id = Some(id);
        self
    }

    pub fn page(mut self, page: u32, per_page: u32) -> Self {
        self.page = Some(page);
        self.per_page = Some(per_page);
        self
    }

    pub fn sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = non_empty(sort.into());
        self
    }

    pub fn search(mut self, search: Option<&str>) -> Self {
        self.search = search.and_then(|value| non_empty(value.trim().to_lowercase()));
        self
    }

    pub fn date_range(mut self, from: Option<Date>, to: Option<Date>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    /// Add a named filter; empty values are dropped.
    pub fn filter(mut self, name: &str, value: Option<impl ToString>) -> Self {
        let name = name.trim();
        match value.map(|v| v.to_string()).and_then(non_empty) {
            Some(value) if !name.is_empty() => {
                self.filters.insert(name.to_string(), value);
            }
            _ => {
                self.filters.remove(name);
            }
        }
        self
    }

    /// Build the canonical key under `prefix`.
    pub fn cache_key(&self, prefix: &str) -> CacheKey {
        let query = self.canonical_query();
        let head = format!("{prefix}:view:{}", self.view.as_str());
        if query.is_empty() {
            return CacheKey(head);
        }
        if query.len() > MAX_QUERY_LEN {
            let digest = hex::encode(Sha256::digest(query.as_bytes()));
            return CacheKey(format!("{head}|h={digest}"));
        }
        CacheKey(format!("{head}|{query}"))
    }

    fn canonical_query(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        let mut push = |name: &str, value: Option<String>| {
            if let Some(value) = value {
                parts.push(format!("{}={}", escape(name), escape(&value)));
            }
        };

        push("id", self.entity_id.map(|id| id.to_string()));
        push("page", self.page.map(|p| p.to_string()));
        push("per_page", self.per_page.map(|p| p.to_string()));
        push("sort", self.sort.clone());
        push("q", self.search.clone());
        push("from", self.from.map(|d| d.to_string()));
        push("to", self.to.map(|d| d.to_string()));
        for (name, value) in &self.filters {
            push(&format!("f.{name}"), Some(value.clone()));
        }

        parts.join("|")
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Percent-escape delimiters and glob metacharacters.
fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '%' | '|' | '=' | ':' | '*' | '?' | '[' | ']' | '\\' => {
                out.push_str(&format!("%{:02X}", ch as u32));
            }
            c if c.is_control() => {
                let mut buf = [0u8; 4];
                for byte in c.encode_utf8(&mut buf).bytes() {
                    out.push_str(&format!("%{byte:02X}"));
                }
            }
            c => out.push(c),
        }
    }
    out
}

/// Canonical key of one cached entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Invalidation group: a named set of keys that go stale together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GroupKey {
    /// Everything derived from a single order.
    Order(i64),
    /// Every list of one customer's orders.
    CustomerOrders(i64),
    /// Listings that span all orders.
    OrderIndex,
}

impl GroupKey {
    fn suffix(&self) -> String {
        match self {
            GroupKey::Order(id) => format!("order:{id}"),
            GroupKey::CustomerOrders(id) => format!("customer_orders:{id}"),
            GroupKey::OrderIndex => "order_index".to_string(),
        }
    }

    /// Name of the set holding member keys.
    pub fn set_key(&self, prefix: &str) -> String {
        format!("{prefix}:group:{}", self.suffix())
    }

    /// Name of the generation token bumped on each invalidation.
    pub fn generation_key(&self, prefix: &str) -> String {
        format!("{prefix}:gen:{}", self.suffix())
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.suffix())
    }
}
