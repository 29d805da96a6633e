//! Key-value store abstraction behind the view cache.
//!
//! The operations mirror the subset of Redis the cache needs, so the
//! process-local `MemoryStore` and the shared `RedisStore` are
//! interchangeable.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::config::CacheConfig;
use super::lock::{read_or_recover, write_or_recover};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),
    #[error("cache `{op}` failed: {message}")]
    Backend { op: &'static str, message: String },
}

impl CacheError {
    pub fn backend(op: &'static str, message: impl Into<String>) -> Self {
        Self::Backend {
            op,
            message: message.into(),
        }
    }
}

/// One round of a cursor-based key scan. A `next_cursor` of zero ends the scan.
///
/// Deleting keys between rounds never makes a later round skip a key that
/// matched when the scan started and still exists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    pub keys: Vec<String>,
    pub next_cursor: u64,
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError>;

    /// Delete keys and return how many existed.
    async fn delete(&self, keys: &[String]) -> Result<u64, CacheError>;

    /// Iterate keys matching a Redis-style glob without blocking the store.
    async fn scan(&self, pattern: &str, cursor: u64, count: usize)
    -> Result<ScanPage, CacheError>;

    /// Add `member` to `set`; the set expires `ttl` after its latest addition.
    async fn set_add(&self, set: &str, member: &str, ttl: Duration) -> Result<(), CacheError>;

    async fn set_members(&self, set: &str) -> Result<Vec<String>, CacheError>;
}

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

struct SetEntry {
    members: BTreeSet<String>,
    expires_at: Instant,
}

/// Process-local store with TTL expiry and an LRU bound on stored values.
///
/// Sets expire like values; expired sets are pruned whenever a set is
/// written.
pub struct MemoryStore {
    values: RwLock<LruCache<String, Entry>>,
    sets: RwLock<HashMap<String, SetEntry>>,
}

impl MemoryStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            values: RwLock::new(LruCache::new(config.memory_capacity_non_zero())),
            sets: RwLock::new(HashMap::new()),
        }
    }

    /// Number of live values (expired entries excluded).
    pub fn len(&self) -> usize {
        let now = Instant::now();
        read_or_recover(&self.values, "len")
            .iter()
            .filter(|(_, entry)| entry.expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live_keys(&self, now: Instant) -> BTreeSet<String> {
        let mut keys: BTreeSet<String> = read_or_recover(&self.values, "scan")
            .iter()
            .filter(|(_, entry)| entry.expires_at > now)
            .map(|(key, _)| key.clone())
            .collect();
        keys.extend(
            read_or_recover(&self.sets, "scan")
                .iter()
                .filter(|(_, set)| set.expires_at > now)
                .map(|(key, _)| key.clone()),
        );
        keys
    }
}

/// Scan order of a key: the leading 64 bits of its SHA-256 digest.
///
/// Positions depend only on the key, so a cursor stays valid while other
/// keys come and go.
fn scan_position(key: &str) -> u64 {
    let digest = Sha256::digest(key.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head)
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut values = write_or_recover(&self.values, "get");
        let expired = match values.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                return Ok(Some(entry.value.clone()));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            values.pop(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let entry = Entry {
            value: value.to_vec(),
            expires_at: Instant::now() + ttl,
        };
        write_or_recover(&self.values, "set").put(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, CacheError> {
        let now = Instant::now();
        let mut removed = 0;
        {
            let mut values = write_or_recover(&self.values, "delete");
            for key in keys {
                if let Some(entry) = values.pop(key.as_str())
                    && entry.expires_at > now
                {
                    removed += 1;
                }
            }
        }
        let mut sets = write_or_recover(&self.sets, "delete");
        for key in keys {
            if let Some(set) = sets.remove(key.as_str())
                && set.expires_at > now
            {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn scan(
        &self,
        pattern: &str,
        cursor: u64,
        count: usize,
    ) -> Result<ScanPage, CacheError> {
        let count = count.max(1);
        let mut remaining: Vec<(u64, String)> = self
            .live_keys(Instant::now())
            .into_iter()
            .filter(|key| glob_match(pattern, key))
            .map(|key| (scan_position(&key), key))
            .filter(|(position, _)| *position >= cursor)
            .collect();
        remaining.sort_unstable();

        let mut end = count.min(remaining.len());
        // Keys sharing a position go out together so the next round can
        // resume strictly after it.
        while end < remaining.len() && remaining[end].0 == remaining[end - 1].0 {
            end += 1;
        }
        // Positions after the first page are non-zero, so zero only ends a scan.
        let next_cursor = remaining.get(end).map_or(0, |(position, _)| *position);
        remaining.truncate(end);

        Ok(ScanPage {
            keys: remaining.into_iter().map(|(_, key)| key).collect(),
            next_cursor,
        })
    }

    async fn set_add(&self, set: &str, member: &str, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut sets = write_or_recover(&self.sets, "set_add");
        sets.retain(|_, entry| entry.expires_at > now);
        let entry = sets.entry(set.to_string()).or_insert_with(|| SetEntry {
            members: BTreeSet::new(),
            expires_at: now,
        });
        entry.members.insert(member.to_string());
        entry.expires_at = now + ttl;
        Ok(())
    }

    async fn set_members(&self, set: &str) -> Result<Vec<String>, CacheError> {
        let now = Instant::now();
        Ok(read_or_recover(&self.sets, "set_members")
            .get(set)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.members.iter().cloned().collect())
            .unwrap_or_default())
    }
}

/// Store used when caching is disabled or the backend is unreachable:
/// reads always miss and writes are dropped.
#[derive(Debug, Default)]
pub struct NullStore;

#[async_trait]
impl CacheStore for NullStore {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<(), CacheError> {
        Ok(())
    }

    async fn delete(&self, _keys: &[String]) -> Result<u64, CacheError> {
        Ok(0)
    }

    async fn scan(
        &self,
        _pattern: &str,
        _cursor: u64,
        _count: usize,
    ) -> Result<ScanPage, CacheError> {
        Ok(ScanPage::default())
    }

    async fn set_add(&self, _set: &str, _member: &str, _ttl: Duration) -> Result<(), CacheError> {
        Ok(())
    }

    async fn set_members(&self, _set: &str) -> Result<Vec<String>, CacheError> {
        Ok(Vec::new())
    }
}

/// Redis glob semantics: `*`, `?`, `[abc]`, `[^a]`, `[a-z]` and `\` escapes.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    match_from(&pattern, &text)
}

fn match_from(pattern: &[char], text: &[char]) -> bool {
    let (mut p, mut t) = (0, 0);
    // Backtrack point for the most recent `*`: (pattern index after it, text index).
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        let step = match pattern.get(p) {
            Some('*') => {
                star = Some((p + 1, t));
                p += 1;
                continue;
            }
            Some('?') => Some(p + 1),
            Some('[') => match_class(pattern, p, text[t]),
            Some('\\') if p + 1 < pattern.len() => {
                (pattern[p + 1] == text[t]).then_some(p + 2)
            }
            Some(c) => (*c == text[t]).then_some(p + 1),
            None => None,
        };

        match step {
            Some(next) => {
                p = next;
                t += 1;
            }
            None => match star {
                Some((star_p, star_t)) => {
                    p = star_p;
                    t = star_t + 1;
                    star = Some((star_p, star_t + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}

/// Match a `[...]` class starting at `start`; returns the index after `]`.
fn match_class(pattern: &[char], start: usize, ch: char) -> Option<usize> {
    let mut i = start + 1;
    let negate = pattern.get(i) == Some(&'^');
    if negate {
        i += 1;
    }

    let mut matched = false;
    loop {
        let current = *pattern.get(i)?;
        if current == ']' {
            break;
        }
        if current == '\\' {
            let escaped = *pattern.get(i + 1)?;
            matched |= escaped == ch;
            i += 2;
            continue;
        }
        if pattern.get(i + 1) == Some(&'-') && pattern.get(i + 2).is_some_and(|c| *c != ']') {
            let (lo, hi) = (current, pattern[i + 2]);
            let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
            matched |= (lo..=hi).contains(&ch);
            i += 3;
            continue;
        }
        matched |= current == ch;
        i += 1;
    }

    (matched != negate).then_some(i + 1)
}
