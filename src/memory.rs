// src/memory.rs
//
// In-memory object backend. Implements the full `ObjectClient` contract with
// faithful delimiter-listing pagination, so the shared paging, tree and
// multipart algorithms can be exercised hermetically. Also used as the wire
// double in the integration tests: it counts every operation and can corrupt
// part ETags on demand.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Result, StorageError};
use crate::filesystem::{ListingPage, ObjectMetadata, PartDescriptor};
use crate::multipart::{part_integrity_tag, PartRange};
use crate::object_client::{ObjectClient, ProviderProfile};

/// Operation counters, snapshot via [`MemoryClient::counters`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpCounters {
    pub puts: usize,
    pub gets: usize,
    pub deletes: usize,
    pub delete_batches: usize,
    pub whole_copies: usize,
    pub range_copies: usize,
    pub part_uploads: usize,
    pub sessions_created: usize,
    pub sessions_completed: usize,
    pub list_pages: usize,
}

struct SessionState {
    container: String,
    key: String,
    parts: HashMap<i32, Vec<u8>>,
}

#[derive(Default)]
struct State {
    containers: HashMap<String, BTreeMap<String, Vec<u8>>>,
    sessions: HashMap<String, SessionState>,
    counters: OpCounters,
    next_session: u64,
    // part number -> how many more uploads of it report a corrupted ETag
    bad_etag_remaining: HashMap<i32, u32>,
}

/// In-memory `ObjectClient`. The lock is never held across an await point.
pub struct MemoryClient {
    profile: ProviderProfile,
    state: Mutex<State>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::with_profile(ProviderProfile::new("memory"))
    }

    /// Custom profile, e.g. a tiny page size or copy threshold for tests.
    pub fn with_profile(profile: ProviderProfile) -> Self {
        Self {
            profile,
            state: Mutex::new(State::default()),
        }
    }

    pub fn counters(&self) -> OpCounters {
        self.state.lock().expect("state poisoned").counters.clone()
    }

    /// Seed an object without touching the counters.
    pub fn seed(&self, container: &str, key: &str, data: &[u8]) {
        let mut st = self.state.lock().expect("state poisoned");
        st.containers
            .entry(container.to_string())
            .or_default()
            .insert(key.to_string(), data.to_vec());
    }

    /// All keys of a container, in key order.
    pub fn keys(&self, container: &str) -> Vec<String> {
        let st = self.state.lock().expect("state poisoned");
        st.containers
            .get(container)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contents(&self, container: &str, key: &str) -> Option<Vec<u8>> {
        let st = self.state.lock().expect("state poisoned");
        st.containers.get(container)?.get(key).cloned()
    }

    /// Make the next `times` uploads of `part_number` report a wrong ETag.
    pub fn corrupt_part_etag(&self, part_number: i32, times: u32) {
        let mut st = self.state.lock().expect("state poisoned");
        st.bad_etag_remaining.insert(part_number, times);
    }
}

impl Default for MemoryClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectClient for MemoryClient {
    fn profile(&self) -> &ProviderProfile {
        &self.profile
    }

    async fn exists(&self, container: &str, key: &str) -> Result<bool> {
        let st = self.state.lock().expect("state poisoned");
        Ok(st
            .containers
            .get(container)
            .is_some_and(|m| m.contains_key(key)))
    }

    async fn head(&self, container: &str, key: &str) -> Result<ObjectMetadata> {
        let st = self.state.lock().expect("state poisoned");
        let data = st
            .containers
            .get(container)
            .and_then(|m| m.get(key))
            .ok_or_else(|| StorageError::not_found(container, key))?;
        Ok(ObjectMetadata {
            size: data.len() as u64,
            content_type: None,
            last_modified: None,
            e_tag: Some(part_integrity_tag(data)),
        })
    }

    async fn put(&self, container: &str, key: &str, data: &[u8]) -> Result<()> {
        let mut st = self.state.lock().expect("state poisoned");
        st.counters.puts += 1;
        st.containers
            .entry(container.to_string())
            .or_default()
            .insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn get(&self, container: &str, key: &str) -> Result<Vec<u8>> {
        let mut st = self.state.lock().expect("state poisoned");
        st.counters.gets += 1;
        st.containers
            .get(container)
            .and_then(|m| m.get(key))
            .cloned()
            .ok_or_else(|| StorageError::not_found(container, key))
    }

    async fn delete(&self, container: &str, key: &str) -> Result<()> {
        let mut st = self.state.lock().expect("state poisoned");
        st.counters.deletes += 1;
        if let Some(map) = st.containers.get_mut(container) {
            map.remove(key);
        }
        Ok(())
    }

    async fn delete_batch(&self, container: &str, keys: &[String]) -> Result<()> {
        let limit = self.profile.delete_batch_limit;
        let mut st = self.state.lock().expect("state poisoned");
        st.counters.delete_batches += 1;
        if keys.len() > limit {
            return Err(StorageError::Backend(anyhow::anyhow!(
                "bulk delete of {} keys exceeds the {limit}-key limit",
                keys.len()
            )));
        }
        if let Some(map) = st.containers.get_mut(container) {
            for key in keys {
                map.remove(key);
            }
        }
        Ok(())
    }

    async fn copy(
        &self,
        from_container: &str,
        from_key: &str,
        to_container: &str,
        to_key: &str,
    ) -> Result<()> {
        let mut st = self.state.lock().expect("state poisoned");
        st.counters.whole_copies += 1;
        let data = st
            .containers
            .get(from_container)
            .and_then(|m| m.get(from_key))
            .cloned()
            .ok_or_else(|| StorageError::not_found(from_container, from_key))?;
        st.containers
            .entry(to_container.to_string())
            .or_default()
            .insert(to_key.to_string(), data);
        Ok(())
    }

    async fn create_session(&self, container: &str, key: &str) -> Result<String> {
        let mut st = self.state.lock().expect("state poisoned");
        st.counters.sessions_created += 1;
        st.next_session += 1;
        let id = format!("mem-session-{}", st.next_session);
        st.sessions.insert(
            id.clone(),
            SessionState {
                container: container.to_string(),
                key: key.to_string(),
                parts: HashMap::new(),
            },
        );
        Ok(id)
    }

    async fn upload_part(
        &self,
        _container: &str,
        _key: &str,
        session: &str,
        part_number: i32,
        data: &[u8],
    ) -> Result<PartDescriptor> {
        let mut st = self.state.lock().expect("state poisoned");
        st.counters.part_uploads += 1;
        let corrupt = match st.bad_etag_remaining.get_mut(&part_number) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        };
        let sess = st
            .sessions
            .get_mut(session)
            .ok_or_else(|| StorageError::Backend(anyhow::anyhow!("unknown session {session}")))?;
        sess.parts.insert(part_number, data.to_vec());
        let e_tag = if corrupt {
            "00000000000000000000000000000000".to_string()
        } else {
            part_integrity_tag(data)
        };
        Ok(PartDescriptor { part_number, e_tag })
    }

    async fn copy_part_range(
        &self,
        from_container: &str,
        from_key: &str,
        _to_container: &str,
        _to_key: &str,
        session: &str,
        part: &PartRange,
    ) -> Result<PartDescriptor> {
        let mut st = self.state.lock().expect("state poisoned");
        st.counters.range_copies += 1;
        let source = st
            .containers
            .get(from_container)
            .and_then(|m| m.get(from_key))
            .ok_or_else(|| StorageError::not_found(from_container, from_key))?;
        let start = part.offset as usize;
        let end = start + part.length as usize;
        if end > source.len() {
            return Err(StorageError::Backend(anyhow::anyhow!(
                "range {}..{} exceeds source size {}",
                start,
                end,
                source.len()
            )));
        }
        let slice = source[start..end].to_vec();
        let e_tag = part_integrity_tag(&slice);
        let sess = st
            .sessions
            .get_mut(session)
            .ok_or_else(|| StorageError::Backend(anyhow::anyhow!("unknown session {session}")))?;
        sess.parts.insert(part.part_number, slice);
        Ok(PartDescriptor {
            part_number: part.part_number,
            e_tag,
        })
    }

    async fn complete_session(
        &self,
        _container: &str,
        _key: &str,
        session: &str,
        parts: &[PartDescriptor],
    ) -> Result<()> {
        let mut st = self.state.lock().expect("state poisoned");
        st.counters.sessions_completed += 1;
        let sess = st
            .sessions
            .remove(session)
            .ok_or_else(|| StorageError::Backend(anyhow::anyhow!("unknown session {session}")))?;
        let mut merged = Vec::new();
        for desc in parts {
            let data = sess.parts.get(&desc.part_number).ok_or_else(|| {
                StorageError::Backend(anyhow::anyhow!(
                    "session {session} has no staged part {}",
                    desc.part_number
                ))
            })?;
            merged.extend_from_slice(data);
        }
        st.containers
            .entry(sess.container)
            .or_default()
            .insert(sess.key, merged);
        Ok(())
    }

    /// The full common-prefix set for the queried level is reported on the
    /// first page (no cursor) and does not count against the page cap; only
    /// leaf keys paginate. This is the page shape the shared listing engine
    /// assumes of real providers.
    async fn list_page(
        &self,
        container: &str,
        prefix: &str,
        cursor: Option<&str>,
        page_size: i32,
    ) -> Result<ListingPage> {
        let cap = page_size.max(1) as usize;
        let mut st = self.state.lock().expect("state poisoned");
        st.counters.list_pages += 1;

        let empty = BTreeMap::new();
        let map = st.containers.get(container).unwrap_or(&empty);

        let common_prefixes: Vec<String> = if cursor.is_none() {
            let mut seen: BTreeSet<String> = BTreeSet::new();
            for raw in map.keys().filter(|k| k.starts_with(prefix)) {
                let rest = &raw[prefix.len()..];
                if let Some(idx) = rest.find('/') {
                    seen.insert(format!("{prefix}{}", &rest[..=idx]));
                }
            }
            seen.into_iter().collect()
        } else {
            Vec::new()
        };

        let mut keys = Vec::new();
        let mut last_key: Option<&str> = None;
        let mut truncated = false;
        let mut leaves = map
            .keys()
            .filter(|k| k.starts_with(prefix))
            .filter(|k| !k[prefix.len()..].contains('/'))
            .filter(|k| cursor.is_none_or(|c| k.as_str() > c))
            .peekable();
        while let Some(raw) = leaves.next() {
            keys.push(raw.clone());
            last_key = Some(raw);
            if keys.len() >= cap && leaves.peek().is_some() {
                truncated = true;
                break;
            }
        }

        Ok(ListingPage {
            keys,
            common_prefixes,
            truncated,
            next_cursor: if truncated {
                last_key.map(str::to_string)
            } else {
                None
            },
        })
    }
}
