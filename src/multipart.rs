// src/multipart.rs
//
// Multipart upload orchestration: part planning, the verified part upload
// (one integrity retry), whole-file uploads with bounded part concurrency,
// and the ranged multipart copy used above the whole-copy size threshold.
//
// Failure semantics: the first part/chunk error kills the session. No abort
// call is issued, so the backend may retain orphaned session state; the
// caller must initiate a fresh session to retry.

use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use md5::{Digest, Md5};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::constants::PART_UPLOAD_CONCURRENCY;
use crate::error::{Result, StorageError};
use crate::filesystem::PartDescriptor;
use crate::object_client::ObjectClient;

/// One planned part: 1-based contiguous number plus its byte range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartRange {
    pub part_number: i32,
    pub offset: u64,
    pub length: u64,
}

/// Divide `total_size` bytes into contiguous, non-overlapping parts of
/// `part_size`, the last part absorbing the remainder. A zero-byte payload
/// still yields one (empty) part so completion has something to merge.
pub fn plan_parts(total_size: u64, part_size: u64) -> Vec<PartRange> {
    let part_size = part_size.max(1);
    if total_size == 0 {
        return vec![PartRange { part_number: 1, offset: 0, length: 0 }];
    }

    let mut parts = Vec::with_capacity(total_size.div_ceil(part_size) as usize);
    let mut offset = 0u64;
    let mut part_number = 1i32;
    while offset < total_size {
        let length = part_size.min(total_size - offset);
        parts.push(PartRange { part_number, offset, length });
        offset += length;
        part_number += 1;
    }
    parts
}

/// Hex MD5 of one part's bytes, the integrity tag S3-dialect backends echo
/// back as the part ETag.
pub fn part_integrity_tag(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

fn normalize_etag(e_tag: &str) -> &str {
    e_tag.trim_matches('"')
}

/// Upload one part and, when the provider echoes MD5 ETags, verify it against
/// the locally computed tag. Exactly one retry on mismatch, then
/// `IntegrityMismatch`.
pub async fn upload_part_verified<C: ObjectClient + ?Sized>(
    client: &C,
    container: &str,
    key: &str,
    session: &str,
    part_number: i32,
    data: &[u8],
) -> Result<PartDescriptor> {
    let verify = client.profile().verify_part_md5;
    let expected = verify.then(|| part_integrity_tag(data));

    let mut retried = false;
    loop {
        let desc = client
            .upload_part(container, key, session, part_number, data)
            .await
            .map_err(|e| wrap_session_error(session, e))?;

        let Some(expected) = expected.as_deref() else {
            return Ok(desc);
        };
        if normalize_etag(&desc.e_tag) == expected {
            return Ok(desc);
        }
        if retried {
            return Err(StorageError::IntegrityMismatch {
                part_number,
                expected: expected.to_string(),
                actual: normalize_etag(&desc.e_tag).to_string(),
            });
        }
        warn!(
            part_number,
            expected,
            actual = normalize_etag(&desc.e_tag),
            "part integrity mismatch, retrying once"
        );
        retried = true;
    }
}

/// Full initiate → parts → complete cycle for one local file. Parts upload
/// with bounded concurrency and are sorted by part number before completion,
/// so completion order never matters. The first failure cancels outstanding
/// sibling parts and surfaces immediately.
pub async fn upload_file_multipart<C: ObjectClient + ?Sized>(
    client: &C,
    container: &str,
    key: &str,
    file: &Path,
    part_size: u64,
) -> Result<()> {
    let total_size = tokio::fs::metadata(file)
        .await
        .with_context(|| format!("cannot stat upload source {}", file.display()))
        .map_err(|e| StorageError::Configuration(format!("{e:#}")))?
        .len();

    let session = client.create_session(container, key).await?;
    let plan = plan_parts(total_size, part_size);
    info!(
        key,
        total_size,
        parts = plan.len(),
        session = session.as_str(),
        "starting multipart upload"
    );

    let sem = Arc::new(Semaphore::new(PART_UPLOAD_CONCURRENCY));
    let mut in_flight = FuturesUnordered::new();
    for part in &plan {
        let sem = sem.clone();
        let session = session.as_str();
        in_flight.push(async move {
            let _permit = sem
                .acquire_owned()
                .await
                .map_err(|e| StorageError::Backend(anyhow::Error::new(e)))?;
            let data = read_file_range(file, part.offset, part.length)
                .await
                .map_err(|e| wrap_session_error(session, StorageError::Backend(e)))?;
            debug!(part_number = part.part_number, length = part.length, "uploading part");
            upload_part_verified(client, container, key, session, part.part_number, &data).await
        });
    }

    let mut parts: Vec<PartDescriptor> = Vec::with_capacity(plan.len());
    while let Some(res) = in_flight.next().await {
        parts.push(res?);
    }
    drop(in_flight);

    parts.sort_by_key(|p| p.part_number);
    client
        .complete_session(container, key, &session, &parts)
        .await
        .map_err(|e| wrap_session_error(&session, e))?;
    info!(key, parts = parts.len(), "multipart upload complete");
    Ok(())
}

/// Ranged multipart copy for objects too large for one whole-object copy.
/// Chunks are copied in ascending order; the part list handed to completion
/// covers the source exactly once.
pub async fn copy_multipart<C: ObjectClient + ?Sized>(
    client: &C,
    from_container: &str,
    from_key: &str,
    to_container: &str,
    to_key: &str,
    total_size: u64,
) -> Result<()> {
    // A zero-size source has no ranges to copy; write the empty object
    // directly instead of opening a session for one empty part.
    if total_size == 0 {
        debug!(to_key, "zero-size copy is one empty put");
        return client.put(to_container, to_key, &[]).await;
    }

    let session = client.create_session(to_container, to_key).await?;
    let plan = plan_parts(total_size, client.profile().copy_part_size);
    info!(
        from_key,
        to_key,
        total_size,
        chunks = plan.len(),
        "starting multipart copy"
    );

    let mut parts = Vec::with_capacity(plan.len());
    for part in &plan {
        debug!(part_number = part.part_number, offset = part.offset, "copying range");
        let desc = client
            .copy_part_range(from_container, from_key, to_container, to_key, &session, part)
            .await
            .map_err(|e| wrap_session_error(&session, e))?;
        parts.push(desc);
    }

    client
        .complete_session(to_container, to_key, &session, &parts)
        .await
        .map_err(|e| wrap_session_error(&session, e))?;
    info!(to_key, chunks = parts.len(), "multipart copy complete");
    Ok(())
}

/// Keep typed errors (integrity mismatch, not-found) intact; fold transport
/// failures into the session-scoped multipart error.
fn wrap_session_error(session: &str, err: StorageError) -> StorageError {
    match err {
        e @ (StorageError::IntegrityMismatch { .. }
        | StorageError::NotFound(_)
        | StorageError::Multipart { .. }) => e,
        other => StorageError::Multipart {
            session: session.to_string(),
            source: anyhow::Error::new(other),
        },
    }
}

async fn read_file_range(path: &Path, offset: u64, length: u64) -> anyhow::Result<Vec<u8>> {
    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("open {}", path.display()))?;
    file.seek(SeekFrom::Start(offset)).await?;
    let mut buf = vec![0u8; length as usize];
    file.read_exact(&mut buf)
        .await
        .with_context(|| format!("read {} bytes at offset {}", length, offset))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn plan_splits_with_remainder_in_last_part() {
        let plan = plan_parts(12 * MIB, 5 * MIB);
        assert_eq!(plan.len(), 3);
        assert_eq!(
            plan.iter().map(|p| p.length).collect::<Vec<_>>(),
            vec![5 * MIB, 5 * MIB, 2 * MIB]
        );
        assert_eq!(
            plan.iter().map(|p| p.part_number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn plan_covers_size_exactly_once() {
        for (size, chunk) in [(1u64, 10u64), (10, 10), (11, 10), (99, 7), (1000, 1)] {
            let plan = plan_parts(size, chunk);
            // Segments ascend, abut and sum to the total.
            let mut expected_offset = 0u64;
            for (i, part) in plan.iter().enumerate() {
                assert_eq!(part.part_number, i as i32 + 1);
                assert_eq!(part.offset, expected_offset);
                assert!(part.length <= chunk);
                expected_offset += part.length;
            }
            assert_eq!(expected_offset, size);
            let tail = plan.last().unwrap();
            assert_eq!(tail.length, size - chunk * (plan.len() as u64 - 1));
        }
    }

    #[test]
    fn plan_for_empty_payload_is_one_empty_part() {
        let plan = plan_parts(0, 5 * MIB);
        assert_eq!(plan, vec![PartRange { part_number: 1, offset: 0, length: 0 }]);
    }

    #[test]
    fn etag_quotes_are_ignored() {
        assert_eq!(normalize_etag("\"abc123\""), "abc123");
        assert_eq!(normalize_etag("abc123"), "abc123");
    }

    #[test]
    fn integrity_tag_is_hex_md5() {
        // Well-known digest of the empty input.
        assert_eq!(part_integrity_tag(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }
}
