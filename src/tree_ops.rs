// src/tree_ops.rs
//
// Hierarchy emulation over flat key stores: subtree key collection, recursive
// remove, rename with prefix substitution, and threshold-routed object copy.
// Deep trees are walked with an explicit worklist, never call recursion.

use tracing::{debug, info};

use crate::batch::apply_batched;
use crate::error::Result;
use crate::multipart::copy_multipart;
use crate::object_client::ObjectClient;
use crate::paging::list_all;
use crate::path_utils::{ensure_trailing_slash, file_name, target_prefix};

/// Collect every key under `root` treated as a virtual directory. Each level
/// is fully paginated before its subdirectories are queued.
pub async fn collect_tree_keys<C: ObjectClient + ?Sized>(
    client: &C,
    container: &str,
    root: &str,
) -> Result<Vec<String>> {
    let mut keys = Vec::new();
    let mut pending = vec![ensure_trailing_slash(root)];
    while let Some(prefix) = pending.pop() {
        let listing = list_all(client, container, None, &prefix).await?;
        keys.extend(listing.keys);
        pending.extend(listing.common_prefixes);
    }
    Ok(keys)
}

/// Server-side copy of one object, switching to a ranged multipart copy above
/// the provider's whole-copy size threshold. The source is left untouched.
pub async fn copy_object<C: ObjectClient + ?Sized>(
    client: &C,
    from_container: &str,
    from_key: &str,
    to_container: &str,
    to_key: &str,
) -> Result<()> {
    let meta = client.head(from_container, from_key).await?;
    if meta.size > client.profile().multipart_copy_threshold {
        copy_multipart(client, from_container, from_key, to_container, to_key, meta.size).await
    } else {
        client.copy(from_container, from_key, to_container, to_key).await
    }
}

/// Copy then delete. Not atomic: a failure after the copy leaves both names
/// resolving to the same content.
pub async fn move_object<C: ObjectClient + ?Sized>(
    client: &C,
    from_container: &str,
    from_key: &str,
    to_container: &str,
    to_key: &str,
) -> Result<()> {
    copy_object(client, from_container, from_key, to_container, to_key).await?;
    client.delete(from_container, from_key).await
}

/// Remove each path. A path naming a single object is deleted directly;
/// anything else is expanded as a virtual directory and its member keys are
/// bulk-deleted in provider-limit batches. Absent paths are a no-op.
pub async fn remove_paths<C: ObjectClient + ?Sized>(
    client: &C,
    container: &str,
    paths: &[&str],
) -> Result<()> {
    let limit = client.profile().delete_batch_limit;
    for &path in paths {
        if client.exists(container, path).await? {
            client.delete(container, path).await?;
            continue;
        }
        let keys = collect_tree_keys(client, container, path).await?;
        if keys.is_empty() {
            debug!(path, "nothing to remove");
            continue;
        }
        info!(path, keys = keys.len(), "removing virtual subtree");
        apply_batched(&keys, limit, |chunk| async move {
            client.delete_batch(container, &chunk).await
        })
        .await?;
    }
    Ok(())
}

/// Rename each old name under `new_name`. A single object lands at
/// `new_name/<leaf>`; a virtual directory has every member key rewritten with
/// the old prefix replaced by `new_name/`. The targets `""` and `"."` both
/// mean the container root.
pub async fn rename_paths<C: ObjectClient + ?Sized>(
    client: &C,
    container: &str,
    old_names: &[&str],
    new_name: &str,
) -> Result<()> {
    let target = target_prefix(new_name);
    let limit = client.profile().rename_batch_limit;

    for &old in old_names {
        if client.exists(container, old).await? {
            let to_key = format!("{target}{}", file_name(old));
            move_object(client, container, old, container, &to_key).await?;
            continue;
        }

        let old_prefix = ensure_trailing_slash(old);
        let keys = collect_tree_keys(client, container, old).await?;
        if keys.is_empty() {
            debug!(old, "nothing to rename");
            continue;
        }

        let pairs: Vec<(String, String)> = keys
            .into_iter()
            .map(|key| {
                let to = format!("{target}{}", key.strip_prefix(&old_prefix).unwrap_or(&key));
                (key, to)
            })
            .collect();

        info!(
            old,
            members = pairs.len(),
            target = target.as_str(),
            "renaming virtual subtree"
        );
        apply_batched(&pairs, limit, |chunk| async move {
            for (from, to) in &chunk {
                move_object(client, container, from, container, to).await?;
            }
            Ok(())
        })
        .await?;
    }
    Ok(())
}
