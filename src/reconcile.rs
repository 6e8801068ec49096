//! Object resolution and bounded delete retry.
//!
//! The grid-assigned `_ref` is not a stable primary key for every object
//! type: renames and moves performed outside the provider regenerate it.
//! [`resolve_object`] therefore falls back to an extensible-attribute
//! search on the internal-ID key when a direct lookup 404s or returns an
//! object that is no longer "ours".
//!
//! Resolution walks these states:
//!
//! 1. **Direct lookup** by the stored `_ref`. A 404 moves to the search;
//!    any other error is fatal.
//! 2. **Identity check** on a hit: if the stored snapshot carries an
//!    internal ID and the remote copy carries a different one, someone
//!    else's object now occupies that ref — move to the search. With no
//!    stored ID there is nothing to verify and the hit is accepted.
//! 3. **Search by internal ID**: no stored ID or zero matches means the
//!    object is gone (state removal, not an error); otherwise the first
//!    match wins.

use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::extattrs::{ExtAttrs, INTERNAL_ID_EA};
use crate::wapi::ObjectApi;

/// The outcome of resolving a tracked object against the grid.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The object was located; the raw WAPI object is attached.
    Found(Value),
    /// The object no longer exists anywhere we can see.
    Gone,
}

/// Locate the object behind `reference`, falling back to an internal-ID
/// search when the ref is stale.
///
/// `stored_all` is the `extattrs_all` snapshot from prior state; its
/// internal-ID entry is the correlation key. Errors other than a
/// direct-lookup 404 are fatal and propagate unchanged.
pub async fn resolve_object(
    api: &dyn ObjectApi,
    objtype: &str,
    reference: &str,
    stored_all: &ExtAttrs,
    return_fields: &[&str],
) -> Result<Resolution, ProviderError> {
    match api.get_by_ref(reference, return_fields).await {
        Ok(object) => {
            let remote = ExtAttrs::from_object(&object)?;
            match (stored_all.internal_id(), remote.internal_id()) {
                (Some(stored), Some(remote_id)) if stored == remote_id => {
                    Ok(Resolution::Found(object))
                }
                // A different ID, or none at all, means the ref now belongs
                // to some other object.
                (Some(stored), _) => {
                    debug!(
                        reference,
                        "internal ID mismatch on direct lookup, searching by ID"
                    );
                    search_by_internal_id(api, objtype, stored, return_fields).await
                }
                // No stored ID means there is nothing to verify against;
                // accept the direct hit.
                (None, _) => Ok(Resolution::Found(object)),
            }
        }
        Err(e) if e.is_not_found() => match stored_all.internal_id() {
            Some(stored) => {
                debug!(reference, "direct lookup 404, searching by internal ID");
                search_by_internal_id(api, objtype, stored, return_fields).await
            }
            None => Ok(Resolution::Gone),
        },
        Err(e) => Err(e),
    }
}

async fn search_by_internal_id(
    api: &dyn ObjectApi,
    objtype: &str,
    internal_id: &str,
    return_fields: &[&str],
) -> Result<Resolution, ProviderError> {
    let mut matches = api
        .search_by_extattr(objtype, INTERNAL_ID_EA, internal_id, return_fields)
        .await?;
    if matches.is_empty() {
        return Ok(Resolution::Gone);
    }
    if matches.len() > 1 {
        warn!(
            objtype,
            matches = matches.len(),
            "multiple objects share one internal ID, taking the first"
        );
    }
    Ok(Resolution::Found(matches.swap_remove(0)))
}

/// Delete `reference`, retrying in-use conflicts for a bounded window.
///
/// A 404 means the object is already gone and counts as success. Conflicts
/// are retried at a fixed `interval` until `window` elapses, then surfaced.
/// Any other error is fatal on the first occurrence.
pub async fn delete_with_retry(
    api: &dyn ObjectApi,
    reference: &str,
    window: Duration,
    interval: Duration,
) -> Result<(), ProviderError> {
    let start = Instant::now();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match api.delete(reference).await {
            Ok(_) => {
                if attempt > 1 {
                    debug!(reference, attempt, "delete succeeded after retries");
                }
                return Ok(());
            }
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) if e.is_conflict() => {
                if start.elapsed() + interval >= window {
                    warn!(reference, attempt, "delete still blocked, giving up");
                    return Err(e);
                }
                debug!(reference, attempt, error = %e, "delete blocked, will retry");
                tokio::time::sleep(interval).await;
            }
            Err(e) => return Err(e),
        }
    }
}
