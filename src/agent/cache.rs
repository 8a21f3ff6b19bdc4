//! Cache lifecycle - background maintenance of the server-side context cache
//!
//! The refresher task is the sole writer of the cache state; `generate`
//! reads the current handle with a single `borrow().clone()` and proceeds
//! with whatever it sees. Failures demote the state to empty and are only
//! logged — callers simply pay full instruction cost until the next tick
//! recreates the cache.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::backend::{Backend, CacheRequest};

/// Opaque cache resource name, shared between the refresher and readers.
pub(crate) type CacheHandle = Arc<str>;

/// Background refresher task.
///
/// Ticks at half the TTL so a refresh always lands well before expiry; the
/// first tick fires immediately, creating the cache right after agent
/// construction. Exits on cancellation without remote cleanup — the cache
/// expires via its own TTL.
pub(crate) async fn run(
    backend: Arc<dyn Backend>,
    state: watch::Sender<Option<CacheHandle>>,
    request: CacheRequest,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(request.ttl / 2);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Cache refresher stopping");
                break;
            }
            _ = ticker.tick() => {
                tick(backend.as_ref(), &state, &request).await;
            }
        }
    }
}

/// One maintenance step: create the cache if none is active, otherwise
/// extend its TTL.
pub(crate) async fn tick(
    backend: &dyn Backend,
    state: &watch::Sender<Option<CacheHandle>>,
    request: &CacheRequest,
) {
    let active = state.borrow().clone();

    match active {
        None => match backend.create_cache(request).await {
            Ok(name) => {
                info!("Context cache created: {}", name);
                let _ = state.send(Some(Arc::from(name)));
            }
            Err(err) => {
                warn!("Context cache creation failed: {}", err);
            }
        },
        Some(name) => {
            if let Err(err) = backend.refresh_cache(&name, request.ttl).await {
                warn!("Context cache refresh failed for {}: {}", name, err);
                let _ = state.send(None);
            } else {
                debug!("Context cache refreshed: {}", name);
            }
        }
    }
}
