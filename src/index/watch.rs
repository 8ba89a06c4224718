//! # Index Watches
//!
//! One watcher per referencing kind keeps the `FieldIndexer` current.
//!
//! The watcher's initial list (and every relist after a desync) is applied as a resync
//! generation, so queries keep answering from the previous state until the new list
//! is complete.

use crate::crd::ReferenceKind;
use crate::index::FieldIndexer;
use crate::observability;
use futures::StreamExt;
use kube::api::{Api, DynamicObject};
use kube::Client;
use kube_runtime::watcher;
use kube_runtime::watcher::Event;
use kube_runtime::WatchStreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Delay before re-listing a kind the cluster does not serve
const UNAVAILABLE_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Effect of a watch error on a kind's index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorEffect {
    /// The cluster does not serve the kind; its index answers `NotFound`
    Unavailable,
    /// The watcher backs off and relists; the index keeps its current state
    Retry,
}

/// Decide what a watch error means for the index of a kind
///
/// Only a 404 on the list or watch request itself means the kind is not served.
/// An error reported inside a running watch (410 Expired and friends) never does.
pub fn watch_error_effect(error: &watcher::Error) -> WatchErrorEffect {
    match error {
        watcher::Error::InitialListFailed(kube::Error::Api(ae))
        | watcher::Error::WatchStartFailed(kube::Error::Api(ae))
            if ae.code == 404 =>
        {
            WatchErrorEffect::Unavailable
        }
        _ => WatchErrorEffect::Retry,
    }
}

/// Apply one watch error to the index
pub fn apply_watch_error(
    indexer: &FieldIndexer,
    kind: &ReferenceKind,
    error: &watcher::Error,
) -> WatchErrorEffect {
    let effect = watch_error_effect(error);
    if effect == WatchErrorEffect::Unavailable {
        indexer.mark_unavailable(kind);
    }
    effect
}

/// Apply one watch event to the index
pub fn apply_event(indexer: &FieldIndexer, kind: &ReferenceKind, event: Event<DynamicObject>) {
    match event {
        Event::Init => indexer.begin_resync(kind),
        Event::InitApply(obj) => indexer.resync_apply(kind, obj),
        Event::InitDone => {
            indexer.finish_resync(kind);
            info!(
                kind = kind.kind,
                objects = indexer.indexed_objects(kind),
                "index.synced"
            );
        }
        Event::Apply(obj) => indexer.apply(kind, obj),
        Event::Delete(obj) => indexer.delete(kind, &obj),
    }
}

/// Spawn an index watch for every kind in `kinds`
///
/// With `namespace` set only that namespace is watched.
pub fn start_index_watches(
    client: Client,
    indexer: Arc<FieldIndexer>,
    kinds: &'static [ReferenceKind],
    namespace: Option<String>,
) -> Vec<JoinHandle<()>> {
    kinds
        .iter()
        .map(|kind| {
            let client = client.clone();
            let indexer = Arc::clone(&indexer);
            let namespace = namespace.clone();
            tokio::spawn(async move { run_index_watch(client, indexer, kind, namespace).await })
        })
        .collect()
}

async fn run_index_watch(
    client: Client,
    indexer: Arc<FieldIndexer>,
    kind: &'static ReferenceKind,
    namespace: Option<String>,
) {
    let ar = kind.api_resource();
    let api: Api<DynamicObject> = match namespace.as_deref() {
        Some(ns) => Api::namespaced_with(client, ns, &ar),
        None => Api::all_with(client, &ar),
    };

    debug!(kind = kind.kind, plural = kind.plural, "index.watch.starting");
    loop {
        let mut stream = watcher(api.clone(), watcher::Config::default())
            .default_backoff()
            .boxed();
        let mut unavailable = false;

        while let Some(event) = stream.next().await {
            match event {
                Ok(event) => apply_event(&indexer, kind, event),
                Err(e) => match apply_watch_error(&indexer, kind, &e) {
                    WatchErrorEffect::Unavailable => {
                        warn!(
                            kind = kind.kind,
                            plural = kind.plural,
                            "{} are not served by the cluster, treating as unreferenced",
                            kind.plural
                        );
                        unavailable = true;
                        break;
                    }
                    WatchErrorEffect::Retry => {
                        warn!(kind = kind.kind, error = %e, "index.watch.error");
                    }
                },
            }
            observability::metrics::set_indexed_objects(kind.kind, indexer.indexed_objects(kind));
        }

        observability::metrics::set_indexed_objects(kind.kind, indexer.indexed_objects(kind));
        if unavailable {
            tokio::time::sleep(UNAVAILABLE_RETRY_DELAY).await;
        } else {
            warn!(kind = kind.kind, "index.watch.ended, restarting");
        }
    }
}
