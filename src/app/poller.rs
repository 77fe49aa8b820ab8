use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::api::CatalogClient;
use super::types::ViewerEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PollControl {
    RefreshNow,
    ReloadApps,
    SetPaused(bool),
    Shutdown,
}

/// Aborts the wrapped task when dropped.
pub(crate) struct AbortTaskOnDrop(pub(crate) tokio::task::AbortHandle);

impl Drop for AbortTaskOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn send_status(tx: &UnboundedSender<ViewerEvent>, message: impl Into<String>) {
    let _ = tx.send(ViewerEvent::Status(message.into()));
}

/// Loads the catalog once, then polls reviews for the selected app on a
/// single repeating timer until shut down or the receiver goes away.
pub(crate) async fn run_poller(
    client: CatalogClient,
    interval: Duration,
    mut selection: watch::Receiver<Option<String>>,
    tx: UnboundedSender<ViewerEvent>,
    mut control_rx: UnboundedReceiver<PollControl>,
) {
    if !load_catalog(&client, &tx).await {
        return;
    }

    let initial = selection.borrow_and_update().clone();
    if let Some(app_id) = initial
        && !poll_reviews(&client, &app_id, &tx).await
    {
        return;
    }

    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut paused = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if paused {
                    continue;
                }
                let app_id = selection.borrow().clone();
                if let Some(app_id) = app_id
                    && !poll_reviews(&client, &app_id, &tx).await
                {
                    break;
                }
            }
            changed = selection.changed() => {
                if changed.is_err() {
                    break;
                }
                let app_id = selection.borrow_and_update().clone();
                ticker.reset();
                debug!(app_id = ?app_id, "selection changed");
                if let Some(app_id) = app_id
                    && !poll_reviews(&client, &app_id, &tx).await
                {
                    break;
                }
            }
            control = control_rx.recv() => match control {
                Some(PollControl::RefreshNow) => {
                    ticker.reset();
                    let app_id = selection.borrow().clone();
                    if let Some(app_id) = app_id
                        && !poll_reviews(&client, &app_id, &tx).await
                    {
                        break;
                    }
                }
                Some(PollControl::ReloadApps) => {
                    if !load_catalog(&client, &tx).await {
                        break;
                    }
                }
                Some(PollControl::SetPaused(value)) => {
                    paused = value;
                    info!(paused, "polling toggled");
                    send_status(
                        &tx,
                        if paused { "polling paused" } else { "polling resumed" },
                    );
                }
                Some(PollControl::Shutdown) | None => break,
            },
        }
    }

    debug!("poller stopped");
}

/// Returns `false` once nobody is listening anymore.
async fn load_catalog(client: &CatalogClient, tx: &UnboundedSender<ViewerEvent>) -> bool {
    let event = match client.list_apps().await {
        Ok(apps) => {
            info!(count = apps.len(), "catalog loaded");
            ViewerEvent::AppsLoaded(apps)
        }
        Err(err) => {
            warn!(error = %err, "catalog request failed");
            ViewerEvent::AppsFailed(err.to_string())
        }
    };
    tx.send(event).is_ok()
}

/// Fetches one app's reviews. Returns `false` once nobody is listening anymore.
async fn poll_reviews(
    client: &CatalogClient,
    app_id: &str,
    tx: &UnboundedSender<ViewerEvent>,
) -> bool {
    if tx
        .send(ViewerEvent::Polling {
            app_id: app_id.to_string(),
        })
        .is_err()
    {
        return false;
    }

    let event = match client.list_reviews(app_id).await {
        Ok(reviews) => {
            debug!(app_id, count = reviews.len(), "reviews fetched");
            ViewerEvent::ReviewsLoaded {
                app_id: app_id.to_string(),
                reviews,
                fetched_at: Utc::now(),
            }
        }
        Err(err) => {
            warn!(app_id, error = %err, "reviews request failed");
            ViewerEvent::ReviewsFailed {
                app_id: app_id.to_string(),
                error: err.to_string(),
            }
        }
    };
    tx.send(event).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::extract::{Path, State};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    #[derive(Clone, Default)]
    struct Hits {
        reviews: Arc<AtomicUsize>,
    }

    async fn spawn_backend() -> (String, Hits) {
        let hits = Hits::default();
        let router = Router::new()
            .route(
                "/apps",
                get(|| async { Json(json!([{ "id": "a", "name": "Alpha" }])) }),
            )
            .route(
                "/apps/:id/reviews",
                get(
                    |State(hits): State<Hits>, Path(id): Path<String>| async move {
                        let n = hits.reviews.fetch_add(1, Ordering::SeqCst);
                        Json(json!([{
                            "id": format!("{id}-{n}"),
                            "author": "ann",
                            "rating": 4,
                            "submitted_at": "2026-10-01T00:00:00Z"
                        }]))
                    },
                ),
            )
            .with_state(hits.clone());
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        (format!("http://{addr}"), hits)
    }

    async fn next_event(rx: &mut UnboundedReceiver<ViewerEvent>) -> ViewerEvent {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("event in time")
            .expect("channel open")
    }

    async fn next_reviews(rx: &mut UnboundedReceiver<ViewerEvent>) -> (String, Vec<String>) {
        loop {
            if let ViewerEvent::ReviewsLoaded {
                app_id, reviews, ..
            } = next_event(rx).await
            {
                return (app_id, reviews.into_iter().map(|r| r.id).collect());
            }
        }
    }

    #[tokio::test]
    async fn catalog_then_initial_selection_is_fetched() {
        let (base, _hits) = spawn_backend().await;
        let client = CatalogClient::new(&base, Duration::from_secs(5)).expect("client");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_selection_tx, selection_rx) = watch::channel(Some("a".to_string()));
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_poller(
            client,
            Duration::from_secs(3600),
            selection_rx,
            tx,
            control_rx,
        ));

        match next_event(&mut rx).await {
            ViewerEvent::AppsLoaded(apps) => assert_eq!(apps[0].name, "Alpha"),
            other => panic!("unexpected event {other:?}"),
        }
        let (app_id, ids) = next_reviews(&mut rx).await;
        assert_eq!(app_id, "a");
        assert_eq!(ids, vec!["a-0".to_string()]);

        control_tx.send(PollControl::Shutdown).expect("send shutdown");
        timeout(Duration::from_secs(5), handle)
            .await
            .expect("poller stops")
            .expect("poller task");
    }

    #[tokio::test]
    async fn selection_change_and_refresh_trigger_immediate_fetches() {
        let (base, hits) = spawn_backend().await;
        let client = CatalogClient::new(&base, Duration::from_secs(5)).expect("client");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (selection_tx, selection_rx) = watch::channel(None);
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let _guard = AbortTaskOnDrop(
            tokio::spawn(run_poller(
                client,
                Duration::from_secs(3600),
                selection_rx,
                tx,
                control_rx,
            ))
            .abort_handle(),
        );

        assert!(matches!(next_event(&mut rx).await, ViewerEvent::AppsLoaded(_)));

        selection_tx.send_replace(Some("b".to_string()));
        let (app_id, _) = next_reviews(&mut rx).await;
        assert_eq!(app_id, "b");

        control_tx.send(PollControl::RefreshNow).expect("send refresh");
        let (app_id, ids) = next_reviews(&mut rx).await;
        assert_eq!(app_id, "b");
        assert_eq!(ids, vec!["b-1".to_string()]);
        assert_eq!(hits.reviews.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn paused_timer_skips_ticks_but_refresh_still_fetches() {
        let (base, hits) = spawn_backend().await;
        let client = CatalogClient::new(&base, Duration::from_secs(5)).expect("client");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_selection_tx, selection_rx) = watch::channel(Some("a".to_string()));
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let _guard = AbortTaskOnDrop(
            tokio::spawn(run_poller(
                client,
                Duration::from_millis(50),
                selection_rx,
                tx,
                control_rx,
            ))
            .abort_handle(),
        );

        for _ in 0..3 {
            next_reviews(&mut rx).await;
        }
        assert!(hits.reviews.load(Ordering::SeqCst) >= 3);

        control_tx
            .send(PollControl::SetPaused(true))
            .expect("send pause");
        loop {
            if let ViewerEvent::Status(message) = next_event(&mut rx).await {
                assert_eq!(message, "polling paused");
                break;
            }
        }
        let after_pause = hits.reviews.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(hits.reviews.load(Ordering::SeqCst), after_pause);

        control_tx
            .send(PollControl::RefreshNow)
            .expect("send refresh");
        let (app_id, _) = next_reviews(&mut rx).await;
        assert_eq!(app_id, "a");
        assert_eq!(hits.reviews.load(Ordering::SeqCst), after_pause + 1);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(hits.reviews.load(Ordering::SeqCst), after_pause + 1);
    }

    #[tokio::test]
    async fn catalog_failure_is_reported_as_text() {
        let client =
            CatalogClient::new("http://127.0.0.1:9/", Duration::from_secs(2)).expect("client");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_selection_tx, selection_rx) = watch::channel(None);
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let _guard = AbortTaskOnDrop(
            tokio::spawn(run_poller(
                client,
                Duration::from_secs(3600),
                selection_rx,
                tx,
                control_rx,
            ))
            .abort_handle(),
        );

        match next_event(&mut rx).await {
            ViewerEvent::AppsFailed(message) => assert!(message.contains("127.0.0.1:9")),
            other => panic!("unexpected event {other:?}"),
        }
        drop(control_tx);
    }
}
