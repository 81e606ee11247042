use {
    serde::Serialize,
    std::time::Duration,
    tokio::sync::{mpsc, watch},
};

const QUEUE_CAPACITY: usize = 256;
const POST_TIMEOUT: Duration = Duration::from_secs(10);

/// One write-through event for the secondary backend.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MirrorEvent {
    OrderUpdated {
        order_id: String,
        user_id: String,
        status: String,
        credits_added: bool,
    },
    CreditChanged {
        user_id: String,
        delta: i64,
        balance_after: i64,
        reason: String,
    },
}

/// Sender half handed to the core. The mirror never gates anything: a full
/// queue or a dead task just drops the event with a warning.
#[derive(Clone)]
pub struct MirrorHandle {
    tx: Option<mpsc::Sender<MirrorEvent>>,
}

impl MirrorHandle {
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn record(&self, event: MirrorEvent) {
        let Some(tx) = &self.tx else { return };
        if let Err(e) = tx.try_send(event) {
            tracing::warn!(error = %e, "mirror queue full or closed, dropping event");
        }
    }
}

/// Start the mirror task. With no URL configured the handle is inert and no
/// task is spawned.
pub fn spawn(
    url: Option<String>,
    shutdown: watch::Receiver<bool>,
) -> (MirrorHandle, Option<tokio::task::JoinHandle<()>>) {
    let Some(url) = url else {
        tracing::info!("mirror not configured, running with authoritative store only");
        return (MirrorHandle::disabled(), None);
    };

    let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
    let handle = tokio::spawn(run_mirror(url, rx, shutdown));
    (MirrorHandle { tx: Some(tx) }, Some(handle))
}

async fn run_mirror(
    url: String,
    mut rx: mpsc::Receiver<MirrorEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(%url, "mirror task started");

    let client = match reqwest::Client::builder().timeout(POST_TIMEOUT).build() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "mirror disabled: failed to build http client");
            return;
        }
    };

    loop {
        let event = tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("mirror task shutting down");
                return;
            }
            event = rx.recv() => match event {
                Some(e) => e,
                None => return,
            },
        };

        // Failures are logged, never retried, never surfaced to the
        // request that produced the event.
        match client.post(&url).json(&event).send().await {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "mirror rejected event");
            }
            Err(e) => {
                tracing::warn!(error = %e, "mirror post failed");
            }
        }
    }
}
