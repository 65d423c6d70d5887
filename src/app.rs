use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tracing::info;

use crate::client::{CaptionClient, CaptionJob, HealthStatus};
use crate::controller::{Controller, Effect, Event, View};
use crate::history::CaptionRecord;

/// The single owned application state, shared by every request handler.
///
/// The controller lock is never held across an await: a caption request is
/// dispatched, the lock released, and the response fed back as a new event.
pub struct App {
    controller: Mutex<Controller>,
    client: CaptionClient,
}

impl App {
    pub fn new(controller: Controller, client: CaptionClient) -> Arc<Self> {
        Arc::new(Self {
            controller: Mutex::new(controller),
            client,
        })
    }

    pub fn client(&self) -> &CaptionClient {
        &self.client
    }

    fn controller(&self) -> MutexGuard<'_, Controller> {
        self.controller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies one event without performing any resulting effect.
    pub fn dispatch(&self, event: Event) -> Option<Effect> {
        self.controller().handle(event, Instant::now())
    }

    /// Applies one event and runs a caption request if it asks for one.
    /// Other effects are handed back to the caller.
    pub async fn submit(self: &Arc<Self>, event: Event) -> Option<Effect> {
        match self.dispatch(event)? {
            Effect::Dispatch(job) => {
                self.run_caption(job).await;
                None
            }
            other => Some(other),
        }
    }

    async fn run_caption(self: &Arc<Self>, job: CaptionJob) {
        let _guard = InFlight::new(Arc::clone(self));
        let result = self.client.request_caption(&job).await;
        self.dispatch(Event::CaptionReceived(result));
    }

    /// Queries the backend health endpoint and updates the status indicator.
    pub async fn refresh_status(&self) -> HealthStatus {
        let health = self.client.health().await;
        info!("backend device: {}", health.device_label());
        self.dispatch(Event::StatusReported(health.clone()));
        health
    }

    pub fn view(&self) -> View {
        self.controller().view(Instant::now())
    }

    pub fn history(&self) -> Vec<CaptionRecord> {
        self.controller().history().to_vec()
    }

    /// Content type and bytes of the image stored with history entry `index`.
    pub fn history_image(&self, index: usize) -> Option<(String, Vec<u8>)> {
        self.controller().history().get(index)?.decode_image()
    }
}

/// Held for the lifetime of a caption request. Dropping it re-enables the
/// trigger, including when the request future is cancelled mid-flight.
struct InFlight {
    app: Arc<App>,
}

impl InFlight {
    fn new(app: Arc<App>) -> Self {
        Self { app }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.app.dispatch(Event::InFlightReleased);
    }
}
