// Application state for HTTP handlers
use crate::application::events::ChartEvent;
use crate::application::runtime::ControllerHandle;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct AppState {
    pub controller: ControllerHandle,
    /// Render events; each `/events` client subscribes its own receiver.
    pub events: broadcast::Sender<ChartEvent>,
    pub default_buffer_size: usize,
}
