use crate::models::error::StreamError;
use crate::models::params::StreamParameters;
use crate::models::state::StreamState;

/// Observer for stream lifecycle events.
///
/// Methods are called from whichever thread drives the lifecycle (the
/// constructor, `reconfigure`, or drop), never from the real-time thread.
/// Implementations should return quickly.
pub trait StreamDelegate: Send + Sync {
    /// Called when the native stream state changes.
    fn on_state_changed(&self, state: StreamState);

    /// Called for errors that are logged but not returned, such as a
    /// failed stop or close during teardown.
    fn on_error(&self, error: &StreamError);

    /// Called after a reconfigure swapped in new stream parameters.
    fn on_reconfigured(&self, params: &StreamParameters);
}
