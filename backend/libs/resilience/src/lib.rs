/// Bounded waits for every outbound call a service makes.
///
/// Each boundary a workflow crosses (relational store, cache, message bus,
/// cross-service façade, external reviewer) gets its own timeout so that a
/// slow dependency fails the call instead of hanging the worker that issued it.
///
/// # Example
///
/// ```rust,no_run
/// use resilience::{presets::BoundaryTimeouts, timeout::with_timeout};
///
/// #[tokio::main]
/// async fn main() {
///     let timeouts = BoundaryTimeouts::default();
///
///     let result = with_timeout(timeouts.cache, async {
///         // Your cache call here
///         42
///     })
///     .await;
/// }
/// ```

pub mod presets;
pub mod timeout;

pub use presets::BoundaryTimeouts;
pub use timeout::{with_timeout, with_timeout_result, Boundary, TimeoutError};
