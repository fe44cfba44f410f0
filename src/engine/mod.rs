//! Background loops.
//!
//! - `poller` — notification fetch → classify → filter → render → deliver
//! - `bumper` — recurring thread bumps with backoff and jitter
//!
//! Both loops observe a shared `CancellationToken` between ticks; a tick in
//! progress always runs to completion.

pub mod bumper;
pub mod poller;

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Sleep for `duration` unless cancelled first. Returns `false` when the
/// token fired.
pub async fn sleep_or_cancel(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
