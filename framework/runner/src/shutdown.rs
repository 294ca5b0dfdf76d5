use drill_core::prelude::ShutdownHandle;
use tokio::signal;

/// Trigger `handle` on Ctrl-C. Scenarios observe the signal at their next step boundary and the
/// step in flight is abandoned at its next suspension point.
pub(crate) fn start_shutdown_listener(runtime: &tokio::runtime::Runtime, handle: ShutdownHandle) {
    runtime.spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                println!("Received shutdown signal, cancelling the drill...");
                handle.shutdown();
            }
            Err(e) => {
                log::error!("Failed to listen for Ctrl-C, the drill cannot be cancelled: {e:?}");
            }
        }
    });
}
