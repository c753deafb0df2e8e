use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::error;

use super::Node;
use super::supervisor::panic_message;

impl Node {
    /// Calls every runner's `tick` concurrently, then sleeps one tick interval.
    /// A panicking tick is logged and does not stop the loop.
    pub(super) async fn tick_loop(self, token: CancellationToken) {
        loop {
            let registrations = self.registrations().await;
            let ticks = registrations.iter().map(|reg| async move {
                let tick = AssertUnwindSafe(reg.runner.tick()).catch_unwind();
                if let Err(panic) = tick.await {
                    error!(runner = reg.name(), "tick panicked: {}", panic_message(&*panic));
                }
            });
            tokio::select! {
                _ = token.cancelled() => break,
                _ = join_all(ticks) => {}
            }
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.cfg.tick_interval) => {}
            }
        }
    }
}
