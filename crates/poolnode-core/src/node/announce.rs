use std::sync::atomic::Ordering;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use poolnode_rpc::TemplateAnnouncement;

use super::{Node, Registration};
use crate::{CoreError, now_ms};

impl Node {
    pub(super) async fn announce_loop(self, token: CancellationToken) {
        loop {
            self.announce_once().await;
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.cfg.announce_interval) => {}
            }
        }
    }

    /// Announces the node and every runner whose refresh time has come.
    ///
    /// Each announcement is rescheduled after the refresh interval returned by the
    /// coordinator, or after the announce interval when it failed.
    pub async fn announce_once(&self) {
        let retry_ms = self.cfg.announce_interval.as_millis() as u64;

        {
            let mut next = self.next_node_announce.lock().await;
            if now_ms() >= *next {
                *next = match self.pool.announce_node(&self.cfg.meta).await {
                    Ok(refresh_ms) => {
                        debug!(refresh_ms, "node announced");
                        now_ms() + refresh_ms
                    }
                    Err(e) => {
                        warn!(error = %e, "node announcement failed");
                        now_ms() + retry_ms
                    }
                };
            }
        }

        for reg in self.registrations().await {
            if now_ms() < reg.next_announce.load(Ordering::Acquire) {
                continue;
            }
            let next = match self.announce_template(&reg).await {
                Ok(refresh_ms) => {
                    debug!(runner = reg.name(), refresh_ms, "template announced");
                    now_ms() + refresh_ms
                }
                Err(e) => {
                    warn!(runner = reg.name(), error = %e, "template announcement failed");
                    now_ms() + retry_ms
                }
            };
            reg.next_announce.store(next, Ordering::Release);
        }
    }

    async fn announce_template(&self, reg: &Registration) -> Result<u64, CoreError> {
        let cfg = reg.runner.config();
        let announcement = TemplateAnnouncement {
            meta: cfg.meta_json()?,
            template: cfg.template.clone(),
            sockets: cfg.sockets_json()?,
        };
        Ok(self.pool.announce_template(&announcement).await?)
    }
}
