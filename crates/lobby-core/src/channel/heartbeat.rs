//! Heartbeat: periodic PING publication while awaiting the peer

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::classify::PING;
use crate::config::HeartbeatConfig;
use crate::identity::RootIdentity;
use crate::transport::PubSub;

/// Handle to a running heartbeat task.
///
/// The first PING goes out one interval after start. The task stops when
/// cancelled, when the handle is dropped, or when the optional timeout
/// expires (after running the timeout callback).
pub struct Heartbeat {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Heartbeat {
    pub(crate) fn spawn<T, F>(
        transport: Arc<T>,
        topic: RootIdentity,
        config: HeartbeatConfig,
        on_timeout: F,
    ) -> Self
    where
        T: PubSub,
        F: FnOnce() + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let period = config.interval();
            let start = Instant::now();
            let mut ticker = interval_at(start + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let deadline = config.timeout().map(|t| start + t);
            let timeout = async move {
                match deadline {
                    Some(deadline) => sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::pin!(timeout);

            let mut beats: u64 = 0;
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        debug!(%topic, beats, "Heartbeat cancelled");
                        return;
                    }
                    _ = &mut timeout => {
                        warn!(%topic, beats, "Heartbeat timed out waiting for PONG");
                        token.cancel();
                        on_timeout();
                        return;
                    }
                    _ = ticker.tick() => {
                        beats += 1;
                        trace!(%topic, beats, "PING");
                        let ping = PING.as_bytes().to_vec();
                        if let Err(e) = transport.publish(topic.as_str(), ping).await {
                            warn!(%topic, error = %e, "Failed to publish PING");
                        }
                    }
                }
            }
        });

        Self { cancel, task }
    }

    /// Stop sending PINGs
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// True while the task is still sending PINGs
    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && !self.task.is_finished()
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for Heartbeat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heartbeat")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
