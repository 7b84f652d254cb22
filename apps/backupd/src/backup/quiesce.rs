use std::sync::Arc;
use std::time::Duration;

use backup_rcon::{RemoteControl, RemoteError, RemoteTarget};
use tokio::time::sleep;
use tracing::{error, warn};

const FEEDBACK_OFF: &str = "gamerule sendCommandFeedback false";
const FEEDBACK_ON: &str = "gamerule sendCommandFeedback true";

/// Waits after each persistence command. A command's reply does not mean the
/// server has finished writing.
#[derive(Debug, Clone)]
pub struct QuiesceTiming {
    pub flush_settle: Duration,
    pub save_off_settle: Duration,
}

impl Default for QuiesceTiming {
    fn default() -> Self {
        Self {
            flush_settle: Duration::from_secs(10),
            save_off_settle: Duration::from_secs(5),
        }
    }
}

/// Holds an instance with automatic saving disabled.
///
/// [`Quiesce::release`] turns saving and command feedback back on. A guard
/// dropped without being released does the same from a background task.
pub struct Quiesce {
    remote: Arc<dyn RemoteControl>,
    target: RemoteTarget,
    feedback_suppressed: bool,
    persistence_disabled: bool,
    released: bool,
}

impl Quiesce {
    /// Silences feedback, announces the save, flushes, then disables saving.
    /// If flushing or disabling fails, whatever was already changed is undone
    /// before the error is returned.
    pub async fn begin(
        remote: Arc<dyn RemoteControl>,
        target: RemoteTarget,
        timing: &QuiesceTiming,
    ) -> Result<Self, RemoteError> {
        let mut guard = Self {
            remote,
            target,
            feedback_suppressed: false,
            persistence_disabled: false,
            released: false,
        };

        match guard.remote.send(&guard.target, FEEDBACK_OFF).await {
            Ok(_) => guard.feedback_suppressed = true,
            Err(err) => warn!("could not disable command feedback: {err}"),
        }
        if let Err(err) = guard.remote.say(&guard.target, "Saving world...").await {
            warn!("could not announce save: {err}");
        }

        if let Err(err) = guard.flush_and_disable(timing).await {
            guard.release_now().await;
            return Err(err);
        }
        Ok(guard)
    }

    async fn flush_and_disable(&mut self, timing: &QuiesceTiming) -> Result<(), RemoteError> {
        self.remote.send(&self.target, "save-all").await?;
        sleep(timing.flush_settle).await;

        // Set before sending: a save-off whose reply got lost may still have applied.
        self.persistence_disabled = true;
        self.remote.send(&self.target, "save-off").await?;
        sleep(timing.save_off_settle).await;
        Ok(())
    }

    pub async fn release(mut self) {
        self.release_now().await;
    }

    async fn release_now(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        restore(
            self.remote.as_ref(),
            &self.target,
            self.persistence_disabled,
            self.feedback_suppressed,
        )
        .await;
    }
}

impl Drop for Quiesce {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        error!(
            container = %self.target.container,
            "quiesce guard dropped without release, re-enabling saving in the background"
        );
        let remote = Arc::clone(&self.remote);
        let target = self.target.clone();
        let persistence = self.persistence_disabled;
        let feedback = self.feedback_suppressed;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    restore(remote.as_ref(), &target, persistence, feedback).await;
                });
            }
            Err(_) => error!(
                container = %target.container,
                "no runtime available, saving stays disabled until save-on is sent manually"
            ),
        }
    }
}

async fn restore(
    remote: &dyn RemoteControl,
    target: &RemoteTarget,
    persistence_disabled: bool,
    feedback_suppressed: bool,
) {
    if persistence_disabled {
        if let Err(err) = remote.send(target, "save-on").await {
            error!(container = %target.container, "could not re-enable saving: {err}");
        }
    }
    if feedback_suppressed {
        if let Err(err) = remote.send(target, FEEDBACK_ON).await {
            warn!(container = %target.container, "could not re-enable command feedback: {err}");
        }
    }
}
