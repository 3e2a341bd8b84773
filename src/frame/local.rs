//! In-process frame host: the wallet core runs on a tokio task instead of
//! in a browser iframe. Used by the CLI demo and the integration tests.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

use super::{channel, FrameHost, FramePort, FrameSpec};
use crate::wallet::WalletCore;

pub struct LocalFrameHost {
    host_origin: String,
    core: Arc<WalletCore>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LocalFrameHost {
    pub fn new(host_origin: impl Into<String>, core: Arc<WalletCore>) -> Self {
        Self { host_origin: host_origin.into(), core, task: Mutex::new(None) }
    }

    pub fn core(&self) -> &Arc<WalletCore> {
        &self.core
    }

    pub fn is_attached(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }
}

#[async_trait]
impl FrameHost for LocalFrameHost {
    async fn attach(&self, spec: &FrameSpec) -> anyhow::Result<FramePort> {
        let mut task = self.task.lock().unwrap_or_else(|p| p.into_inner());
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            anyhow::bail!("a wallet frame is already attached");
        }
        let (host, frame) = channel(&self.host_origin, &spec.origin);
        tracing::debug!(url = %spec.url, hidden = spec.hidden, "attaching local wallet frame");
        *task = Some(tokio::spawn(self.core.clone().run(frame)));
        Ok(host)
    }

    fn detach(&self) {
        let task = self.task.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(task) = task {
            // Aborting the serve loop drops its handler set, which aborts
            // every in-flight request with it.
            task.abort();
            self.core.frame_detached();
            tracing::debug!("local wallet frame detached");
        }
    }
}

impl Drop for LocalFrameHost {
    fn drop(&mut self) {
        self.detach();
    }
}
