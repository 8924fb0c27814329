use super::traits::{PortForwardSpec, ResourceClient};
use crate::error::ResourceError;
use std::future::Future;

/// A live port-forward. The forwarding process is killed on `close()` and,
/// failing that, when the session is dropped.
pub struct PortForwardSession {
    service: String,
    local_port: u16,
    child: Option<tokio::process::Child>,
}

impl PortForwardSession {
    pub(crate) fn spawned(service: String, local_port: u16, child: tokio::process::Child) -> Self {
        Self {
            service,
            local_port,
            child: Some(child),
        }
    }

    /// Session without a backing process, for clients that reach services directly.
    pub fn detached(service: impl Into<String>, local_port: u16) -> Self {
        Self {
            service: service.into(),
            local_port,
            child: None,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub fn local_url(&self, path: &str) -> String {
        local_url(self.local_port, path)
    }

    pub fn is_process_backed(&self) -> bool {
        self.child.is_some()
    }

    /// Kill and reap the forwarding process.
    pub async fn close(mut self) {
        if let Some(mut child) = self.child.take() {
            child.kill().await.ok();
            child.wait().await.ok();
            tracing::debug!(service = %self.service, port = self.local_port, "port-forward closed");
        }
    }
}

impl Drop for PortForwardSession {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.start_kill();
        }
    }
}

pub fn local_url(port: u16, path: &str) -> String {
    if path.starts_with('/') {
        format!("http://127.0.0.1:{port}{path}")
    } else {
        format!("http://127.0.0.1:{port}/{path}")
    }
}

/// Run `f` with a forwarded local port, tearing the session down afterwards
/// whether `f` succeeded or not.
pub async fn with_port_forward<T, F, Fut>(
    client: &dyn ResourceClient,
    spec: &PortForwardSpec,
    f: F,
) -> Result<T, ResourceError>
where
    F: FnOnce(u16) -> Fut,
    Fut: Future<Output = Result<T, ResourceError>>,
{
    let session = client.port_forward(spec).await?;
    let result = f(session.local_port()).await;
    session.close().await;
    result
}
