//! Scoped ownership of a provisioned test target
//!
//! A [`ContainerLease`] is created as soon as `provision_target` returns and
//! must be released on every exit path of the validation pass. The engine
//! releases explicitly so it can record failures as warnings; `Drop` only
//! covers paths where the lease was abandoned (panics, dropped futures).

use crate::error::{TimedOut, ToolError};
use crate::tools::TargetProvisioner;
use std::sync::Arc;
use std::time::Duration;
use stigsmith_artifact::ContainerHandle;

pub struct ContainerLease {
    container: ContainerHandle,
    provisioner: Arc<dyn TargetProvisioner>,
    released: bool,
}

impl ContainerLease {
    #[must_use]
    pub fn new(container: ContainerHandle, provisioner: Arc<dyn TargetProvisioner>) -> Self {
        Self {
            container,
            provisioner,
            released: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn container(&self) -> &ContainerHandle {
        &self.container
    }

    /// Release the target, bounded by `timeout`
    ///
    /// Not cancellable: a withdrawn task still tears its target down. The
    /// lease only counts as released once the provisioner has answered, so
    /// an overrun call, or this future being dropped mid-call, leaves the
    /// background release in `Drop` to finish the job.
    ///
    /// # Errors
    /// The provisioner's error, or a transport error if the call overran.
    pub async fn release(mut self, timeout: Duration) -> Result<(), ToolError> {
        tracing::debug!(container = %self.container.id, "releasing target");
        match tokio::time::timeout(timeout, self.provisioner.release_target(&self.container)).await
        {
            Ok(result) => {
                self.released = true;
                result
            }
            Err(_) => Err(ToolError::transport(TimedOut { after: timeout }.to_string())),
        }
    }
}

impl std::fmt::Debug for ContainerLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerLease")
            .field("container", &self.container)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl Drop for ContainerLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let container = self.container.clone();
        let provisioner = Arc::clone(&self.provisioner);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                tracing::warn!(container = %container.id, "lease dropped unreleased, releasing in background");
                runtime.spawn(async move {
                    if let Err(error) = provisioner.release_target(&container).await {
                        tracing::warn!(container = %container.id, %error, "background release failed");
                    }
                });
            }
            Err(_) => {
                tracing::error!(container = %container.id, "lease dropped outside a runtime, target leaked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        released: Mutex<Vec<String>>,
        fail: bool,
        /// First release call never answers
        stall_first: bool,
    }

    #[async_trait]
    impl TargetProvisioner for Recorder {
        async fn provision_target(
            &self,
            _product: &str,
            _version: &str,
        ) -> Result<ContainerHandle, ToolError> {
            Ok(ContainerHandle::new("c-1", "rhel9"))
        }

        async fn release_target(&self, container: &ContainerHandle) -> Result<(), ToolError> {
            let first = {
                let mut released = self.released.lock();
                released.push(container.id.clone());
                released.len() == 1
            };
            if self.stall_first && first {
                std::future::pending::<()>().await;
            }
            if self.fail {
                Err(ToolError::transport("docker daemon gone"))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn explicit_release_calls_provisioner_once() {
        let recorder = Arc::new(Recorder::default());
        let lease = ContainerLease::new(ContainerHandle::new("c-1", "rhel9"), recorder.clone());
        lease.release(Duration::from_secs(1)).await.unwrap();
        tokio::task::yield_now().await;
        assert_eq!(*recorder.released.lock(), vec!["c-1".to_string()]);
    }

    #[tokio::test]
    async fn release_failure_is_reported() {
        let recorder = Arc::new(Recorder {
            fail: true,
            ..Recorder::default()
        });
        let lease = ContainerLease::new(ContainerHandle::new("c-2", "rhel9"), recorder);
        let err = lease.release(Duration::from_secs(1)).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn dropped_lease_releases_in_background() {
        let recorder = Arc::new(Recorder::default());
        {
            let _lease = ContainerLease::new(ContainerHandle::new("c-3", "rhel9"), recorder.clone());
        }
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(*recorder.released.lock(), vec!["c-3".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn release_abandoned_midway_falls_back_to_background() {
        let recorder = Arc::new(Recorder {
            stall_first: true,
            ..Recorder::default()
        });
        let lease = ContainerLease::new(ContainerHandle::new("c-4", "rhel9"), recorder.clone());

        let abandoned =
            tokio::time::timeout(Duration::from_secs(1), lease.release(Duration::from_secs(60))).await;
        assert!(abandoned.is_err());

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(
            *recorder.released.lock(),
            vec!["c-4".to_string(), "c-4".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn overrun_release_is_retried_in_background() {
        let recorder = Arc::new(Recorder {
            stall_first: true,
            ..Recorder::default()
        });
        let lease = ContainerLease::new(ContainerHandle::new("c-5", "rhel9"), recorder.clone());

        let err = lease.release(Duration::from_secs(5)).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("timed out"));

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(recorder.released.lock().len(), 2);
    }
}
