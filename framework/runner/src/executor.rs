use std::future::Future;
use std::time::Instant;

use drill_core::prelude::{ShutdownHandle, ShutdownSignalError, TimeoutError};

#[derive(Debug)]
pub struct Executor {
    runtime: tokio::runtime::Runtime,
    shutdown_handle: ShutdownHandle,
}

impl Executor {
    pub(crate) fn new(runtime: tokio::runtime::Runtime, shutdown_handle: ShutdownHandle) -> Self {
        Self {
            runtime,
            shutdown_handle,
        }
    }

    pub fn shutdown_handle(&self) -> &ShutdownHandle {
        &self.shutdown_handle
    }

    /// Run async code in place, blocking until it completes.
    ///
    /// Note that the future will be cancelled if the drill is shut down, in which case the error
    /// is a [ShutdownSignalError].
    pub fn execute_in_place<T>(
        &self,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> anyhow::Result<T> {
        let mut shutdown_listener = self.shutdown_handle.new_listener();
        self.runtime.block_on(async move {
            tokio::select! {
                biased;
                _ = shutdown_listener.wait_for_shutdown() => {
                    Err(anyhow::anyhow!(ShutdownSignalError::default()))
                },
                result = fut => result,
            }
        })
    }

    /// Run async code in place, blocking until it completes or `deadline` passes.
    ///
    /// Hitting the deadline gives a [TimeoutError]. When `cancellable` is false the shutdown signal
    /// is ignored, which is what cleanup needs so that it can finish after a cancellation.
    pub fn execute_bounded<T>(
        &self,
        fut: impl Future<Output = anyhow::Result<T>>,
        deadline: Instant,
        cancellable: bool,
    ) -> anyhow::Result<T> {
        let deadline = tokio::time::Instant::from_std(deadline);
        let bounded = async move {
            match tokio::time::timeout_at(deadline, fut).await {
                Ok(result) => result,
                Err(_) => Err(anyhow::anyhow!(TimeoutError::default())),
            }
        };

        if cancellable {
            self.execute_in_place(bounded)
        } else {
            self.runtime.block_on(bounded)
        }
    }
}
