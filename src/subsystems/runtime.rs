//! Generic subsystem runtime — spawns channels as concurrent tasks.
//!
//! A [`Component`] is any independently-runnable unit (the console, the
//! Telegram channel…). It captures its shared state at construction and is
//! handed to [`spawn_components`], which returns a [`SubsystemHandle`] the
//! caller can `.await`. Any component error cancels the shared
//! [`CancellationToken`] so siblings stop cooperatively.

use std::future::Future;
use std::pin::Pin;

use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::AppError;

// ── Component ─────────────────────────────────────────────────────────────────

/// A boxed, owned future returned by [`Component::run`].
pub type ComponentFuture = Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'static>>;

/// A self-contained, concurrently-runnable unit owned by a subsystem.
pub trait Component: Send + 'static {
    /// Stable identifier used in log messages.
    fn id(&self) -> &str;

    /// Consume the component and return its run-loop. The future should
    /// finish once `shutdown` is cancelled or its own work is done.
    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture;
}

// ── SubsystemHandle ───────────────────────────────────────────────────────────

/// Resolves when every spawned component has exited.
pub struct SubsystemHandle {
    inner: JoinHandle<Result<(), AppError>>,
}

impl SubsystemHandle {
    /// Await all components and return the first error, if any.
    pub async fn join(self) -> Result<(), AppError> {
        match self.inner.await {
            Ok(r) => r,
            Err(e) => Err(AppError::Comms(format!("subsystem task panicked: {e}"))),
        }
    }
}

// ── spawn_components ──────────────────────────────────────────────────────────

/// Spawn each [`Component`] on its own Tokio task.
///
/// - If any component returns `Err` or panics, `shutdown` is cancelled.
/// - The handle resolves once all components are done, carrying the first
///   error seen.
pub fn spawn_components(
    components: Vec<Box<dyn Component>>,
    shutdown: CancellationToken,
) -> SubsystemHandle {
    let handle = tokio::spawn(async move {
        let mut set: JoinSet<Result<(), AppError>> = JoinSet::new();

        for component in components {
            debug!(component = %component.id(), "spawning component");
            set.spawn(component.run(shutdown.clone()));
        }

        let mut first_err: Option<AppError> = None;

        while let Some(res) = set.join_next().await {
            match res {
                Err(e) => {
                    error!("component panicked: {e}");
                    shutdown.cancel();
                    first_err.get_or_insert_with(|| AppError::Comms(format!("component panicked: {e}")));
                }
                Ok(Err(e)) => {
                    error!("component error: {e}");
                    shutdown.cancel();
                    first_err.get_or_insert(e);
                }
                Ok(Ok(())) => {}
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    });

    SubsystemHandle { inner: handle }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Waits for shutdown, then exits cleanly.
    struct Idle;

    impl Component for Idle {
        fn id(&self) -> &str {
            "idle"
        }

        fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
            Box::pin(async move {
                shutdown.cancelled().await;
                Ok(())
            })
        }
    }

    /// Fails immediately.
    struct Broken;

    impl Component for Broken {
        fn id(&self) -> &str {
            "broken"
        }

        fn run(self: Box<Self>, _shutdown: CancellationToken) -> ComponentFuture {
            Box::pin(async { Err(AppError::Comms("boom".into())) })
        }
    }

    #[tokio::test]
    async fn empty_set_resolves_ok() {
        let handle = spawn_components(Vec::new(), CancellationToken::new());
        assert!(handle.join().await.is_ok());
    }

    #[tokio::test]
    async fn cancellation_stops_idle_components() {
        let token = CancellationToken::new();
        let handle = spawn_components(vec![Box::new(Idle), Box::new(Idle)], token.clone());
        token.cancel();
        assert!(handle.join().await.is_ok());
    }

    #[tokio::test]
    async fn failure_cancels_siblings_and_surfaces_error() {
        let token = CancellationToken::new();
        let handle = spawn_components(vec![Box::new(Idle), Box::new(Broken)], token.clone());
        let err = handle.join().await.unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert!(token.is_cancelled());
    }
}
