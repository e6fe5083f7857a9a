// src/system/affinity.rs

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use thiserror::Error;
use tokio::sync::oneshot;

/// Name given to threads spawned by [`run_on_login_thread`].
pub const LOGIN_THREAD_NAME: &str = "nuops-login";

#[derive(Error, Debug)]
pub enum LoginThreadError {
    #[error("Could not start the login thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("The login thread panicked: {0}")]
    Panicked(String),
    #[error("The login thread exited without reporting a result.")]
    Disconnected,
}

/// Runs `work` to completion on a fresh, dedicated OS thread and resolves once it finishes.
///
/// The thread is never a runtime worker, so `work` may block (prompt a user, use a blocking
/// HTTP client) without starving async tasks. A panic inside `work` does not unwind into the
/// caller; it is reported as [`LoginThreadError::Panicked`].
pub async fn run_on_login_thread<F, T>(work: F) -> Result<T, LoginThreadError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = oneshot::channel();

    thread::Builder::new()
        .name(LOGIN_THREAD_NAME.to_string())
        .spawn(move || {
            log::debug!("Login thread started");
            let outcome = panic::catch_unwind(AssertUnwindSafe(work))
                .map_err(|payload| LoginThreadError::Panicked(panic_message(payload.as_ref())));
            if tx.send(outcome).is_err() {
                log::warn!("Login finished but nobody is waiting for the result");
            }
            log::debug!("Login thread finished");
        })
        .map_err(LoginThreadError::Spawn)?;

    rx.await.map_err(|_| LoginThreadError::Disconnected)?
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_runs_on_a_named_dedicated_thread() {
        let caller = thread::current().id();
        let (name, id) = run_on_login_thread(|| {
            let current = thread::current();
            (current.name().map(str::to_string), current.id())
        })
        .await
        .unwrap();

        assert_eq!(name.as_deref(), Some(LOGIN_THREAD_NAME));
        assert_ne!(id, caller);
    }

    #[tokio::test]
    async fn test_blocking_work_is_allowed() {
        let value = run_on_login_thread(|| {
            thread::sleep(std::time::Duration::from_millis(20));
            42
        })
        .await
        .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_panic_is_resignalled_to_the_caller() {
        let result: Result<(), _> = run_on_login_thread(|| panic!("user closed the window")).await;
        match result {
            Err(LoginThreadError::Panicked(msg)) => assert!(msg.contains("user closed the window")),
            other => panic!("expected Panicked, got {:?}", other),
        }
    }
}
