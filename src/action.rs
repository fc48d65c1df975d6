//! Tracks loading, error and result of one asynchronous operation.
//!
//! Every [`Action::trigger`] starts a new generation. When an older call settles after
//! a newer one started, its outcome is still returned to its own caller but never
//! written to the observable state. The underlying work is not cancelled.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::watch;

type Handler<D, R, E> = Arc<dyn Fn(D) -> BoxFuture<'static, Result<R, E>> + Send + Sync>;

#[derive(Debug)]
pub struct ActionState<R, E> {
    pub result: Option<R>,
    pub error: Option<Arc<E>>,
    pub loading: bool,
}

impl<R, E> Default for ActionState<R, E> {
    fn default() -> Self {
        Self {
            result: None,
            error: None,
            loading: false,
        }
    }
}

impl<R: Clone, E> Clone for ActionState<R, E> {
    fn clone(&self) -> Self {
        Self {
            result: self.result.clone(),
            error: self.error.clone(),
            loading: self.loading,
        }
    }
}

pub struct Action<D, R, E> {
    handler: Handler<D, R, E>,
    state: watch::Sender<ActionState<R, E>>,
    generation: AtomicU64,
}

impl<D, R, E> Action<D, R, E>
where
    D: Send + 'static,
    R: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(D) -> BoxFuture<'static, Result<R, E>> + Send + Sync + 'static,
    {
        let (state, _) = watch::channel(ActionState::default());
        Self {
            handler: Arc::new(handler),
            state,
            generation: AtomicU64::new(0),
        }
    }

    /// Runs the handler. The outcome is returned whether or not it was superseded.
    pub async fn trigger(&self, data: D) -> Result<R, Arc<E>> {
        let mut generation = 0;
        self.state.send_modify(|state| {
            generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *state = ActionState {
                result: None,
                error: None,
                loading: true,
            };
        });

        match (self.handler)(data).await {
            Ok(result) => {
                let stored = result.clone();
                self.settle(generation, move |state| state.result = Some(stored));
                Ok(result)
            }
            Err(e) => {
                let e = Arc::new(e);
                let stored = e.clone();
                self.settle(generation, move |state| state.error = Some(stored));
                Err(e)
            }
        }
    }

    fn settle(&self, generation: u64, apply: impl FnOnce(&mut ActionState<R, E>)) {
        let applied = self.state.send_if_modified(|state| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            apply(state);
            state.loading = false;
            true
        });
        if !applied {
            tracing::debug!("discarding outcome of superseded action, generation={}", generation);
        }
    }

    pub fn state(&self) -> ActionState<R, E> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ActionState<R, E>> {
        self.state.subscribe()
    }

    pub fn loading(&self) -> bool {
        self.state.borrow().loading
    }

    pub fn clear_result(&self) {
        self.state.send_modify(|state| state.result = None);
    }
}
