//! Tracked side-effecting operations
//!
//! Each invocation runs `Idle → Pending → {Success, Error}`. Invocations may
//! overlap; only the most recent one writes the observable state.

use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::QueryMetrics;

type MutationFn<I, O, E> = Arc<dyn Fn(I) -> BoxFuture<'static, Result<O, E>> + Send + Sync>;
type SuccessHook<I, O> = Arc<dyn Fn(&O, &I) + Send + Sync>;
type ErrorHook<I, E> = Arc<dyn Fn(&E, &I) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationStatus {
    Idle,
    Pending,
    Success,
    Error,
}

#[derive(Debug, Clone)]
pub struct MutationState<O> {
    pub status: MutationStatus,
    pub data: Option<O>,
    pub error: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    /// Sequence number of the invocation this state belongs to
    pub invocation: u64,
}

impl<O> MutationState<O> {
    fn idle() -> Self {
        Self {
            status: MutationStatus::Idle,
            data: None,
            error: None,
            submitted_at: None,
            invocation: 0,
        }
    }

    fn pending(invocation: u64) -> Self {
        Self {
            status: MutationStatus::Pending,
            data: None,
            error: None,
            submitted_at: Some(Utc::now()),
            invocation,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == MutationStatus::Pending
    }
}

struct MutationInner<I, O, E> {
    name: String,
    mutation_fn: MutationFn<I, O, E>,
    on_success: Vec<SuccessHook<I, O>>,
    on_error: Vec<ErrorHook<I, E>>,
    state: watch::Sender<MutationState<O>>,
    invocations: AtomicU64,
    metrics: QueryMetrics,
}

pub struct MutationBuilder<I, O, E> {
    name: String,
    mutation_fn: MutationFn<I, O, E>,
    on_success: Vec<SuccessHook<I, O>>,
    on_error: Vec<ErrorHook<I, E>>,
}

impl<I, O, E> MutationBuilder<I, O, E> {
    /// Runs after a successful call, before the state turns `Success`
    pub fn on_success<F>(mut self, hook: F) -> Self
    where
        F: Fn(&O, &I) + Send + Sync + 'static,
    {
        self.on_success.push(Arc::new(hook));
        self
    }

    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&E, &I) + Send + Sync + 'static,
    {
        self.on_error.push(Arc::new(hook));
        self
    }

    pub fn build(self) -> Mutation<I, O, E> {
        let (state, _) = watch::channel(MutationState::idle());
        Mutation {
            inner: Arc::new(MutationInner {
                name: self.name,
                mutation_fn: self.mutation_fn,
                on_success: self.on_success,
                on_error: self.on_error,
                state,
                invocations: AtomicU64::new(0),
                metrics: QueryMetrics::new(),
            }),
        }
    }
}

/// Handle to a tracked mutation, cheap to clone
pub struct Mutation<I, O, E> {
    inner: Arc<MutationInner<I, O, E>>,
}

impl<I, O, E> Clone for Mutation<I, O, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I, O, E> Mutation<I, O, E>
where
    I: Clone + Send + 'static,
    O: Clone + Send + Sync + 'static,
    E: Display + Send + 'static,
{
    pub fn builder<F, Fut>(name: impl Into<String>, mutation_fn: F) -> MutationBuilder<I, O, E>
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, E>> + Send + 'static,
    {
        MutationBuilder {
            name: name.into(),
            mutation_fn: Arc::new(move |input| mutation_fn(input).boxed()),
            on_success: Vec::new(),
            on_error: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Run the mutation once and return its outcome.
    ///
    /// No retry: a failure is reported to the caller and recorded in the state.
    pub async fn mutate(&self, input: I) -> Result<O, E> {
        let invocation = self.begin();
        self.execute(invocation, input).await
    }

    /// Enter `Pending` now and return the call as an owned future.
    ///
    /// Lets an event loop observe the pending state before the spawned call
    /// is first polled.
    pub fn dispatch(&self, input: I) -> BoxFuture<'static, Result<O, E>> {
        let invocation = self.begin();
        let mutation = self.clone();
        async move { mutation.execute(invocation, input).await }.boxed()
    }

    fn begin(&self) -> u64 {
        let invocation = self.inner.invocations.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.state.send_replace(MutationState::pending(invocation));
        debug!(mutation = %self.inner.name, invocation, "Mutation dispatched");
        invocation
    }

    async fn execute(&self, invocation: u64, input: I) -> Result<O, E> {
        let result = (self.inner.mutation_fn)(input.clone()).await;

        match &result {
            Ok(output) => {
                for hook in &self.inner.on_success {
                    hook(output, &input);
                }
                self.inner.metrics.record_mutation(&self.inner.name, "success");
                debug!(mutation = %self.inner.name, invocation, "Mutation succeeded");

                let output = output.clone();
                self.settle(invocation, move |s| {
                    s.status = MutationStatus::Success;
                    s.data = Some(output);
                });
            }
            Err(err) => {
                for hook in &self.inner.on_error {
                    hook(err, &input);
                }
                self.inner.metrics.record_mutation(&self.inner.name, "error");
                warn!(mutation = %self.inner.name, invocation, error = %err, "Mutation failed");

                let message = err.to_string();
                self.settle(invocation, move |s| {
                    s.status = MutationStatus::Error;
                    s.error = Some(message);
                });
            }
        }

        result
    }

    fn settle<F>(&self, invocation: u64, update: F)
    where
        F: FnOnce(&mut MutationState<O>),
    {
        let mut update = Some(update);
        self.inner.state.send_if_modified(|state| {
            if state.invocation != invocation {
                return false;
            }
            if let Some(update) = update.take() {
                update(state);
            }
            true
        });
    }

    pub fn state(&self) -> MutationState<O> {
        self.inner.state.borrow().clone()
    }

    pub fn status(&self) -> MutationStatus {
        self.inner.state.borrow().status
    }

    pub fn is_pending(&self) -> bool {
        self.status() == MutationStatus::Pending
    }

    pub fn subscribe(&self) -> watch::Receiver<MutationState<O>> {
        self.inner.state.subscribe()
    }

    /// Back to `Idle`; results of invocations still in flight are ignored
    pub fn reset(&self) {
        let invocation = self.inner.invocations.fetch_add(1, Ordering::SeqCst) + 1;
        let mut idle = MutationState::idle();
        idle.invocation = invocation;
        self.inner.state.send_replace(idle);
    }
}
