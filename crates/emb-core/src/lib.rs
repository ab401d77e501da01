//! Serialized dispatch core: one worker, many waiting producers.
//!
//! Producers go through [`Dispatcher`], which enqueues a [`emb_model::Task`] on the
//! [`TaskQueue`] and blocks on the [`CompletionRegistry`] until the single
//! [`WorkerLoop`] publishes the matching outcome. [`Supervisor`] restarts the worker
//! (or any other [`Supervised`] target) within a bounded budget.
mod error;
pub use error::CoreError;

mod compute;
pub use compute::{Compute, ComputeError, ComputeFactory};

mod metrics;
pub use metrics::{MetricsBackend, MetricsHandle, NoOpMetrics, noop_metrics};

mod context;
pub use context::DispatchContext;

mod queue;
pub use queue::TaskQueue;

mod registry;
pub use registry::{Claim, CompletionRegistry, Pending};

mod worker;
pub use worker::WorkerLoop;

mod supervisor;
pub use supervisor::{RestartBudget, Supervised, Supervisor, SupervisorState, Transition};

mod dispatch;
pub use dispatch::{DispatchConfig, DispatchError, Dispatcher};
