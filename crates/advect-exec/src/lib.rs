//! FIFO task execution for the advect streaming core.
//!
//! A single [`TaskQueue`] type serves two roles: with one worker it is
//! the field loader's background executor (strict FIFO), and with N
//! workers it is the particle integrator's fork-join pool, joined with
//! [`TaskQueue::wait_for_all`].

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod queue;

pub use error::QueueError;
pub use queue::{QueueReport, Task, TaskQueue};
