#![forbid(unsafe_code)]

//! Core: model paths, completion handles, and the flush scheduler.
//!
//! # Role in yform
//! `yform-core` holds the pieces every other crate leans on but that know
//! nothing about rules or fields:
//!
//! - [`model`] - property paths and the externally owned data model
//! - [`completion`] - one settlement observable by callback or by `.await`
//! - [`scheduler`] - "flush pending mutations, then run queued reactions"
//! - [`error`] - path errors
//!
//! Everything here is single-threaded (`Rc`/`RefCell`). A form and all of its
//! fields live on one event loop.

pub mod completion;
pub mod error;
pub mod model;
pub mod scheduler;

pub use completion::{Completion, Resolver, completion};
pub use error::PathError;
pub use model::{JsonModel, Model, PropPath, SharedModel};
pub use scheduler::{HookId, Scheduler, WeakScheduler};
