//! # Controller
//!
//! Core modules of the initializer.
//!
//! - `backoff`: fixed-interval retry policy with cancellable waits
//! - `connector`: retrying construction of an authenticated store client
//! - `reconciler`: the Checking → Creating → Done state machine
//! - `invocation`: one triggered run (connect, then reconcile)

pub mod backoff;
pub mod connector;
pub mod invocation;
pub mod reconciler;
