// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! shardline-query: the boundary between converted datasets and the
//! serving layer that samples them.
//!
//! The storage engine itself lives elsewhere; it is reached through the
//! [`EntityStore`] port. [`SamplingClient`] guards that port: malformed
//! requests and malformed responses both collapse to an empty result, never a
//! partial one.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::missing_const_for_fn,
    clippy::module_name_repetitions
)]

mod client;
mod entity;
mod layout;

pub use client::{EntityStore, QueryError, SamplingClient, StoreError};
pub use entity::{ArrayDtype, EntityCategory, TypedArray, UnknownCategory};
pub use layout::PartitionLayout;
