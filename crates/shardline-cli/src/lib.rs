// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! shardline command line.
//!
//! Subcommands write their reports to a caller-supplied writer so they can
//! be driven from tests; the binary passes a locked stdout.

pub mod cli;
