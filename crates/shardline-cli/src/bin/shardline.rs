// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `shardline` entry point.

use anyhow::Result;
use shardline_cli::cli::entrypoint;

fn main() -> Result<()> {
    entrypoint()
}
