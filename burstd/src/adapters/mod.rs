// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

pub mod cli;
pub mod condor;
pub mod db;
pub mod deployment;
pub mod fs;
pub mod hook;
pub mod sinks;
pub mod storage;
pub mod time;
