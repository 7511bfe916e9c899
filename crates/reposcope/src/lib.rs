// Copyright 2025 Reposcope Project
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Reposcope indexes a configured set of remote git repositories and
//! exposes full-text code search and file reads to an MCP host.
//!
//! One process at a time (the leader, elected by a non-blocking file
//! lock) clones or fetches the repositories and rebuilds the on-disk
//! tantivy indexes; concurrent instances wait bounded by a timeout, then
//! open whatever indexes exist read-only.

pub mod filelock;
pub mod filter;
pub mod git;
pub mod indexer;
pub mod manifest;
pub mod repourl;
pub mod search;
pub mod service;
pub mod settings;
pub mod symbols;
pub mod tools;

pub use service::RepoService;
pub use settings::RepoSettings;
pub use tools::{handle_read, handle_search, ReadArgs, SearchArgs, ToolOutcome};
