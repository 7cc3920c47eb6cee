// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Blockyard core
//!
//! Stores content-addressed code components, composes them into named
//! workflows and assembles requests from what is already stored, delegating
//! only the missing pieces to a generator.
//!
//! # Architecture
//!
//! - **domain**: aggregates, value objects, events and repository traits
//! - **application**: component store, workflow registry, coordinator, runtime
//! - **infrastructure**: event bus, in-memory and sled repositories, command generator

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use domain::*;
