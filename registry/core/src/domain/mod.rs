// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain layer: components, workflows, assemblies and the repository
//! contracts that persist them.

pub mod assembly;
pub mod capability;
pub mod component;
pub mod events;
pub mod registry_config;
pub mod repository;
pub mod stats;
pub mod workflow;

pub use assembly::*;
pub use capability::*;
pub use component::*;
pub use events::*;
pub use stats::*;
pub use workflow::*;
