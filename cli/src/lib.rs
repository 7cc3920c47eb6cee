// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Blockyard CLI library - exposes the command implementations for testing
//!
//! # Architecture
//!
//! - **Layer:** Interface / Presentation Layer
//! - **Purpose:** Maps command-line arguments onto the registry runtime

pub mod commands;
