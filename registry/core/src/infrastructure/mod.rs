// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod command_generator;
pub mod event_bus;
pub mod repositories;
