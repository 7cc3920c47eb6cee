// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! The shipped configuration templates must parse and validate.

use blockyard_cli::commands::config::{EXAMPLES_TEMPLATE, MINIMAL_TEMPLATE};
use blockyard_core::domain::registry_config::{RegistryConfigManifest, StorageBackendKind};
use std::time::Duration;

#[test]
fn test_minimal_template_is_valid() {
    let config = RegistryConfigManifest::from_yaml_str(MINIMAL_TEMPLATE).unwrap();
    config.validate().unwrap();
    assert_eq!(config.spec.storage.backend, StorageBackendKind::Sled);
}

#[test]
fn test_examples_template_is_valid() {
    let config = RegistryConfigManifest::from_yaml_str(EXAMPLES_TEMPLATE).unwrap();
    config.validate().unwrap();
    assert!(config.spec.coordinator.generation_timeout > Duration::ZERO);
    assert!(config.spec.coordinator.promote_after_successes >= 1);
}
