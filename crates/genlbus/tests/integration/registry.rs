//! Family registry integration tests.

use std::collections::HashSet;

use genlbus::bus::{FAMILY_COUNT, FamilyRegistry, GROUPS_PER_FAMILY};
use genlbus::netlink::loopback::LoopbackBus;
use genlbus::{Error, Result};

use crate::common::{FailingRegistrar, TrackingNames};

/// Names allocated per family: the family name plus one per group.
const NAMES_PER_FAMILY: usize = 1 + GROUPS_PER_FAMILY;

#[test]
fn test_register_all_assigns_distinct_ids() -> Result<()> {
    let bus = LoopbackBus::new();
    let mut registry = FamilyRegistry::new(bus.clone());
    registry.register_all()?;

    let view = registry.view();
    let family_ids: HashSet<u16> = view.families().iter().map(|f| f.id).collect();
    let group_ids: HashSet<u32> = view
        .families()
        .iter()
        .flat_map(|f| f.group_ids.iter().copied())
        .collect();

    assert_eq!(family_ids.len(), FAMILY_COUNT);
    assert_eq!(group_ids.len(), FAMILY_COUNT * GROUPS_PER_FAMILY);
    Ok(())
}

#[test]
fn test_group_allocation_failure_rolls_back() {
    // Fail half way through the groups of family 2
    let names = TrackingNames::failing_on(2 * NAMES_PER_FAMILY + 1 + 50);
    let bus = LoopbackBus::new();
    let mut registry = FamilyRegistry::with_allocator(bus.clone(), names.clone());

    let err = registry.register_all().unwrap_err();
    match err {
        Error::Startup {
            family,
            rolled_back,
            source,
        } => {
            assert_eq!(family, "genl_test2");
            assert_eq!(rolled_back, 2);
            assert!(matches!(*source, Error::ResourceExhausted(_)));
        }
        other => panic!("unexpected error: {other}"),
    }

    assert!(bus.families().is_empty());
    assert!(registry.families().is_empty());
    assert_eq!(names.live(), 0);
}

#[test]
fn test_family_name_failure_rolls_back() {
    let names = TrackingNames::failing_on(2 * NAMES_PER_FAMILY + 1);
    let bus = LoopbackBus::new();
    let mut registry = FamilyRegistry::with_allocator(bus.clone(), names.clone());

    assert!(registry.register_all().is_err());
    assert!(bus.families().is_empty());
    assert_eq!(names.live(), 0);
}

#[test]
fn test_teardown_twice() -> Result<()> {
    let names = TrackingNames::default();
    let bus = LoopbackBus::new();
    let mut registry = FamilyRegistry::with_allocator(bus.clone(), names.clone());
    registry.register_all()?;
    assert_eq!(names.live(), FAMILY_COUNT * NAMES_PER_FAMILY);

    registry.teardown_all();
    assert_eq!(names.live(), 0);
    assert!(bus.families().is_empty());

    registry.teardown_all();
    assert_eq!(names.live(), 0);
    assert_eq!(names.allocated(), FAMILY_COUNT * NAMES_PER_FAMILY);
    Ok(())
}

#[test]
fn test_transport_failure_rolls_back() {
    let bus = LoopbackBus::new();
    let registrar = FailingRegistrar::new(bus.clone(), "genl_test3");
    let names = TrackingNames::default();
    let mut registry = FamilyRegistry::with_allocator(registrar.clone(), names.clone());

    let err = registry.register_all().unwrap_err();
    match &err {
        Error::Startup {
            family,
            rolled_back,
            source,
        } => {
            assert_eq!(family, "genl_test3");
            assert_eq!(*rolled_back, 3);
            assert_eq!(source.errno(), Some(libc::EIO));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("genl_test3"));

    assert_eq!(registrar.unregistered(), 3);
    assert!(bus.families().is_empty());
    assert_eq!(names.live(), 0);

    // Dropping after a failed startup releases nothing twice
    drop(registry);
    assert_eq!(registrar.unregistered(), 3);
}

#[test]
fn test_restart_after_teardown() -> Result<()> {
    let bus = LoopbackBus::new();
    let mut registry = FamilyRegistry::new(bus.clone());
    registry.register_all()?;
    registry.teardown_all();

    registry.register_all()?;
    assert_eq!(bus.families().len(), FAMILY_COUNT);
    Ok(())
}
