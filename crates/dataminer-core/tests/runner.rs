//! Tests for the end-to-end runner

mod common;

use std::cell::Cell;

use common::{Call, FakeControl, FakeFactory, ScriptedDiscovery, CONFIG_124, LOAD_BASE};
use dataminer_core::dataminer::{Dataminer, RunOutcome, DEFAULT_PROCESS_NAME};
use dataminer_core::error::DataminerError;
use dataminer_core::registry::MemoryRegistry;
use dataminer_core::types::{Address, ProcessId};

#[test]
fn test_no_running_instance_is_not_an_error()
{
    let dataminer = Dataminer::new(ScriptedDiscovery::new(), MemoryRegistry::new().with("124", CONFIG_124));
    let mut control = FakeControl::with_threads(2);
    let invoked = Cell::new(false);

    let outcome = dataminer
        .run(&mut control, &FakeFactory::default(), |_engine| {
            invoked.set(true);
            Ok(())
        })
        .unwrap();

    assert_eq!(outcome, RunOutcome::NoSuitableProcess);
    assert!(!invoked.get());
    assert!(control.calls.is_empty());
}

#[test]
fn test_unconfigured_build_is_not_attached()
{
    let discovery = ScriptedDiscovery::new().with(6001, "1.0.0.118");
    let dataminer = Dataminer::new(discovery, MemoryRegistry::new().with("124", CONFIG_124));
    let mut control = FakeControl::with_threads(2);

    let outcome = dataminer.run(&mut control, &FakeFactory::default(), |_engine| Ok(())).unwrap();

    assert_eq!(outcome, RunOutcome::NoSuitableProcess);
    assert!(control.calls.is_empty());
}

#[test]
fn test_build_124_is_resolved_rebased_and_run_once()
{
    let discovery = ScriptedDiscovery::new().with(6002, "1.0.0.124");
    let dataminer = Dataminer::new(discovery, MemoryRegistry::new().with("124", CONFIG_124));
    let mut control = FakeControl::with_threads(3);
    let factory = FakeFactory::default();
    let invocations = Cell::new(0);

    let outcome = dataminer
        .run(&mut control, &factory, |engine| {
            invocations.set(invocations.get() + 1);
            Ok((engine.config.load_base(), engine.config.address("GlobalObjects")))
        })
        .unwrap();

    let (load_base, global_objects) = outcome.completed().unwrap();
    assert_eq!(load_base, Address::new(LOAD_BASE));
    // 0x1fe0a10 - 0x400000 + 0x7ff6_0000_0000, relocated exactly once
    assert_eq!(global_objects, Some(Address::new(0x7ff6_01be_0a10)));
    assert_eq!(invocations.get(), 1);
    assert_eq!(factory.created.get(), 1);
    assert_eq!(control.attaches(), 1);
    assert_eq!(control.calls.first(), Some(&Call::Attach(ProcessId(6002))));
    assert_eq!(control.calls.last(), Some(&Call::Detach));
}

#[test]
fn test_first_configured_instance_wins()
{
    let discovery = ScriptedDiscovery::new()
        .with(6003, "1.0.0.118")
        .with(6004, "1.0.0.124")
        .with(6005, "1.0.0.124");
    let dataminer = Dataminer::new(discovery, MemoryRegistry::new().with("124", CONFIG_124));
    let mut control = FakeControl::with_threads(1);

    dataminer.run(&mut control, &FakeFactory::default(), |_engine| Ok(())).unwrap();

    assert_eq!(control.calls.first(), Some(&Call::Attach(ProcessId(6004))));
}

#[test]
fn test_invalid_blob_fails_before_attach()
{
    let discovery = ScriptedDiscovery::new().with(6006, "1.0.0.124").with(6007, "1.0.0.125");
    let registry = MemoryRegistry::new()
        .with("124", "{ not json")
        .with("125", CONFIG_124);
    let dataminer = Dataminer::new(discovery, registry);
    let mut control = FakeControl::with_threads(1);

    let result = dataminer.run(&mut control, &FakeFactory::default(), |_engine| Ok(()));

    assert!(matches!(result, Err(DataminerError::InvalidConfiguration { ref build, .. }) if build == "124"));
    assert!(control.calls.is_empty());
}

#[test]
fn test_missing_reference_base_fails_before_attach()
{
    let discovery = ScriptedDiscovery::new().with(6008, "1.0.0.124");
    let registry = MemoryRegistry::new().with("124", r#"{ "addresses": { "GlobalObjects": "0x1fe0a10" } }"#);
    let dataminer = Dataminer::new(discovery, registry);
    let mut control = FakeControl::with_threads(1);

    let result = dataminer.run(&mut control, &FakeFactory::default(), |_engine| Ok(()));

    assert!(matches!(result, Err(DataminerError::Rebase(_))));
    assert!(control.calls.is_empty());
}

#[test]
fn test_candidates_reports_configuration_without_attaching()
{
    let discovery = ScriptedDiscovery::new()
        .with(6009, "1.0.0.118")
        .with(6010, "1.0.0.124")
        .with_uninspectable(6011);
    let dataminer = Dataminer::new(discovery, MemoryRegistry::new().with("124", CONFIG_124));

    let reports = dataminer.candidates().unwrap();

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].instance.build, "118");
    assert!(!reports[0].configured);
    assert_eq!(reports[1].instance.pid, ProcessId(6010));
    assert!(reports[1].configured);
}

#[test]
fn test_default_process_name()
{
    let dataminer = Dataminer::new(ScriptedDiscovery::new(), MemoryRegistry::new());
    assert_eq!(dataminer.process_name(), DEFAULT_PROCESS_NAME);

    let dataminer = dataminer.with_process_name("borderlands2");
    assert_eq!(dataminer.process_name(), "borderlands2");
}
