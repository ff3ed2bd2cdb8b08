use std::fs;
use std::sync::Arc;
use std::time::Duration;

use shuttle_config::{CommandTemplate, RuleTable, Settings, WatchRule};
use shuttle_events::{CommandStatus, Event, EventBus};
use shuttle_fsops::{CommandOutcome, DispatchService, RelocationStrategy};
use shuttle_test_support::assert::next_matching;
use shuttle_test_support::fixtures::DropZone;

const WAIT: Duration = Duration::from_secs(5);

fn settings() -> Settings {
    Settings {
        sample_interval: Duration::from_millis(25),
        ..Settings::default()
    }
}

fn rule(zone: &DropZone, command: Option<&str>) -> WatchRule {
    WatchRule {
        source_dir: zone.inbox().to_path_buf(),
        destination_dir: zone.outbox().to_path_buf(),
        is_share: false,
        command: command.and_then(CommandTemplate::parse),
    }
}

#[tokio::test]
async fn empty_file_is_relocated_without_command() -> anyhow::Result<()> {
    let zone = DropZone::new()?;
    let bus = EventBus::with_capacity(64);
    let service = DispatchService::from_settings(&settings(), bus.clone());
    let rules = RuleTable::from_rules([rule(&zone, None)]);
    let file = zone.drop_file("x.txt", b"")?;

    let report = service.dispatch(&file, &rules).await?;

    assert_eq!(report.size_bytes, 0);
    assert!(report.command.is_none());
    assert_eq!(report.relocation.strategy, RelocationStrategy::Rename);
    assert!(zone.outbox().join("x.txt").exists());
    assert!(!file.exists());
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn command_receives_the_source_path_before_relocation() -> anyhow::Result<()> {
    let zone = DropZone::new()?;
    let bus = EventBus::with_capacity(64);
    let mut stream = bus.subscribe(None);
    let service = DispatchService::from_settings(&settings(), bus.clone());
    let rules = RuleTable::from_rules([rule(&zone, Some("echo"))]);
    let file = zone.drop_file("y.txt", b"hello shuttle")?;

    let report = service.dispatch(&file, &rules).await?;

    let expected = format!("{}\n", file.display());
    assert_eq!(
        report.command,
        Some(CommandOutcome::Succeeded { stdout: expected })
    );
    assert_eq!(fs::read(zone.outbox().join("y.txt"))?, b"hello shuttle");

    let finished = next_matching(&mut stream, WAIT, |event| {
        matches!(event, Event::CommandFinished { .. })
    })
    .await?;
    assert!(matches!(
        finished.event,
        Event::CommandFinished {
            status: CommandStatus::Succeeded,
            ..
        }
    ));
    let relocated = next_matching(&mut stream, WAIT, |event| {
        matches!(event, Event::FileRelocated { .. })
    })
    .await?;
    assert_eq!(relocated.event.dispatch_id(), Some(report.dispatch_id));
    Ok(())
}

#[tokio::test]
async fn concurrent_dispatches_in_one_directory_are_independent() -> anyhow::Result<()> {
    let zone = DropZone::new()?;
    let bus = EventBus::with_capacity(256);
    let service = DispatchService::from_settings(&settings(), bus.clone());
    let rules = Arc::new(RuleTable::from_rules([rule(&zone, None)]));

    let mut handles = Vec::new();
    for index in 0..8 {
        let name = format!("batch-{index}.dat");
        let file = zone.drop_file(&name, format!("payload {index}").as_bytes())?;
        handles.push(service.spawn_dispatch(file, Arc::clone(&rules)));
    }
    for handle in handles {
        handle.await?;
    }

    for index in 0..8 {
        let moved = zone.outbox().join(format!("batch-{index}.dat"));
        assert_eq!(fs::read_to_string(&moved)?, format!("payload {index}"));
    }
    Ok(())
}

#[tokio::test]
async fn file_outside_every_rule_is_left_in_place() -> anyhow::Result<()> {
    let zone = DropZone::new()?;
    let bus = EventBus::with_capacity(16);
    let mut stream = bus.subscribe(None);
    let service = DispatchService::from_settings(&settings(), bus.clone());
    let rules = Arc::new(RuleTable::from_rules([rule(&zone, None)]));
    let stray = zone.root().join("stray.txt");
    fs::write(&stray, b"left alone")?;

    service.spawn_dispatch(stray.clone(), rules).await?;

    assert!(stray.exists());
    let started = tokio::time::timeout(Duration::from_millis(100), stream.next()).await;
    assert!(started.is_err(), "no dispatch should start without a rule");
    Ok(())
}
