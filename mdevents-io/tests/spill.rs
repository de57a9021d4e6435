#![allow(clippy::uninlined_format_args)]
use mdevents_algorithms::{compare_workspaces, CompareOptions, MdEventWorkspace};
use mdevents_core::{
    BoxControllerConfig, EventBatch, EventStore, MdEvent, Progress, SplitInto,
    WorkspaceDescriptor,
};
use mdevents_io::{enforce_memory_budget, EventFileReader, EventFileWriter, FileEventStore, OutOfCoreConfig};
use std::sync::Arc;
use tempfile::tempdir;

#[allow(clippy::cast_precision_loss)]
fn events(n: usize) -> EventBatch {
    (0..n)
        .map(|i| {
            let x = (i % 97) as f32 / 9.7;
            let y = (i % 89) as f32 / 8.9;
            MdEvent::new(vec![x, y], 1.0 + (i % 3) as f32, 1.0)
        })
        .collect()
}

fn workspace() -> MdEventWorkspace {
    let descriptor = WorkspaceDescriptor::from_ranges(&[0.0, 0.0], &[10.0, 10.0], 10).unwrap();
    let config = BoxControllerConfig::new()
        .with_split_into(SplitInto::Uniform(3))
        .with_split_threshold(100)
        .with_max_depth(4);
    MdEventWorkspace::new(descriptor, config).unwrap()
}

#[test]
fn test_budget_spills_to_file_and_compares_equal() {
    let dir = tempdir().unwrap();
    let store = Arc::new(FileEventStore::create(dir.path().join("spill.bin")).unwrap());
    let mut spilled = workspace().with_store(Arc::clone(&store) as Arc<dyn EventStore>);
    let mut reference = workspace();
    let batch = events(5_000);
    spilled.add_events(&batch, &Progress::silent()).unwrap();
    reference.add_events(&batch, &Progress::silent()).unwrap();

    let bytes = EventBatch::bytes_per_event(2) * 1_200;
    let config = OutOfCoreConfig::default().with_memory_budget_bytes(bytes);
    let budget_events = config.resolve_event_budget(2).unwrap();
    let released = enforce_memory_budget(spilled.tree(), &config).unwrap();
    assert!(released >= 4_000, "released {}", released);
    assert!(spilled.tree().resident_events() <= budget_events);
    assert_eq!(store.stored_events(), released);
    assert!(store.file_len() > 0);

    let outcome = compare_workspaces(&reference, &spilled, &CompareOptions::new());
    assert!(outcome.equals, "{}", outcome.message);
    spilled.tree().validate().unwrap();
}

#[test]
fn test_file_round_trip_into_tree() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("events.mdev");
    let batch = events(1_234);
    EventFileWriter::create(&path)
        .unwrap()
        .write_events_binary(&batch)
        .unwrap();

    let reader = EventFileReader::open(&path).unwrap();
    let mut ws = workspace();
    for chunk in reader.read_chunks(500).unwrap() {
        ws.add_events(&chunk, &Progress::silent()).unwrap();
    }
    assert_eq!(ws.n_points(), 1_234);

    let mut expected = workspace();
    expected.add_events(&batch, &Progress::silent()).unwrap();
    assert!(compare_workspaces(&expected, &ws, &CompareOptions::new()).equals);
}
