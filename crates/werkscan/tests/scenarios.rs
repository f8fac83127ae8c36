//! The shipped demo scenarios must stay parseable and true to their names.

use std::path::PathBuf;
use std::time::Duration;
use werkscan_engine::{ErrorKind, Scanner, SessionOutcome, Strategy};
use werkscan_testkit::{CallbackRecorder, Scenario};

fn scenarios_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scenarios")
}

async fn replay(name: &str) -> SessionOutcome {
    let scenario = Scenario::from_path(&scenarios_dir().join(name))
        .unwrap_or_else(|err| panic!("{name}: {err:#}"));
    let rig = scenario.build();
    let scanner = Scanner::new(rig.platform.clone(), rig.fetch.clone(), rig.config.clone());
    let recorder = CallbackRecorder::new();
    let handle = scanner.open_scan(recorder.callbacks()).await;
    tokio::time::timeout(Duration::from_secs(5), handle.join())
        .await
        .expect("scenario timed out")
        .expect("session already joined")
}

#[test]
fn every_shipped_scenario_parses_and_builds() {
    let mut count = 0;
    for entry in std::fs::read_dir(scenarios_dir()).expect("scenarios directory") {
        let path = entry.unwrap().path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        let scenario = Scenario::from_path(&path)
            .unwrap_or_else(|err| panic!("{}: {err:#}", path.display()));
        let _ = scenario.build();
        count += 1;
    }
    assert!(count >= 4, "expected shipped scenarios, found {count}");
}

#[tokio::test]
async fn shop_floor_tablet_detects_natively() {
    match replay("shop_floor_tablet.json").await {
        SessionOutcome::Detected(result) => {
            assert_eq!(result.value, "CH-20251107A-001");
            assert_eq!(result.source, Strategy::NativeDetector);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn legacy_browser_detects_via_the_external_engine() {
    match replay("legacy_browser.json").await {
        SessionOutcome::Detected(result) => {
            assert_eq!(result.value, "WK-4711");
            assert_eq!(result.source, Strategy::LibraryDetector);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn locked_down_desk_detects_from_a_still_image() {
    match replay("locked_down_desk.json").await {
        SessionOutcome::Detected(result) => {
            assert_eq!(result.value, "CH-20251107A-001");
            assert_eq!(result.source, Strategy::FileFallback);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn permission_denied_surfaces_without_fallback() {
    match replay("permission_denied.json").await {
        SessionOutcome::Failed(error) => {
            assert_eq!(error.kind, ErrorKind::PermissionDenied);
            assert_eq!(error.message, "Camera access was denied");
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}
