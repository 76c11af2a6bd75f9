//! Unit tests for discovery, probing and the background loop.

use std::fs;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;
use crate::tests::{
    FixedClock, ManualTicker, MockInvoker, info_json, wait_for_passes, write_plugin,
};

const PROBE_TIMEOUT: Duration = Duration::from_millis(500);

#[fixture]
fn plugin_dir() -> TempDir {
    TempDir::new().expect("temp dir")
}

/// An invoker answering every probe with `info` for the requested name.
fn answering_invoker() -> MockInvoker {
    let mut invoker = MockInvoker::new();
    invoker
        .expect_invoke()
        .returning(|request| Ok(info_json(request.plugin(), "1.0.0")));
    invoker
}

fn registry(dir: &TempDir, invoker: MockInvoker) -> PluginRegistry {
    PluginRegistry::new(dir.path(), Arc::new(invoker), PROBE_TIMEOUT)
}

fn names(registry: &PluginRegistry) -> Vec<String> {
    registry
        .list()
        .iter()
        .map(|plugin| plugin.name().to_owned())
        .collect()
}

fn touch_later(path: &Path) {
    let file = fs::File::options().write(true).open(path).expect("open plugin");
    file.set_modified(SystemTime::now() + Duration::from_secs(60))
        .expect("set mtime");
}

#[rstest]
fn discovers_only_visible_executables(plugin_dir: TempDir) {
    write_plugin(plugin_dir.path(), "sqlite", "exit 0");
    write_plugin(plugin_dir.path(), "postgres", "exit 0");
    write_plugin(plugin_dir.path(), ".hidden", "exit 0");
    fs::write(plugin_dir.path().join("README.md"), "not a plugin").expect("write readme");
    fs::create_dir(plugin_dir.path().join("lib")).expect("mkdir");

    let registry = registry(&plugin_dir, answering_invoker());
    registry.rescan().expect("rescan");

    assert_eq!(names(&registry), ["postgres", "sqlite"]);
    let sqlite = registry.get("sqlite").expect("sqlite listed");
    assert_eq!(sqlite.version(), "1.0.0");
    assert_eq!(sqlite.kind(), "sql");
    assert_eq!(sqlite.description(), "sqlite driver");
    assert!(sqlite.last_probe_error().is_none());
}

#[rstest]
fn probe_uses_info_with_probe_deadline(plugin_dir: TempDir) {
    let path = write_plugin(plugin_dir.path(), "mysql.sh", "exit 0");
    let mut invoker = MockInvoker::new();
    invoker
        .expect_invoke()
        .withf(move |request| {
            request.plugin() == "mysql"
                && request.executable() == path.as_path()
                && request.command() == PluginCommand::Info
                && request.timeout() == PROBE_TIMEOUT
                && request.payload().is_none()
        })
        .once()
        .returning(|request| Ok(info_json(request.plugin(), "8.0")));

    let registry = registry(&plugin_dir, invoker);
    registry.rescan().expect("rescan");
    assert_eq!(names(&registry), ["mysql"]);
}

#[rstest]
fn failed_probe_keeps_plugin_listed(plugin_dir: TempDir) {
    write_plugin(plugin_dir.path(), "broken", "exit 1");
    let mut invoker = MockInvoker::new();
    invoker.expect_invoke().returning(|request| {
        Err(PluginError::Timeout {
            name: request.plugin().to_owned(),
            command: request.command(),
            timeout_ms: request.timeout_ms(),
        })
    });

    let registry = registry(&plugin_dir, invoker);
    registry.rescan().expect("rescan");

    let broken = registry.get("broken").expect("still listed");
    assert!(broken.version().is_empty());
    let error = broken.last_probe_error().expect("probe error recorded");
    assert!(error.contains("timed out"), "unexpected error: {error}");
}

#[rstest]
fn unparseable_info_is_a_probe_error(plugin_dir: TempDir) {
    write_plugin(plugin_dir.path(), "legacy", "exit 0");
    let mut invoker = MockInvoker::new();
    invoker
        .expect_invoke()
        .returning(|_| Ok(b"legacy 0.1".to_vec()));

    let registry = registry(&plugin_dir, invoker);
    registry.rescan().expect("rescan");
    let legacy = registry.get("legacy").expect("still listed");
    assert!(legacy.last_probe_error().is_some());
}

#[rstest]
fn vanished_file_is_removed(plugin_dir: TempDir) {
    let path = write_plugin(plugin_dir.path(), "sqlite", "exit 0");
    write_plugin(plugin_dir.path(), "redis", "exit 0");
    let registry = registry(&plugin_dir, answering_invoker());
    registry.rescan().expect("first pass");

    fs::remove_file(path).expect("remove plugin");
    registry.rescan().expect("second pass");

    assert_eq!(names(&registry), ["redis"]);
    assert!(registry.get("sqlite").is_none());
}

#[rstest]
fn unchanged_files_are_not_reprobed(plugin_dir: TempDir) {
    write_plugin(plugin_dir.path(), "sqlite", "exit 0");
    let mut invoker = MockInvoker::new();
    invoker
        .expect_invoke()
        .once()
        .returning(|request| Ok(info_json(request.plugin(), "1.0.0")));

    let registry = registry(&plugin_dir, invoker);
    registry.rescan().expect("first pass");
    registry.rescan().expect("second pass");
    registry.rescan().expect("third pass");
    assert_eq!(registry.passes(), 3);
}

#[rstest]
fn replaced_binary_is_reprobed_keeping_discovery_time(plugin_dir: TempDir) {
    let path = write_plugin(plugin_dir.path(), "sqlite", "exit 0");
    let mut invoker = MockInvoker::new();
    let mut versions = vec!["2.0.0", "1.0.0"];
    invoker.expect_invoke().times(2).returning(move |request| {
        let version = versions.pop().expect("two probes");
        Ok(info_json(request.plugin(), version))
    });
    let clock = Arc::new(FixedClock::new());

    let registry = registry(&plugin_dir, invoker).with_clock(clock.clone());
    registry.rescan().expect("first pass");
    let first = registry.get("sqlite").expect("listed");

    clock.advance(Duration::from_secs(3_600));
    touch_later(&path);
    registry.rescan().expect("second pass");
    let second = registry.get("sqlite").expect("still listed");

    assert_eq!(first.version(), "1.0.0");
    assert_eq!(second.version(), "2.0.0");
    assert_eq!(second.discovered_at(), first.discovered_at());
}

#[rstest]
fn first_path_wins_for_duplicate_names(plugin_dir: TempDir) {
    let plain = write_plugin(plugin_dir.path(), "pg", "exit 0");
    write_plugin(plugin_dir.path(), "pg.sh", "exit 0");

    let registry = registry(&plugin_dir, answering_invoker());
    registry.rescan().expect("rescan");

    assert_eq!(names(&registry), ["pg"]);
    assert_eq!(registry.get("pg").expect("listed").path(), plain.as_path());
}

#[rstest]
fn missing_directory_is_reported_without_removals(plugin_dir: TempDir) {
    let root = plugin_dir.path().join("plugins");
    fs::create_dir(&root).expect("mkdir");
    write_plugin(&root, "sqlite", "exit 0");
    let registry = PluginRegistry::new(&root, Arc::new(answering_invoker()), PROBE_TIMEOUT);
    registry.rescan().expect("first pass");

    fs::remove_dir_all(&root).expect("remove directory");
    let err = registry.rescan().expect_err("directory is gone");

    assert!(matches!(err, PluginError::Discovery { ref path, .. } if *path == root));
    assert_eq!(names(&registry), ["sqlite"]);
}

#[rstest]
fn descriptor_serialises_for_display(plugin_dir: TempDir) {
    write_plugin(plugin_dir.path(), "sqlite", "exit 0");
    let registry = registry(&plugin_dir, answering_invoker())
        .with_clock(Arc::new(FixedClock::new()));
    registry.rescan().expect("rescan");

    let value = serde_json::to_value(registry.list()).expect("serialise");
    let sqlite = value.get(0).expect("one plugin");
    assert_eq!(sqlite["name"], "sqlite");
    assert_eq!(sqlite["type"], "sql");
    assert_eq!(sqlite["lastProbeError"], serde_json::Value::Null);
    assert_eq!(sqlite["discoveredAt"], "2023-11-14T22:13:20Z");
    assert!(sqlite.get("modified").is_none());
}

#[rstest]
fn background_loop_tracks_directory(plugin_dir: TempDir) {
    let registry = Arc::new(registry(&plugin_dir, answering_invoker()));
    let (ticker, tick) = ManualTicker::new();
    let handle = DiscoveryLoop::spawn(Arc::clone(&registry), ticker).expect("spawn loop");
    wait_for_passes(&registry, 1);
    assert!(registry.list().is_empty());

    let path = write_plugin(plugin_dir.path(), "sqlite", "exit 0");
    tick.fire();
    wait_for_passes(&registry, 2);
    assert_eq!(names(&registry), ["sqlite"]);

    fs::remove_file(path).expect("remove plugin");
    tick.fire();
    wait_for_passes(&registry, 3);
    assert!(registry.list().is_empty());

    handle.shutdown().expect("clean shutdown");
}

#[rstest]
fn background_loop_survives_failed_pass(plugin_dir: TempDir) {
    let missing = plugin_dir.path().join("missing");
    let registry = Arc::new(PluginRegistry::new(
        &missing,
        Arc::new(answering_invoker()),
        PROBE_TIMEOUT,
    ));
    let (ticker, tick) = ManualTicker::new();
    let handle = DiscoveryLoop::spawn(Arc::clone(&registry), ticker).expect("spawn loop");
    wait_for_passes(&registry, 1);

    fs::create_dir(&missing).expect("mkdir");
    write_plugin(&missing, "sqlite", "exit 0");
    tick.fire();
    wait_for_passes(&registry, 2);
    assert_eq!(names(&registry), ["sqlite"]);

    handle.shutdown().expect("clean shutdown");
}

#[rstest]
fn listing_is_not_blocked_by_a_slow_info_call(plugin_dir: TempDir) {
    write_plugin(plugin_dir.path(), "sqlite", "exit 0");
    let (started, started_rx) = mpsc::channel::<()>();
    let (release, release_rx) = mpsc::channel::<()>();
    let mut invoker = MockInvoker::new();
    invoker.expect_invoke().returning(move |request| {
        if request.plugin() == "slow" {
            started.send(()).expect("test is waiting");
            release_rx
                .recv_timeout(Duration::from_secs(5))
                .expect("test releases the call");
        }
        Ok(info_json(request.plugin(), "1.0.0"))
    });
    let registry = Arc::new(registry(&plugin_dir, invoker));
    registry.rescan().expect("first pass");

    write_plugin(plugin_dir.path(), "slow", "exit 0");
    let scanner = Arc::clone(&registry);
    let scanning = thread::spawn(move || scanner.rescan());
    started_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("second pass reached the slow plugin");

    let reader = Arc::clone(&registry);
    let listed = thread::spawn(move || {
        let begun = Instant::now();
        let visible = names(&reader);
        (visible, reader.get("slow").is_none(), begun.elapsed())
    })
    .join()
    .expect("reader thread");
    let (listed_names, slow_absent, waited) = listed;
    assert_eq!(listed_names, ["sqlite"]);
    assert!(slow_absent);
    assert!(waited < Duration::from_secs(1), "listing waited {waited:?}");

    release.send(()).expect("call is blocked");
    scanning.join().expect("scan thread").expect("second pass");
    assert_eq!(names(&registry), ["slow", "sqlite"]);
}

#[rstest]
fn rescan_racing_the_loop_calls_info_once_per_file(plugin_dir: TempDir) {
    for name in ["mysql", "postgres", "sqlite"] {
        write_plugin(plugin_dir.path(), name, "exit 0");
    }
    let calls = Arc::new(Mutex::new(Vec::<String>::new()));
    let seen = Arc::clone(&calls);
    let mut invoker = MockInvoker::new();
    invoker.expect_invoke().returning(move |request| {
        thread::sleep(Duration::from_millis(20));
        seen.lock().expect("call log").push(request.plugin().to_owned());
        Ok(info_json(request.plugin(), "1.0.0"))
    });
    let registry = Arc::new(registry(&plugin_dir, invoker));
    let (ticker, tick) = ManualTicker::new();
    let handle = DiscoveryLoop::spawn(Arc::clone(&registry), ticker).expect("spawn loop");

    let racers: Vec<_> = (0..3)
        .map(|_| {
            let racer = Arc::clone(&registry);
            thread::spawn(move || racer.rescan())
        })
        .collect();
    tick.fire();
    for racer in racers {
        racer.join().expect("racer thread").expect("rescan");
    }
    wait_for_passes(&registry, 5);
    handle.shutdown().expect("clean shutdown");

    let mut probed = calls.lock().expect("call log").clone();
    probed.sort();
    assert_eq!(probed, ["mysql", "postgres", "sqlite"]);
    assert_eq!(names(&registry), ["mysql", "postgres", "sqlite"]);
    for plugin in registry.list() {
        assert_eq!(plugin.version(), "1.0.0");
        assert!(plugin.last_probe_error().is_none());
    }
}

#[test]
fn interval_ticker_stops_when_signalled() {
    let (stop, stopped) = mpsc::channel::<()>();
    let mut ticker = IntervalTicker::new(Duration::from_secs(60));
    drop(stop);
    let started = Instant::now();
    assert!(!ticker.wait(&stopped));
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn interval_ticker_fires_after_interval() {
    let (_stop, stopped) = mpsc::channel::<()>();
    let mut ticker = IntervalTicker::new(Duration::from_millis(20));
    assert!(ticker.wait(&stopped));
}
