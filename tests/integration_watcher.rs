// Integration tests for the watch coordinator
// Exercises start/rescan/stop and live notify events through the public API

use episode_sorter::{start, ProcessingOutcome, ReportKind, RuleSet, SorterError, TEMP_PREFIX};
use serial_test::serial;
use std::time::Duration;

mod common;
use common::{fast_config, rule, wait_for_outcome, wait_for_report, Library, SUCCESSION_TEMPLATE};

#[tokio::test]
async fn test_watcher_start_and_stop() {
	let library = Library::new();
	let rules = RuleSet::new(vec![library.succession_rule()]);

	let (handle, _reports) = start(rules, fast_config()).unwrap();
	assert!(handle.is_running());

	let stop_result = handle.stop().await;
	assert!(stop_result.is_ok(), "Watcher should stop cleanly");
}

#[tokio::test]
async fn test_start_rejects_empty_rule_set() {
	let result = start(RuleSet::default(), fast_config());
	assert!(matches!(
		result,
		Err(SorterError::ConfigurationError { .. })
	));
}

#[tokio::test]
async fn test_rescan_copies_next_episode_and_skips_unmatched() {
	let library = Library::new();
	library.existing_episode("Succession - S01E05.mkv");
	library.download("Succession.S01E06.1080p.mkv", b"episode six");
	library.download("RandomShow.mkv", b"something else");

	let rules = RuleSet::new(vec![library.succession_rule()]);
	let (handle, mut reports) = start(rules, fast_config()).unwrap();

	assert_eq!(handle.rescan().await.unwrap(), 2);

	let outcome = wait_for_outcome(&mut reports, "Succession.S01E06.1080p.mkv").await;
	assert_eq!(
		outcome.as_ref().and_then(|o| o.final_name()),
		Some("Succession - S01E06.mkv")
	);

	assert!(library.downloads.join("RandomShow.mkv").exists());

	handle.stop().await.unwrap();

	assert_eq!(
		library.destination_names(),
		vec![
			"Succession - S01E05.mkv".to_string(),
			"Succession - S01E06.mkv".to_string()
		]
	);
	assert!(library
		.downloads
		.join("Succession.S01E06.1080p.mkv")
		.exists());
}

#[tokio::test]
async fn test_unmatched_file_is_reported() {
	let library = Library::new();
	library.download("RandomShow.mkv", b"something else");

	let rules = RuleSet::new(vec![library.succession_rule()]);
	let (handle, mut reports) = start(rules, fast_config()).unwrap();
	handle.rescan().await.unwrap();

	let outcome = wait_for_outcome(&mut reports, "RandomShow.mkv").await;
	assert_eq!(outcome, Some(ProcessingOutcome::SkippedNoMatch));

	handle.stop().await.unwrap();
	assert!(library.destination_names().is_empty());
}

#[tokio::test]
async fn test_missing_source_is_reported_and_other_rules_continue() {
	let library = Library::new();
	let missing = library.root.path().join("not-there");
	let rules = RuleSet::new(vec![
		rule(0, &missing, &["succession"], &library.destination, SUCCESSION_TEMPLATE, 1),
		rule(1, &library.downloads, &["succession"], &library.destination, SUCCESSION_TEMPLATE, 1),
	]);
	library.download("Succession.S01E01.mkv", b"pilot");

	let (handle, mut reports) = start(rules, fast_config()).unwrap();

	let report = wait_for_report(&mut reports, Duration::from_secs(5), |r| {
		matches!(r.kind, ReportKind::SourceMissing { .. })
	})
	.await
	.expect("missing source should be reported");
	match report.kind {
		ReportKind::SourceMissing { path } => assert_eq!(path, missing),
		other => panic!("unexpected report {other:?}"),
	}

	handle.rescan().await.unwrap();
	let outcome = wait_for_outcome(&mut reports, "Succession.S01E01.mkv").await;
	match outcome {
		Some(ProcessingOutcome::Copied { rule, final_name, .. }) => {
			assert_eq!(rule, 1);
			assert_eq!(final_name, "Succession - S01E01.mkv");
		}
		other => panic!("expected a copy, got {other:?}"),
	}

	handle.stop().await.unwrap();
}

#[tokio::test]
async fn test_rescan_of_copied_file_does_not_create_a_new_episode() {
	let library = Library::new();
	library.download("Succession.S01E01.mkv", b"pilot");

	let rules = RuleSet::new(vec![library.succession_rule()]);
	let (handle, mut reports) = start(rules, fast_config()).unwrap();

	handle.rescan().await.unwrap();
	let outcome = wait_for_outcome(&mut reports, "Succession.S01E01.mkv").await;
	assert!(outcome.map_or(false, |o| o.is_copied()));

	handle.rescan().await.unwrap();
	let outcome = wait_for_outcome(&mut reports, "Succession.S01E01.mkv").await;
	assert_eq!(outcome, Some(ProcessingOutcome::SkippedAlreadyProcessed));

	handle.stop().await.unwrap();
	assert_eq!(
		library.destination_names(),
		vec!["Succession - S01E01.mkv".to_string()]
	);
}

#[tokio::test]
#[serial]
async fn test_live_event_is_copied() {
	let library = Library::new();
	library.existing_episode("Succession - S01E05.mkv");

	let rules = RuleSet::new(vec![library.succession_rule()]);
	let (handle, mut reports) = start(rules, fast_config()).unwrap();

	common::wait_for_events().await;
	library.download("Succession.S01E06.1080p.mkv", &[42u8; 2048]);

	let outcome = wait_for_outcome(&mut reports, "Succession.S01E06.1080p.mkv").await;
	assert_eq!(
		outcome.as_ref().and_then(|o| o.final_name()),
		Some("Succession - S01E06.mkv")
	);

	handle.stop().await.unwrap();
	let copied = library.destination.join("Succession - S01E06.mkv");
	assert_eq!(std::fs::read(copied).unwrap(), vec![42u8; 2048]);
}

#[tokio::test]
#[serial]
async fn test_in_progress_download_is_ignored_until_renamed() {
	let library = Library::new();
	let rules = RuleSet::new(vec![library.succession_rule()]);
	let (handle, mut reports) = start(rules, fast_config()).unwrap();

	common::wait_for_events().await;
	let partial = library.download("Succession.S01E01.mkv.!qb", b"pilot");
	common::wait_for_events().await;
	assert!(library.destination_names().is_empty());

	std::fs::rename(&partial, library.downloads.join("Succession.S01E01.mkv")).unwrap();

	let outcome = wait_for_outcome(&mut reports, "Succession.S01E01.mkv").await;
	assert!(outcome.map_or(false, |o| o.is_copied()));

	handle.stop().await.unwrap();
}

#[tokio::test]
#[serial]
async fn test_source_created_after_start_is_picked_up() {
	let library = Library::new();
	let late = library.root.path().join("late-downloads");
	let rules = RuleSet::new(vec![rule(
		0,
		&late,
		&["succession"],
		&library.destination,
		SUCCESSION_TEMPLATE,
		1,
	)]);

	let (handle, mut reports) = start(rules, fast_config()).unwrap();
	assert!(wait_for_report(&mut reports, Duration::from_secs(5), |r| {
		matches!(r.kind, ReportKind::SourceMissing { .. })
	})
	.await
	.is_some());

	std::fs::create_dir_all(&late).unwrap();
	std::fs::write(late.join("Succession.S01E01.mkv"), b"pilot").unwrap();

	assert!(wait_for_report(&mut reports, Duration::from_secs(5), |r| {
		matches!(r.kind, ReportKind::SourceAvailable { .. })
	})
	.await
	.is_some());

	let outcome = wait_for_outcome(&mut reports, "Succession.S01E01.mkv").await;
	assert_eq!(
		outcome.as_ref().and_then(|o| o.final_name()),
		Some("Succession - S01E01.mkv")
	);

	handle.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_lets_in_flight_copy_finish() {
	let library = Library::new();
	let content = vec![7u8; 64 * 1024 * 1024];
	library.download("Succession.S01E01.mkv", &content);

	let rules = RuleSet::new(vec![library.succession_rule()]);
	let (handle, _reports) = start(rules, fast_config()).unwrap();
	handle.rescan().await.unwrap();

	// Stop as soon as the copy has started writing into the destination
	let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
	while library.destination_names().is_empty() {
		assert!(tokio::time::Instant::now() < deadline, "copy never started");
		tokio::time::sleep(Duration::from_millis(1)).await;
	}
	handle.stop().await.unwrap();

	assert_eq!(
		library.destination_names(),
		vec!["Succession - S01E01.mkv".to_string()]
	);
	let copied = library.destination.join("Succession - S01E01.mkv");
	assert_eq!(
		std::fs::metadata(copied).unwrap().len(),
		content.len() as u64
	);
	assert!(library
		.destination_names()
		.iter()
		.all(|name| !name.starts_with(TEMP_PREFIX)));
}

#[tokio::test]
async fn test_file_vanishing_before_stable_is_not_reported() {
	let library = Library::new();
	let vanishing = library.download("Succession.Pilot.mkv", b"half a pilot");

	let rules = RuleSet::new(vec![library.succession_rule()]);
	let (handle, mut reports) = start(rules, fast_config()).unwrap();
	assert_eq!(handle.rescan().await.unwrap(), 1);

	tokio::time::sleep(Duration::from_millis(30)).await;
	std::fs::remove_file(&vanishing).unwrap();

	let later = library.download("Succession.S01E02.mkv", b"episode two");
	handle.rescan().await.unwrap();

	let mut processed = Vec::new();
	let report = wait_for_report(&mut reports, Duration::from_secs(10), |r| match &r.kind {
		ReportKind::Processed { path, .. } => {
			processed.push(path.clone());
			*path == later
		}
		_ => false,
	})
	.await
	.expect("the remaining download should be processed");
	assert_eq!(
		report.outcome().and_then(|o| o.final_name()),
		Some("Succession - S01E01.mkv")
	);
	assert!(!processed.contains(&vanishing));

	// Give the deferred recheck of the vanished file time to run
	common::wait_for_events().await;
	handle.stop().await.unwrap();

	while let Ok(report) = reports.try_recv() {
		if let ReportKind::Processed { path, outcome } = report.kind {
			assert_ne!(path, vanishing, "unexpected outcome {outcome:?}");
		}
	}
	assert_eq!(
		library.destination_names(),
		vec!["Succession - S01E01.mkv".to_string()]
	);
}

#[tokio::test]
#[serial]
async fn test_recreated_source_folder_is_watched_again() {
	let library = Library::new();
	let rules = RuleSet::new(vec![library.succession_rule()]);
	let (handle, mut reports) = start(rules, fast_config()).unwrap();
	common::wait_for_events().await;

	std::fs::remove_dir_all(&library.downloads).unwrap();
	std::fs::create_dir_all(&library.downloads).unwrap();

	assert!(wait_for_report(&mut reports, Duration::from_secs(5), |r| {
		matches!(r.kind, ReportKind::SourceAvailable { .. })
	})
	.await
	.is_some());

	library.download("Succession.S01E01.mkv", b"pilot");
	let outcome = wait_for_outcome(&mut reports, "Succession.S01E01.mkv").await;
	assert_eq!(
		outcome.as_ref().and_then(|o| o.final_name()),
		Some("Succession - S01E01.mkv")
	);

	handle.stop().await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
#[serial]
async fn test_unreadable_watched_folder_is_not_reported_missing() {
	use std::os::unix::fs::PermissionsExt;

	let library = Library::new();
	let rules = RuleSet::new(vec![library.succession_rule()]);
	let (handle, mut reports) = start(rules, fast_config()).unwrap();

	std::fs::set_permissions(&library.downloads, std::fs::Permissions::from_mode(0o000)).unwrap();
	let restore = || {
		std::fs::set_permissions(&library.downloads, std::fs::Permissions::from_mode(0o755))
			.unwrap()
	};
	if std::fs::read_dir(&library.downloads).is_ok() {
		// Permission bits are not enforced for this user (root)
		restore();
		handle.stop().await.unwrap();
		return;
	}

	assert_eq!(handle.rescan().await.unwrap(), 0);
	let flapping = wait_for_report(&mut reports, Duration::from_millis(500), |r| {
		matches!(
			r.kind,
			ReportKind::SourceMissing { .. } | ReportKind::SourceAvailable { .. }
		)
	})
	.await;

	restore();
	handle.stop().await.unwrap();
	assert!(flapping.is_none(), "unexpected report {flapping:?}");
}
