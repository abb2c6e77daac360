use crate::config::WatcherConfig;
use crate::debounce::Debouncer;
use crate::error::{Result, SorterError};
use crate::events::{EventType, ProcessingOutcome, ReportKind, SortReport};
use crate::ingest::Ingestor;
use crate::paths::{dir_identity, normalize_path};
use crate::rules::RuleSet;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use tokio::sync::mpsc as tokio_mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

enum Command {
	Rescan(oneshot::Sender<usize>),
	Stop,
}

/// What the notify forwarders hand to the consumer task
enum RawEvent {
	/// A file may have appeared or changed
	Changed(PathBuf),
	/// The watched folder itself was removed
	SourceRemoved { dir: PathBuf, generation: u64 },
}

/// Control handle for a running coordinator
pub struct WatcherHandle {
	commands: tokio_mpsc::UnboundedSender<Command>,
	task: JoinHandle<()>,
}

impl WatcherHandle {
	/// Walk every configured source folder and queue all files found.
	///
	/// Returns the number of files queued. Queued files go through the same
	/// stability and matching path as live events.
	pub async fn rescan(&self) -> Result<usize> {
		let (reply_tx, reply_rx) = oneshot::channel();
		self.commands
			.send(Command::Rescan(reply_tx))
			.map_err(|_| SorterError::ChannelSend)?;
		reply_rx.await.map_err(|_| SorterError::ChannelSend)
	}

	/// Stop accepting events and wait for the in-flight file to finish
	pub async fn stop(self) -> Result<()> {
		self.commands
			.send(Command::Stop)
			.map_err(|_| SorterError::StopSignal)?;
		self.task.await.map_err(|e| {
			error!("Watcher task ended abnormally: {}", e);
			SorterError::StopSignal
		})
	}

	pub fn is_running(&self) -> bool {
		!self.task.is_finished()
	}
}

/// Start watching every source folder named by `rules`.
///
/// Missing source folders are reported on the returned channel and watched
/// for; they never fail startup. Must be called inside a tokio runtime.
pub fn start(
	rules: RuleSet, config: WatcherConfig,
) -> Result<(WatcherHandle, tokio_mpsc::UnboundedReceiver<SortReport>)> {
	config.validate()?;
	if rules.is_empty() {
		return Err(SorterError::ConfigurationError {
			parameter: "rules".to_string(),
			reason: "at least one rule is required".to_string(),
		});
	}

	let (command_tx, command_rx) = tokio_mpsc::unbounded_channel();
	let (raw_tx, raw_rx) = tokio_mpsc::unbounded_channel();
	let (report_tx, report_rx) = tokio_mpsc::unbounded_channel();

	let mut coordinator = WatchCoordinator::new(Arc::new(rules), config, raw_tx, report_tx);
	coordinator.subscribe_all();

	let task = tokio::spawn(coordinator.run(command_rx, raw_rx));

	Ok((
		WatcherHandle {
			commands: command_tx,
			task,
		},
		report_rx,
	))
}

/// A live notify subscription on one source folder
struct Subscription {
	dir: PathBuf,
	/// Folder identity when the watch was set up
	identity: Option<u64>,
	generation: u64,
	_watcher: RecommendedWatcher,
}

impl Subscription {
	/// True once the folder is gone or another folder took its name
	fn is_stale(&self) -> bool {
		if !self.dir.is_dir() {
			return true;
		}
		matches!(
			(self.identity, dir_identity(&self.dir)),
			(Some(then), Some(now)) if then != now
		)
	}
}

/// Owns the subscriptions, the pending queue and the ingestor.
///
/// All state lives on the single consumer task, so files are processed one
/// at a time and episode numbers cannot race.
struct WatchCoordinator {
	rules: Arc<RuleSet>,
	config: WatcherConfig,
	ingestor: Ingestor,
	debouncer: Debouncer,
	queue: VecDeque<PathBuf>,
	queued: HashSet<PathBuf>,
	/// Files waiting for their next stability check
	deferred: HashMap<PathBuf, Instant>,
	subscriptions: HashMap<PathBuf, Subscription>,
	missing: Vec<PathBuf>,
	last_source_check: Instant,
	next_generation: u64,
	raw_tx: tokio_mpsc::UnboundedSender<RawEvent>,
	reports: tokio_mpsc::UnboundedSender<SortReport>,
}

impl WatchCoordinator {
	fn new(
		rules: Arc<RuleSet>, config: WatcherConfig, raw_tx: tokio_mpsc::UnboundedSender<RawEvent>,
		reports: tokio_mpsc::UnboundedSender<SortReport>,
	) -> Self {
		Self {
			ingestor: Ingestor::new(Arc::clone(&rules), config.clone()),
			debouncer: Debouncer::new(config.debounce_window),
			rules,
			config,
			queue: VecDeque::new(),
			queued: HashSet::new(),
			deferred: HashMap::new(),
			subscriptions: HashMap::new(),
			missing: Vec::new(),
			last_source_check: Instant::now(),
			next_generation: 0,
			raw_tx,
			reports,
		}
	}

	/// Subscribe each distinct source folder, recording the missing ones
	fn subscribe_all(&mut self) {
		for dir in self.rules.source_dirs() {
			if !dir.is_dir() {
				self.mark_missing(dir);
				continue;
			}
			if let Err(e) = self.subscribe(&dir) {
				warn!("Could not watch {:?} [{}]: {}", dir, e.category(), e);
				self.mark_missing(dir);
			}
		}
	}

	/// Watch `dir`. Returns false when it is already watched.
	fn subscribe(&mut self, dir: &Path) -> Result<bool> {
		let key = normalize_path(dir);
		if self.subscriptions.contains_key(&key) {
			return Ok(false);
		}

		let identity = dir_identity(dir);
		let (notify_tx, notify_rx) = mpsc::channel();
		let mut watcher = RecommendedWatcher::new(notify_tx, Config::default())?;
		watcher.watch(dir, RecursiveMode::NonRecursive)?;

		// notify reports the watched root as an absolute path
		let root = if dir.is_absolute() {
			dir.to_path_buf()
		} else {
			std::env::current_dir()?.join(dir)
		};
		let generation = self.next_generation;
		self.next_generation += 1;

		// notify delivers on a std channel, so drain it on a blocking thread
		let raw_tx = self.raw_tx.clone();
		let forwarded_dir = dir.to_path_buf();
		tokio::task::spawn_blocking(move || {
			forward_notify_events(notify_rx, raw_tx, root, forwarded_dir, generation)
		});

		info!("👀 Watching: {}", dir.display());
		self.subscriptions.insert(
			key,
			Subscription {
				dir: dir.to_path_buf(),
				identity,
				generation,
				_watcher: watcher,
			},
		);
		Ok(true)
	}

	fn is_subscribed(&self, dir: &Path) -> bool {
		self.subscriptions.contains_key(&normalize_path(dir))
			|| self.subscriptions.values().any(|sub| sub.dir == dir)
	}

	/// Drop the subscription for a removed source folder and watch for its return
	fn on_source_removed(&mut self, dir: &Path, generation: u64) {
		let key = self
			.subscriptions
			.iter()
			.find(|(_, sub)| sub.dir == dir && sub.generation == generation)
			.map(|(key, _)| key.clone());
		// A newer subscription for the same folder is left alone
		let Some(sub) = key.and_then(|key| self.subscriptions.remove(&key)) else {
			return;
		};
		debug!("Source folder removed: {}", sub.dir.display());
		self.mark_missing(sub.dir);
	}

	fn mark_missing(&mut self, dir: PathBuf) {
		let error = SorterError::SourceMissing { path: dir.clone() };
		warn!("⚠️  {}", error);
		self.report(ReportKind::SourceMissing { path: dir.clone() });
		if !self.missing.contains(&dir) {
			self.missing.push(dir);
		}
	}

	async fn run(
		mut self, mut commands: tokio_mpsc::UnboundedReceiver<Command>,
		mut raw: tokio_mpsc::UnboundedReceiver<RawEvent>,
	) {
		let mut ticker = tokio::time::interval(self.config.tick_interval);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

		info!("Event processing loop started");

		loop {
			tokio::select! {
				biased;

				command = commands.recv() => match command {
					Some(Command::Rescan(reply)) => {
						let queued = self.rescan_all().await;
						let _ = reply.send(queued);
					}
					Some(Command::Stop) | None => break,
				},
				_ = ticker.tick() => self.on_tick().await,
				Some(event) = raw.recv() => match event {
					RawEvent::Changed(path) => self.on_raw_event(path),
					RawEvent::SourceRemoved { dir, generation } => {
						self.on_source_removed(&dir, generation)
					}
				},
				_ = async {}, if !self.queue.is_empty() => self.process_next().await,
			}
		}

		info!("Shutting down watcher ({} file(s) still pending)", self.ingestor.pending_count());
		self.subscriptions.clear();
	}

	fn on_raw_event(&mut self, path: PathBuf) {
		if self.ingestor.is_ignored(&path) {
			debug!("Ignoring event for {:?}", path);
			return;
		}
		if self.debouncer.ingest(path.clone()) {
			debug!("Event burst started for {:?}", path);
		}
	}

	async fn on_tick(&mut self) {
		for path in self.debouncer.drain_settled() {
			self.enqueue(path);
		}

		let now = Instant::now();
		let due: Vec<PathBuf> = self
			.deferred
			.iter()
			.filter(|(_, at)| **at <= now)
			.map(|(path, _)| path.clone())
			.collect();
		for path in due {
			self.deferred.remove(&path);
			self.enqueue(path);
		}

		for path in self.ingestor.expire_pending(self.config.max_pending_age) {
			warn!("Giving up on {:?}: it never stopped changing", path);
			self.deferred.remove(&path);
		}

		if now.duration_since(self.last_source_check) >= self.config.source_recheck_interval {
			self.last_source_check = now;
			self.recheck_sources().await;
		}
	}

	/// Drop subscriptions whose folder vanished or was replaced, then pick up
	/// folders that appeared
	async fn recheck_sources(&mut self) {
		let gone: Vec<PathBuf> = self
			.subscriptions
			.iter()
			.filter(|(_, sub)| sub.is_stale())
			.map(|(key, _)| key.clone())
			.collect();
		for key in gone {
			if let Some(sub) = self.subscriptions.remove(&key) {
				self.mark_missing(sub.dir);
			}
		}

		let missing = std::mem::take(&mut self.missing);
		for dir in missing {
			if !dir.is_dir() {
				self.missing.push(dir);
				continue;
			}
			match self.subscribe(&dir) {
				Ok(true) => {
					info!("Source folder is now available: {}", dir.display());
					self.report(ReportKind::SourceAvailable { path: dir.clone() });
					self.scan_dir(&dir).await;
				}
				Ok(false) => debug!("{} is already watched", dir.display()),
				Err(e) => {
					warn!("Could not watch {:?} [{}]: {}", dir, e.category(), e);
					self.missing.push(dir);
				}
			}
		}
	}

	fn enqueue(&mut self, path: PathBuf) -> bool {
		if !self.queued.insert(path.clone()) {
			return false;
		}
		self.deferred.remove(&path);
		self.queue.push_back(path);
		true
	}

	async fn process_next(&mut self) {
		let Some(path) = self.queue.pop_front() else {
			return;
		};
		self.queued.remove(&path);

		let outcome = self.ingestor.process(&path).await;
		match outcome {
			ProcessingOutcome::SkippedNotStable => {
				let recheck = self.config.stability_interval.max(self.config.tick_interval);
				debug!("{:?} is not stable yet, checking again in {:?}", path, recheck);
				self.deferred.insert(path, Instant::now() + recheck);
			}
			ProcessingOutcome::SkippedSourceMissing => {
				debug!("{:?} disappeared before it could be processed", path);
			}
			outcome => self.report_outcome(path, outcome),
		}
	}

	/// Queue every regular file currently in `dir`. Returns how many were found.
	async fn scan_dir(&mut self, dir: &Path) -> Option<usize> {
		let mut entries = match tokio::fs::read_dir(dir).await {
			Ok(entries) => entries,
			Err(e) => {
				debug!("Cannot list {:?}: {}", dir, e);
				return None;
			}
		};

		let mut found = 0;
		loop {
			match entries.next_entry().await {
				Ok(Some(entry)) => {
					let is_file = entry
						.file_type()
						.await
						.map(|t| t.is_file())
						.unwrap_or(false);
					if is_file {
						found += 1;
						self.enqueue(entry.path());
					}
				}
				Ok(None) => break,
				Err(e) => {
					warn!("Error while listing {:?}: {}", dir, e);
					break;
				}
			}
		}
		Some(found)
	}

	async fn rescan_all(&mut self) -> usize {
		info!("Running manual scan on all watched folders...");
		let mut queued = 0;
		for dir in self.rules.source_dirs() {
			match self.scan_dir(&dir).await {
				Some(found) => queued += found,
				// Still watched, so the folder exists but cannot be listed
				None if self.is_subscribed(&dir) => {
					warn!("Could not list watched folder {}", dir.display());
				}
				None => self.mark_missing(dir),
			}
		}
		info!("Manual scan complete: {} file(s) queued", queued);
		self.report(ReportKind::RescanCompleted { queued });
		queued
	}

	fn report_outcome(&self, path: PathBuf, outcome: ProcessingOutcome) {
		match &outcome {
			ProcessingOutcome::Copied {
				destination, rule, ..
			} => {
				info!(
					"📦 COPIED: {} -> {} (rule #{})",
					path.display(),
					destination.display(),
					rule
				);
			}
			ProcessingOutcome::SkippedNoMatch => {
				info!("⏭️  UNMATCHED: {}", path.display());
			}
			ProcessingOutcome::FailedCopy { cause } => {
				warn!("❌ FAILED: {} - {}", path.display(), cause);
			}
			other => {
				debug!("{:?}: {}", other, path.display());
			}
		}
		self.report(ReportKind::Processed { path, outcome });
	}

	fn report(&self, kind: ReportKind) {
		let report = SortReport::new(kind);
		if let Ok(json) = report.to_json() {
			debug!("Report JSON: {}", json);
		}
		if self.reports.send(report).is_err() {
			debug!("Report receiver dropped");
		}
	}
}

fn forward_notify_events(
	notify_rx: mpsc::Receiver<notify::Result<Event>>, raw_tx: tokio_mpsc::UnboundedSender<RawEvent>,
	root: PathBuf, dir: PathBuf, generation: u64,
) {
	for result in notify_rx {
		match result {
			Ok(event) => {
				let event_type = EventType::from(event.kind);
				if event_type == EventType::Remove {
					if event.paths.iter().any(|path| *path == root) {
						let removed = RawEvent::SourceRemoved {
							dir: dir.clone(),
							generation,
						};
						if raw_tx.send(removed).is_err() {
							return;
						}
					}
					continue;
				}
				if !event_type.is_arrival() {
					continue;
				}
				for path in event.paths {
					if raw_tx.send(RawEvent::Changed(path)).is_err() {
						return;
					}
				}
			}
			Err(e) => {
				error!("Notify error: {}", e);
			}
		}
	}
}
