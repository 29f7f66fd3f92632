//! Lock-file [`InstanceLock`] visible to independent processes on one machine.
//!
//! Each lock file carries the holder's owner token. While the lock is held a heartbeat task
//! keeps the file's modification time fresh, so only files whose holder stopped beating (a
//! crashed process) ever look stale. Contenders reclaim a stale file by renaming it to a
//! unique tombstone first; a rename that raced with a new holder is undone.

// std
use std::{
	fs::{self, File, OpenOptions},
	io::{self, ErrorKind, Write},
	path::{Path, PathBuf},
	sync::Weak,
	time::SystemTime,
};
// crates.io
use tokio::task::JoinHandle;
// self
use crate::{
	_prelude::*,
	clock,
	config::ClientConfig,
	lock::{InstanceLock, LockFuture},
};

type HeldFiles = Arc<Mutex<HashMap<String, HeldFile>>>;

/// Mutual exclusion through `create_new` lock files in a shared directory.
///
/// A lock file whose modification time is older than the stale age belongs to a holder that
/// stopped refreshing it and is reclaimed by the next contender. Size the stale age with
/// [`FileLock::for_config`] so it outlasts the heartbeat gaps of a loaded machine.
#[derive(Clone, Debug)]
pub struct FileLock {
	dir: PathBuf,
	poll_interval: Duration,
	stale_after: Duration,
	held: HeldFiles,
}
impl FileLock {
	/// Slack added on top of a renewal's own deadlines by [`Self::stale_after_for`].
	pub const STALE_MARGIN: Duration = Duration::seconds(30);

	const DEFAULT_POLL_INTERVAL: Duration = Duration::milliseconds(50);
	// Default authorize timeout + default fetch timeout + margin.
	const DEFAULT_STALE_AFTER: Duration = Duration::seconds(100);
	const MIN_HEARTBEAT: std::time::Duration = std::time::Duration::from_millis(10);

	/// Uses (and creates) `dir` for lock files.
	pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
		let dir = dir.into();

		fs::create_dir_all(&dir).map_err(|e| Error::Lock {
			message: format!("Failed to create lock directory {}: {e}", dir.display()),
		})?;

		Ok(Self {
			dir,
			poll_interval: Self::DEFAULT_POLL_INTERVAL,
			stale_after: Self::DEFAULT_STALE_AFTER,
			held: Default::default(),
		})
	}

	/// Stale age that outlasts one renewal under `config`.
	///
	/// A renewal holds the lock for at most the authorize deadline plus the token fetch
	/// deadline; [`Self::STALE_MARGIN`] is added on top.
	pub fn stale_after_for(config: &ClientConfig) -> Duration {
		config
			.authorize_timeout
			.saturating_add(config.fetch_timeout)
			.saturating_add(Self::STALE_MARGIN)
	}

	/// Sizes the stale age for renewals under `config`.
	pub fn for_config(self, config: &ClientConfig) -> Self {
		self.with_stale_after(Self::stale_after_for(config))
	}

	/// Overrides how often a contended lock is re-checked.
	pub fn with_poll_interval(mut self, interval: Duration) -> Self {
		self.poll_interval = interval;

		self
	}

	/// Overrides the age after which an abandoned lock file is reclaimed.
	pub fn with_stale_after(mut self, age: Duration) -> Self {
		self.stale_after = age;

		self
	}

	fn path_for(&self, name: &str) -> PathBuf {
		let file_name = name
			.chars()
			.map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
			.collect::<String>();

		self.dir.join(format!("{file_name}.lock"))
	}

	fn heartbeat_interval(&self) -> std::time::Duration {
		(clock::to_std(self.stale_after) / 4).max(Self::MIN_HEARTBEAT)
	}

	fn try_create(&self, path: &Path, token: &str) -> Result<bool> {
		match OpenOptions::new().write(true).create_new(true).open(path) {
			Ok(mut file) => {
				if let Err(e) = file.write_all(token.as_bytes()).and_then(|()| file.sync_all()) {
					remove_quietly(path);

					return Err(Error::Lock {
						message: format!("Failed to record the owner of {}: {e}", path.display()),
					});
				}

				Ok(true)
			},
			Err(e) if e.kind() == ErrorKind::AlreadyExists => {
				if let Err(e) = self.reclaim_if_stale(path) {
					#[cfg(feature = "tracing")]
					tracing::warn!(path = %path.display(), error = %e, "Failed to reclaim a stale lock file.");
					#[cfg(not(feature = "tracing"))]
					let _ = e;
				}

				Ok(false)
			},
			Err(e) => Err(Error::Lock {
				message: format!("Failed to create lock file {}: {e}", path.display()),
			}),
		}
	}

	fn reclaim_if_stale(&self, path: &Path) -> io::Result<()> {
		if !self.is_stale(path)? {
			return Ok(());
		}

		let Some(observed) = read_owner(path)? else {
			return Ok(());
		};
		let tombstone = path.with_extension(format!("lock.{:016x}.stale", rand::random::<u64>()));

		match fs::rename(path, &tombstone) {
			Ok(()) => {},
			Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
			Err(e) => return Err(e),
		}

		// The file may have been replaced between the staleness check and the rename.
		let abandoned =
			read_owner(&tombstone)?.is_some_and(|owner| owner == observed) && self.is_stale(&tombstone)?;

		if !abandoned {
			match fs::hard_link(&tombstone, path) {
				Ok(()) => {},
				Err(e) if e.kind() == ErrorKind::AlreadyExists => {
					#[cfg(feature = "tracing")]
					tracing::warn!(
						path = %path.display(),
						"Lock file was replaced while a live one was being restored."
					);
				},
				Err(e) => return Err(e),
			}
		}

		fs::remove_file(&tombstone)
	}

	fn is_stale(&self, path: &Path) -> io::Result<bool> {
		let modified = match fs::metadata(path).and_then(|metadata| metadata.modified()) {
			Ok(modified) => modified,
			Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
			Err(e) => return Err(e),
		};

		// A modification time in the future counts as fresh.
		Ok(modified.elapsed().is_ok_and(|age| age > clock::to_std(self.stale_after)))
	}

	fn start_holding(&self, name: &str, path: PathBuf, token: String) {
		let heartbeat = tokio::spawn(heartbeat(
			Arc::downgrade(&self.held),
			path,
			token.clone(),
			self.heartbeat_interval(),
		));

		if let Some(previous) = self.held.lock().insert(name.to_owned(), HeldFile { token, heartbeat })
		{
			previous.heartbeat.abort();
		}
	}
}
impl InstanceLock for FileLock {
	fn acquire<'a>(&'a self, name: &'a str, timeout: Duration) -> LockFuture<'a, bool> {
		Box::pin(async move {
			let path = self.path_for(name);
			let token = owner_token();
			let budget = clock::to_std(timeout);
			let started = tokio::time::Instant::now();

			loop {
				if self.try_create(&path, &token)? {
					self.start_holding(name, path, token);

					return Ok(true);
				}

				let waited = started.elapsed();

				if waited >= budget {
					return Ok(false);
				}

				tokio::time::sleep(clock::to_std(self.poll_interval).min(budget - waited)).await;
			}
		})
	}

	fn release<'a>(&'a self, name: &'a str) -> LockFuture<'a, ()> {
		Box::pin(async move {
			let Some(held) = self.held.lock().remove(name) else {
				return Ok(());
			};

			held.heartbeat.abort();

			let path = self.path_for(name);

			match read_owner(&path) {
				Ok(Some(owner)) if owner == held.token => {},
				Ok(_) => {
					#[cfg(feature = "tracing")]
					tracing::warn!(lock = name, "Lock file changed owner before release; leaving it.");

					return Ok(());
				},
				Err(e) =>
					return Err(Error::Lock {
						message: format!("Failed to read lock file {}: {e}", path.display()),
					}),
			}

			match fs::remove_file(&path) {
				Ok(()) => Ok(()),
				Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
				Err(e) => Err(Error::Lock {
					message: format!("Failed to remove lock file {}: {e}", path.display()),
				}),
			}
		})
	}
}

#[derive(Debug)]
struct HeldFile {
	token: String,
	heartbeat: JoinHandle<()>,
}

fn owner_token() -> String {
	format!("{}-{:016x}", std::process::id(), rand::random::<u64>())
}

fn read_owner(path: &Path) -> io::Result<Option<String>> {
	match fs::read_to_string(path) {
		Ok(content) => Ok(Some(content.trim().to_owned())),
		Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
		Err(e) => Err(e),
	}
}

fn remove_quietly(path: &Path) {
	if let Err(e) = fs::remove_file(path) {
		#[cfg(feature = "tracing")]
		tracing::warn!(path = %path.display(), error = %e, "Failed to remove a half-written lock file.");
		#[cfg(not(feature = "tracing"))]
		let _ = e;
	}
}

// Keeps the file fresh while it still names `token` and the owning lock is alive.
async fn heartbeat(
	held: Weak<Mutex<HashMap<String, HeldFile>>>,
	path: PathBuf,
	token: String,
	every: std::time::Duration,
) {
	let mut ticker = tokio::time::interval(every);

	ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
	ticker.tick().await;

	loop {
		ticker.tick().await;

		if held.strong_count() == 0 {
			return;
		}

		match touch_if_owned(&path, &token) {
			Ok(true) => {},
			Ok(false) => {
				#[cfg(feature = "tracing")]
				tracing::warn!(path = %path.display(), "Held lock file disappeared or changed owner.");

				return;
			},
			Err(e) => {
				#[cfg(feature = "tracing")]
				tracing::warn!(path = %path.display(), error = %e, "Failed to refresh a held lock file.");
				#[cfg(not(feature = "tracing"))]
				let _ = e;
			},
		}
	}
}

fn touch_if_owned(path: &Path, token: &str) -> io::Result<bool> {
	if read_owner(path)?.as_deref() != Some(token) {
		return Ok(false);
	}

	File::options().write(true).open(path)?.set_modified(SystemTime::now())?;

	Ok(true)
}
