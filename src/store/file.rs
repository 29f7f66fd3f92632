//! Durable JSON-file [`CacheStore`] that independent processes can share.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	store::{CacheStore, StoreError, StoreFuture},
};

/// Persists the whole key space to one JSON object after each mutation.
///
/// Every operation re-reads the file so writes made by other processes become visible, and
/// replacements go through a temporary file plus rename so readers never see a torn
/// snapshot. Read-modify-write cycles are serialized within a process only; cross-process
/// mutation ordering is left to the renewal lock.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	guard: Arc<Mutex<()>>,
}
impl FileStore {
	/// Opens (or creates the parent directory for) a store at the provided path.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		ensure_parent_exists(&path)?;
		// Fail fast on an unreadable snapshot.
		load_snapshot(&path)?;

		Ok(Self { path, guard: Default::default() })
	}

	/// Location of the backing file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn read<T>(&self, f: impl FnOnce(&BTreeMap<String, String>) -> T) -> Result<T, StoreError> {
		let _guard = self.guard.lock();
		let snapshot = load_snapshot(&self.path)?;

		Ok(f(&snapshot))
	}

	fn mutate(&self, f: impl FnOnce(&mut BTreeMap<String, String>) -> bool) -> Result<(), StoreError> {
		let _guard = self.guard.lock();
		let mut snapshot = load_snapshot(&self.path)?;

		if f(&mut snapshot) {
			persist(&self.path, &snapshot)?;
		}

		Ok(())
	}
}
impl CacheStore for FileStore {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		Box::pin(async move { self.read(|snapshot| snapshot.get(key).cloned()) })
	}

	fn set<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.mutate(|snapshot| {
				snapshot.insert(key.to_owned(), value);

				true
			})
		})
	}

	fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		Box::pin(async move { self.mutate(|snapshot| snapshot.remove(key).is_some()) })
	}

	fn all_keys(&self) -> StoreFuture<'_, Vec<String>> {
		Box::pin(async move { self.read(|snapshot| snapshot.keys().cloned().collect()) })
	}
}

fn load_snapshot(path: &Path) -> Result<BTreeMap<String, String>, StoreError> {
	if !path.exists() {
		return Ok(BTreeMap::new());
	}

	let bytes = fs::read(path).map_err(|e| StoreError::Backend {
		message: format!("Failed to read {}: {e}", path.display()),
	})?;

	if bytes.is_empty() {
		return Ok(BTreeMap::new());
	}

	serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
		message: format!("Failed to parse {}: {e}", path.display()),
	})
}

fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
	if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
		fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
			message: format!("Failed to create store directory {}: {e}", parent.display()),
		})?;
	}

	Ok(())
}

fn persist(path: &Path, snapshot: &BTreeMap<String, String>) -> Result<(), StoreError> {
	ensure_parent_exists(path)?;

	let serialized = serde_json::to_vec_pretty(snapshot).map_err(|e| StoreError::Serialization {
		message: format!("Failed to serialize store snapshot: {e}"),
	})?;
	let mut tmp_path = path.to_path_buf();

	tmp_path.set_extension(format!("{}.tmp", std::process::id()));

	{
		let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
			message: format!("Failed to create {}: {e}", tmp_path.display()),
		})?;

		file.write_all(&serialized).map_err(|e| StoreError::Backend {
			message: format!("Failed to write {}: {e}", tmp_path.display()),
		})?;
		file.sync_all().map_err(|e| StoreError::Backend {
			message: format!("Failed to sync {}: {e}", tmp_path.display()),
		})?;
	}

	fs::rename(&tmp_path, path).map_err(|e| StoreError::Backend {
		message: format!("Failed to replace {}: {e}", path.display()),
	})
}
