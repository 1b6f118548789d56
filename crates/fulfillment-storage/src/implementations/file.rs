//! File-based storage backend.
//!
//! Each record is one file at `<storage_path>/<namespace>/<id>.bin`, prefixed
//! with a fixed 64-byte header carrying the expiry time. Writes go to a
//! temporary file that is renamed over the target.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use fulfillment_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, StorageKey, ValidationError,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

fn unix_now() -> u64 {
	chrono::Utc::now().timestamp().max(0) as u64
}

/// Record header.
///
/// Layout (64 bytes, little-endian):
/// - `[0..4]` magic `FFST`
/// - `[4..6]` format version
/// - `[6..14]` expiry as Unix seconds, 0 for never
/// - `[14..64]` zero padding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileHeader {
	version: u16,
	expires_at: u64,
}

impl FileHeader {
	const MAGIC: &'static [u8; 4] = b"FFST";
	const VERSION: u16 = 1;
	const SIZE: usize = 64;

	fn with_ttl(ttl: Duration) -> Self {
		let expires_at = if ttl.is_zero() {
			0
		} else {
			unix_now().saturating_add(ttl.as_secs().max(1))
		};
		Self {
			version: Self::VERSION,
			expires_at,
		}
	}

	fn encode(&self) -> [u8; Self::SIZE] {
		let mut bytes = [0u8; Self::SIZE];
		bytes[0..4].copy_from_slice(Self::MAGIC);
		bytes[4..6].copy_from_slice(&self.version.to_le_bytes());
		bytes[6..14].copy_from_slice(&self.expires_at.to_le_bytes());
		bytes
	}

	fn decode(bytes: &[u8]) -> Result<Self, StorageError> {
		if bytes.len() < Self::SIZE {
			return Err(StorageError::Backend("File too small for header".into()));
		}
		if &bytes[0..4] != Self::MAGIC {
			return Err(StorageError::Backend("Unrecognized file format".into()));
		}

		let version = u16::from_le_bytes([bytes[4], bytes[5]]);
		if version > Self::VERSION {
			return Err(StorageError::Backend(format!(
				"Unsupported file version: {}",
				version
			)));
		}

		let mut expires = [0u8; 8];
		expires.copy_from_slice(&bytes[6..14]);
		Ok(Self {
			version,
			expires_at: u64::from_le_bytes(expires),
		})
	}

	fn is_expired(&self, now: u64) -> bool {
		self.expires_at != 0 && now >= self.expires_at
	}
}

/// Default TTL per namespace, configured as `ttl_<namespace>` seconds.
#[derive(Debug, Clone, Default)]
pub struct TtlConfig {
	ttls: HashMap<StorageKey, Duration>,
}

impl TtlConfig {
	fn from_config(config: &toml::Value) -> Self {
		let ttls = StorageKey::all()
			.filter_map(|key| {
				config
					.get(format!("ttl_{}", key.as_str()))
					.and_then(|v| v.as_integer())
					.map(|secs| (key, Duration::from_secs(secs.max(0) as u64)))
			})
			.collect();
		Self { ttls }
	}

	fn for_key(&self, key: &str) -> Duration {
		key.split(':')
			.next()
			.and_then(|ns| ns.parse::<StorageKey>().ok())
			.and_then(|ns| self.ttls.get(&ns).copied())
			.unwrap_or(Duration::ZERO)
	}
}

/// Escapes characters that are unsafe in a single path component.
fn escape_component(raw: &str) -> String {
	let mut out = String::with_capacity(raw.len());
	for c in raw.chars() {
		match c {
			'%' => out.push_str("%25"),
			'/' => out.push_str("%2F"),
			'\\' => out.push_str("%5C"),
			'.' => out.push_str("%2E"),
			':' => out.push_str("%3A"),
			c => out.push(c),
		}
	}
	out
}

fn unescape_component(escaped: &str) -> String {
	escaped
		.replace("%3A", ":")
		.replace("%2E", ".")
		.replace("%5C", "\\")
		.replace("%2F", "/")
		.replace("%25", "%")
}

pub struct FileStorage {
	base_path: PathBuf,
	ttl_config: TtlConfig,
}

impl FileStorage {
	pub fn new(base_path: PathBuf, ttl_config: TtlConfig) -> Self {
		Self {
			base_path,
			ttl_config,
		}
	}

	/// `"orders:o-1"` maps to `<base>/orders/o-1.bin`; keys without a
	/// namespace live directly under the base directory.
	fn path_for(&self, key: &str) -> PathBuf {
		match key.split_once(':') {
			Some((namespace, id)) => self
				.base_path
				.join(escape_component(namespace))
				.join(format!("{}.bin", escape_component(id))),
			None => self.base_path.join(format!("{}.bin", escape_component(key))),
		}
	}

	/// Reads a record file, treating expired records as absent.
	async fn read_live(path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
		let data = match fs::read(path).await {
			Ok(data) => data,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		let header = FileHeader::decode(&data)?;
		if header.is_expired(unix_now()) {
			return Ok(None);
		}
		Ok(Some(data[FileHeader::SIZE..].to_vec()))
	}

	/// Record files in `dir` as `(file stem, path)` pairs.
	async fn record_files(dir: &Path) -> Result<Vec<(String, PathBuf)>, StorageError> {
		let mut entries = match fs::read_dir(dir).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		let mut files = Vec::new();
		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?
		{
			let path = entry.path();
			if path.extension() != Some(std::ffi::OsStr::new("bin")) {
				continue;
			}
			if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
				files.push((stem.to_string(), path.clone()));
			}
		}
		Ok(files)
	}

	/// Namespace directories under the base path, with their decoded names.
	async fn namespaces(&self) -> Result<Vec<(String, PathBuf)>, StorageError> {
		let mut entries = match fs::read_dir(&self.base_path).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		let mut dirs = Vec::new();
		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?
		{
			let is_dir = entry
				.file_type()
				.await
				.map(|t| t.is_dir())
				.unwrap_or(false);
			if let (true, Some(name)) = (is_dir, entry.file_name().to_str()) {
				dirs.push((unescape_component(name), entry.path()));
			}
		}
		Ok(dirs)
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		Self::read_live(&self.path_for(key))
			.await?
			.ok_or(StorageError::NotFound)
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let path = self.path_for(key);
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)
				.await
				.map_err(|e| StorageError::Backend(e.to_string()))?;
		}

		let ttl = ttl.unwrap_or_else(|| self.ttl_config.for_key(key));
		let mut contents = Vec::with_capacity(FileHeader::SIZE + value.len());
		contents.extend_from_slice(&FileHeader::with_ttl(ttl).encode());
		contents.extend_from_slice(&value);

		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, contents)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		fs::rename(&temp_path, &path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		match fs::remove_file(self.path_for(key)).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		Ok(Self::read_live(&self.path_for(key)).await?.is_some())
	}

	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
		let mut keys = Vec::new();

		for (stem, path) in Self::record_files(&self.base_path).await? {
			let key = unescape_component(&stem);
			if key.starts_with(prefix) && Self::read_live(&path).await?.is_some() {
				keys.push(key);
			}
		}

		for (namespace, dir) in self.namespaces().await? {
			let ns_prefix = format!("{}:", namespace);
			// Skip namespaces that cannot contain a match
			if !ns_prefix.starts_with(prefix) && !prefix.starts_with(&ns_prefix) {
				continue;
			}
			for (stem, path) in Self::record_files(&dir).await? {
				let key = format!("{}{}", ns_prefix, unescape_component(&stem));
				if key.starts_with(prefix) && Self::read_live(&path).await?.is_some() {
					keys.push(key);
				}
			}
		}

		Ok(keys)
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}

	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		let now = unix_now();
		let mut files = Self::record_files(&self.base_path).await?;
		for (_, dir) in self.namespaces().await? {
			files.extend(Self::record_files(&dir).await?);
		}

		let mut removed = 0;
		for (_, path) in files {
			let data = match fs::read(&path).await {
				Ok(data) => data,
				Err(e) => {
					tracing::debug!(component = "storage", "Skipping {:?}: {}", path, e);
					continue;
				},
			};
			let expired = FileHeader::decode(&data)
				.map(|header| header.is_expired(now))
				.unwrap_or(false);
			if !expired {
				continue;
			}
			match fs::remove_file(&path).await {
				Ok(()) => removed += 1,
				Err(e) => {
					tracing::warn!(component = "storage", "Failed to remove expired file {:?}: {}", path, e)
				},
			}
		}
		Ok(removed)
	}
}

/// Accepts `storage_path` and one `ttl_<namespace>` per storage namespace.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let mut optional = vec![Field::new("storage_path", FieldType::String)];
		optional.extend(StorageKey::all().map(|key| {
			Field::new(
				format!("ttl_{}", key.as_str()),
				FieldType::Integer {
					min: Some(0),
					max: None,
				},
			)
		}));
		Schema::new(vec![], optional).validate(config)
	}
}

/// Creates a file backend.
///
/// - `storage_path`: base directory (default `./data/storage`)
/// - `ttl_<namespace>`: default TTL in seconds for records in that namespace
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/storage");

	Ok(Box::new(FileStorage::new(
		PathBuf::from(storage_path),
		TtlConfig::from_config(config),
	)))
}

/// Registry for the file storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	fn storage(dir: &TempDir) -> FileStorage {
		FileStorage::new(dir.path().to_path_buf(), TtlConfig::default())
	}

	#[tokio::test]
	async fn test_set_get_delete() {
		let dir = TempDir::new().unwrap();
		let storage = storage(&dir);

		storage
			.set_bytes("orders:o-1", b"payload".to_vec(), None)
			.await
			.unwrap();
		assert!(dir.path().join("orders").join("o-1.bin").exists());
		assert_eq!(
			storage.get_bytes("orders:o-1").await.unwrap(),
			b"payload".to_vec()
		);

		storage.delete("orders:o-1").await.unwrap();
		assert!(matches!(
			storage.get_bytes("orders:o-1").await,
			Err(StorageError::NotFound)
		));
		assert!(!storage.exists("orders:o-1").await.unwrap());
	}

	#[tokio::test]
	async fn test_list_keys_round_trips_escaped_ids() {
		let dir = TempDir::new().unwrap();
		let storage = storage(&dir);

		for key in ["orders:a/b", "orders:x.y", "payments:p1", "loose"] {
			storage.set_bytes(key, vec![0], None).await.unwrap();
		}

		let mut keys = storage.list_keys("orders:").await.unwrap();
		keys.sort();
		assert_eq!(keys, vec!["orders:a/b", "orders:x.y"]);

		let mut everything = storage.list_keys("").await.unwrap();
		everything.sort();
		assert_eq!(
			everything,
			vec!["loose", "orders:a/b", "orders:x.y", "payments:p1"]
		);
	}

	#[tokio::test]
	async fn test_expired_records_are_hidden_and_cleaned() {
		let dir = TempDir::new().unwrap();
		let storage = storage(&dir);
		storage
			.set_bytes("invoices:live", vec![1], None)
			.await
			.unwrap();

		// Write an already-expired record by hand
		let expired = FileHeader {
			version: FileHeader::VERSION,
			expires_at: 1,
		};
		let mut contents = expired.encode().to_vec();
		contents.push(2);
		let path = storage.path_for("invoices:old");
		std::fs::write(&path, contents).unwrap();

		assert!(matches!(
			storage.get_bytes("invoices:old").await,
			Err(StorageError::NotFound)
		));
		assert_eq!(
			storage.list_keys("invoices:").await.unwrap(),
			vec!["invoices:live"]
		);

		assert_eq!(storage.cleanup_expired().await.unwrap(), 1);
		assert!(!path.exists());
		assert!(storage.exists("invoices:live").await.unwrap());
	}

	#[test]
	fn test_header_encoding() {
		let header = FileHeader {
			version: 1,
			expires_at: 1_700_000_000,
		};
		let bytes = header.encode();
		assert_eq!(&bytes[0..4], b"FFST");
		assert_eq!(FileHeader::decode(&bytes).unwrap(), header);
		assert!(FileHeader::decode(b"short").is_err());
	}

	#[test]
	fn test_ttl_config_by_namespace() {
		let config: toml::Value = toml::from_str("ttl_invoices = 60").unwrap();
		let ttls = TtlConfig::from_config(&config);
		assert_eq!(ttls.for_key("invoices:INV_1"), Duration::from_secs(60));
		assert_eq!(ttls.for_key("orders:o-1"), Duration::ZERO);
	}

	#[test]
	fn test_factory_rejects_bad_ttl() {
		let config: toml::Value = toml::from_str("ttl_orders = -5").unwrap();
		assert!(matches!(
			create_storage(&config),
			Err(StorageError::Configuration(_))
		));
	}
}
