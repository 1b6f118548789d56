//! Multi-file configuration loading.
//!
//! A root file may list other files under `include`. Every top-level section
//! (including `stores`) has to come from exactly one file; the merged document
//! is then parsed and validated like a single file.

use crate::{resolve_env_vars, Config, ConfigError};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Loads a configuration file together with the files it includes.
pub struct ConfigLoader {
	/// Directory relative includes are resolved against.
	base_dir: PathBuf,
	/// Canonical paths already read, for cycle detection.
	visited: HashSet<PathBuf>,
	/// Section name to the file that defined it.
	owners: HashMap<String, PathBuf>,
}

impl ConfigLoader {
	pub fn new(base_dir: impl AsRef<Path>) -> Self {
		Self {
			base_dir: base_dir.as_ref().to_path_buf(),
			visited: HashSet::new(),
			owners: HashMap::new(),
		}
	}

	/// Loads, merges and validates the configuration rooted at `path`.
	pub async fn load_config(&mut self, path: impl AsRef<Path>) -> Result<Config, ConfigError> {
		let root_path = self.locate(path)?;
		let root_text = self.read(&root_path).await?;
		let mut root: toml::Value = toml::from_str(&root_text)?;

		let includes = Self::includes_of(&root)?;
		if includes.is_empty() {
			return root_text.parse();
		}

		let table = root
			.as_table_mut()
			.ok_or_else(|| ConfigError::Parse("Configuration root must be a table".into()))?;
		table.remove("include");
		for section in table.keys() {
			self.owners.insert(section.clone(), root_path.clone());
		}

		for include in includes {
			let include_path = self.locate(&include)?;
			let text = self.read(&include_path).await?;
			let fragment: toml::Table = toml::from_str(&text)?;

			for (section, value) in fragment {
				if let Some(owner) = self.owners.get(&section) {
					return Err(ConfigError::Validation(format!(
						"Duplicate section '{}' found in {} and {}. \
						Each top-level section must be defined in one file only.",
						section,
						owner.display(),
						include_path.display()
					)));
				}
				self.owners.insert(section.clone(), include_path.clone());
				table.insert(section, value);
			}
		}

		let merged = toml::to_string(&*table).map_err(|e| {
			ConfigError::Parse(format!("Failed to serialize combined config: {}", e))
		})?;
		merged.parse()
	}

	/// Reads a file once, resolving environment variables.
	async fn read(&mut self, path: &Path) -> Result<String, ConfigError> {
		let canonical = path.canonicalize().map_err(|e| {
			ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Cannot resolve path {}: {}", path.display(), e),
			))
		})?;

		if !self.visited.insert(canonical.clone()) {
			return Err(ConfigError::Validation(format!(
				"Circular include detected: {} was already loaded",
				canonical.display()
			)));
		}

		let content = tokio::fs::read_to_string(path).await?;
		resolve_env_vars(&content)
	}

	/// Accepts `include = "a.toml"` or `include = ["a.toml", "b.toml"]`.
	fn includes_of(root: &toml::Value) -> Result<Vec<PathBuf>, ConfigError> {
		match root.get("include") {
			None => Ok(Vec::new()),
			Some(toml::Value::String(path)) => Ok(vec![PathBuf::from(path)]),
			Some(toml::Value::Array(items)) => items
				.iter()
				.map(|item| {
					item.as_str().map(PathBuf::from).ok_or_else(|| {
						ConfigError::Validation("Include array must contain only strings".into())
					})
				})
				.collect(),
			Some(_) => Err(ConfigError::Validation(
				"Include must be a string or array of strings".into(),
			)),
		}
	}

	fn locate(&self, path: impl AsRef<Path>) -> Result<PathBuf, ConfigError> {
		let path = path.as_ref();
		let resolved = if path.is_absolute() {
			path.to_path_buf()
		} else {
			self.base_dir.join(path)
		};

		if !resolved.exists() {
			return Err(ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Configuration file not found: {}", resolved.display()),
			)));
		}
		Ok(resolved)
	}
}
