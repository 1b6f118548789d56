//! Registry trait for self-registering implementations.

/// Base trait for implementation registries.
///
/// Each pluggable backend (storage, settlement) ships a `Registry` struct that
/// names itself as it appears in configuration and hands out its factory, so
/// the builder can wire implementations by name.
pub trait ImplementationRegistry {
	/// The key used in TOML, e.g. `"memory"` for `storage.implementations.memory`.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	fn factory() -> Self::Factory;
}
