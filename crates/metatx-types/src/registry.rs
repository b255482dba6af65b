//! Registry trait for self-registering implementations.
//!
//! Account, replay protection and forwarder implementations each provide a
//! `Registry` struct implementing this trait, so configuration can refer to
//! them by name.

/// Base trait for implementation registries.
pub trait ImplementationRegistry {
	/// The name used in configuration files to reference this implementation.
	///
	/// For example `"local"` for `[account.implementations.local]` or
	/// `"multi_nonce"` for `[replay_protection.implementations.multi_nonce]`.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Get the factory function for this implementation.
	fn factory() -> Self::Factory;
}
