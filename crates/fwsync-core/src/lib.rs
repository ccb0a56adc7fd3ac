// # fwsync-core
//
// Core library for keeping cloud firewall rules pinned to a dynamic public IP.
//
// ## Architecture Overview
//
// This library provides the reconciliation engine and its seams:
// - **IpResolver**: Trait for discovering the current public IPv4 address
// - **FirewallProvider**: Trait for listing, revoking and authorizing rules
// - **SettingsStore**: Trait for the persisted settings record
// - **AuditLog**: Trait for the operator-facing audit trail
// - **Reconciler**: Core engine that converges live rules to the desired IP
// - **ProviderRegistry**: Plugin-based registry for firewall providers
// - **Scheduler**: Fixed-interval trigger for the Reconciler
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Decision logic lives here; wire protocols live
//    in provider crates
// 2. **Best-Effort Convergence**: Each port and provider is independent; a
//    failure skips one unit of work, never the whole run
// 3. **Plugin-Based**: Providers are registered by kind, no hard-coded if-else
// 4. **Library-First**: All core functionality can be used as a library
// 5. **Single-Flight**: At most one run at a time; extra triggers are dropped

pub mod config;
pub mod engine;
pub mod error;
pub mod normalize;
pub mod registry;
pub mod rules;
pub mod scheduler;
pub mod store;
pub mod traits;

// Re-export core types for convenience
pub use config::{ClientOptions, ProviderCredentials, ProviderKind, Settings};
pub use engine::{PortState, Reconciler, RunOutcome, RunReport};
pub use error::{Error, Result};
pub use registry::ProviderRegistry;
pub use rules::{Direction, MatchSemantics, RuleSpec};
pub use scheduler::Scheduler;
pub use store::{FileAuditLog, FileSettingsStore, MemoryAuditLog, MemorySettingsStore};
pub use traits::{AuditLevel, AuditLog, FirewallProvider, IpResolver, SettingsStore};
