//! Core traits for the firewall sync system
//!
//! This module defines the abstract interfaces the engine is wired with.
//!
//! - [`FirewallProvider`]: List, revoke and authorize rules on one cloud resource
//! - [`IpResolver`]: Discover the current public IPv4 address
//! - [`SettingsStore`]: Persist the singleton settings record
//! - [`AuditLog`]: Append-only operator-facing audit trail

pub mod audit_log;
pub mod firewall_provider;
pub mod ip_resolver;
pub mod settings_store;

pub use audit_log::{AuditEntry, AuditLevel, AuditLog, LogPage};
pub use firewall_provider::{FirewallProvider, FirewallProviderFactory};
pub use ip_resolver::{IpResolver, ResolvedIp};
pub use settings_store::SettingsStore;
