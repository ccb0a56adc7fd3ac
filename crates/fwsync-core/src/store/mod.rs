// # Store Implementations
//
// This module provides implementations of the SettingsStore and AuditLog
// traits for different persistence strategies.

pub mod file;
pub mod jsonl;
pub mod memory;

pub use file::FileSettingsStore;
pub use jsonl::FileAuditLog;
pub use memory::{MemoryAuditLog, MemorySettingsStore};
