//! Shared UI icons.
//!
//! Each icon falls back to a plain-text marker on terminals without emoji.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[!]");

// Participant outcomes
pub static SELECTED: Emoji<'_, '_> = Emoji("☑️  ", "[+]");
pub static INVITE: Emoji<'_, '_> = Emoji("✉️  ", "[INV]");
pub static MEMBER: Emoji<'_, '_> = Emoji("👥 ", "[=]");
pub static SKIPPED: Emoji<'_, '_> = Emoji("⏭️  ", "[-]");

// Flow indicators
pub static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[?]");
pub static RETRY: Emoji<'_, '_> = Emoji("🔄 ", "[RETRY]");
pub static OPERATOR: Emoji<'_, '_> = Emoji("✋ ", "[YOU]");
pub static SAVED: Emoji<'_, '_> = Emoji("💾 ", "[SAVED]");
