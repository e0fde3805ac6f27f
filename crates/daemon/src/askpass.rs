// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Askpass token tables.
//!
//! A token is minted per launch, handed to the child through its
//! environment, and presented back over the IPC socket to retrieve a secret
//! (tunnels) or to announce a wrapper (companions). Tokens are single-purpose:
//! every mint is paired with an unregister on every exit path of the owner.

use std::collections::HashMap;

use overseer_core::TokenRegistrar;
use parking_lot::Mutex;
use uuid::Uuid;

/// Mint an opaque 32-byte (64 hex character) token.
pub fn mint_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

/// Process-wide `token → alias` maps for tunnels and companions.
#[derive(Default)]
pub struct TokenTables {
    tunnels: Mutex<HashMap<String, String>>,
    companions: Mutex<HashMap<String, String>>,
}

impl TokenTables {
    pub fn new() -> Self {
        Self::default()
    }

    // === Tunnel tokens (askpass) ===

    pub fn register_tunnel(&self, token: &str, alias: &str) {
        self.tunnels.lock().insert(token.to_string(), alias.to_string());
    }

    pub fn unregister_tunnel(&self, token: &str) {
        self.tunnels.lock().remove(token);
    }

    /// Validate an `ASKPASS alias token` pair without consuming the entry;
    /// the token stays valid for the lifetime of the run (SSH may re-prompt).
    pub fn tunnel_token_matches(&self, token: &str, alias: &str) -> bool {
        self.tunnels.lock().get(token).is_some_and(|a| a == alias)
    }

    /// Drop any tokens still registered for `alias` (stale-entry cleanup).
    pub fn remove_tunnel_tokens_for(&self, alias: &str) {
        self.tunnels.lock().retain(|_, a| a != alias);
    }

    // === Companion tokens (wrapper announcements) ===

    /// Validate a `COMPANION_INIT alias name token` triple. The table maps
    /// token → alias; the entry is consumed on first use.
    pub fn consume_companion(&self, token: &str, alias: &str) -> bool {
        let mut companions = self.companions.lock();
        match companions.get(token) {
            Some(a) if a == alias => {
                companions.remove(token);
                true
            }
            _ => false,
        }
    }

    #[cfg(test)]
    fn counts(&self) -> (usize, usize) {
        (self.tunnels.lock().len(), self.companions.lock().len())
    }
}

impl TokenRegistrar for TokenTables {
    fn register(&self, token: &str, alias: &str) {
        self.companions.lock().insert(token.to_string(), alias.to_string());
    }

    fn unregister(&self, token: &str) {
        self.companions.lock().remove(token);
    }
}

#[cfg(test)]
#[path = "askpass_tests.rs"]
mod tests;
