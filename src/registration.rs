//! Per-module provider registry.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::DuplicatePolicy;
use crate::descriptors::ProviderDescriptor;
use crate::error::{DiError, DiResult};
use crate::lifetime::Lifetime;
use crate::token::Token;

/// Registered provider plus the lifetime it resolves with.
///
/// `lifetime` starts as the declared lifetime and may be promoted to
/// `Request` by graph validation.
#[derive(Debug, Clone)]
pub(crate) struct RegistryEntry {
    pub(crate) descriptor: Arc<ProviderDescriptor>,
    pub(crate) lifetime: Lifetime,
}

/// Provider descriptors declared by one module.
///
/// Purely declarative: instances live in the container's caches. Within one
/// module a token maps to exactly one descriptor.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    module: String,
    entries: HashMap<Token, RegistryEntry>,
    // registration order, for deterministic bootstrap and hook order
    order: Vec<Token>,
}

impl ProviderRegistry {
    pub(crate) fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Stores `descriptor` under its token.
    ///
    /// Re-registering a token replaces the earlier descriptor and logs a
    /// warning, or fails with `DuplicateProvider` under the strict policy.
    pub fn register(&mut self, descriptor: ProviderDescriptor, policy: DuplicatePolicy) -> DiResult<()> {
        let token = descriptor.token.clone();
        if self.entries.contains_key(&token) {
            match policy {
                DuplicatePolicy::Error => {
                    return Err(DiError::DuplicateProvider {
                        token: token.to_string(),
                        module: self.module.clone(),
                    });
                }
                DuplicatePolicy::Warn => {
                    tracing::warn!(
                        module = %self.module,
                        token = %token,
                        "provider registered twice, last registration wins"
                    );
                }
            }
        } else {
            self.order.push(token.clone());
        }

        let lifetime = descriptor.lifetime;
        self.entries.insert(
            token,
            RegistryEntry {
                descriptor: Arc::new(descriptor),
                lifetime,
            },
        );
        Ok(())
    }

    /// Registers `descriptor` unless the token is already present.
    ///
    /// Used for enhancer classes referenced by controllers, which must not
    /// override an explicit provider.
    pub(crate) fn register_if_absent(&mut self, descriptor: ProviderDescriptor) -> bool {
        if self.entries.contains_key(&descriptor.token) {
            return false;
        }
        // cannot fail: the token is new
        let _ = self.register(descriptor, DuplicatePolicy::Warn);
        true
    }

    /// Looks up the descriptor for `token`.
    pub fn resolve_descriptor(&self, token: &Token) -> DiResult<&ProviderDescriptor> {
        self.entries
            .get(token)
            .map(|e| &*e.descriptor)
            .ok_or_else(|| DiError::not_found(token, &self.module))
    }

    pub(crate) fn entry(&self, token: &Token) -> Option<&RegistryEntry> {
        self.entries.get(token)
    }

    pub(crate) fn promote(&mut self, token: &Token, lifetime: Lifetime) {
        if let Some(entry) = self.entries.get_mut(token) {
            entry.lifetime = lifetime;
        }
    }

    /// True when `token` is registered here.
    pub fn contains(&self, token: &Token) -> bool {
        self.entries.contains_key(token)
    }

    /// Effective lifetime of `token`, after scope promotion.
    pub fn lifetime_of(&self, token: &Token) -> Option<Lifetime> {
        self.entries.get(token).map(|e| e.lifetime)
    }

    /// Registered tokens in registration order.
    pub fn tokens(&self) -> impl Iterator<Item = &Token> {
        self.order.iter()
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = (&Token, &RegistryEntry)> {
        self.order
            .iter()
            .filter_map(move |t| self.entries.get(t).map(|e| (t, e)))
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
