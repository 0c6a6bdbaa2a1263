//! Key resolution from configuration

use super::{AccountKey, KeyResolver, KeyRole, ResolutionError};
use crate::config::NetworkKeys;
use std::collections::HashMap;

/// Resolves well-known keys from the `[keys.<network>]` config tables
#[derive(Debug, Clone, Default)]
pub struct ConfigKeyResolver {
    networks: HashMap<String, NetworkKeys>,
}

impl ConfigKeyResolver {
    pub fn new(networks: HashMap<String, NetworkKeys>) -> Self {
        Self { networks }
    }
}

impl KeyResolver for ConfigKeyResolver {
    fn resolve(&self, network: &str, role: KeyRole) -> Result<AccountKey, ResolutionError> {
        let keys = self.networks.get(network);
        let key = match role {
            KeyRole::Mapping => keys.and_then(|k| k.mapping),
            KeyRole::Program => keys.and_then(|k| k.program),
        };
        key.ok_or_else(|| ResolutionError::NotFound {
            network: network.to_string(),
            role,
        })
    }
}
