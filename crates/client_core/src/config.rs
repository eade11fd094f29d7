use std::{collections::HashMap, fmt, fs, io::ErrorKind, str::FromStr, time::Duration};

use anyhow::{anyhow, bail, Context};
use serde::{Deserialize, Serialize};
use shared::{
    domain::{Address, ChainId, Wei},
    protocol::RegistryBindings,
};
use url::Url;

use crate::error::ClientError;

pub const DEFAULT_CONFIG_PATH: &str = "zombies.toml";

/// 0.001 ether.
pub const DEFAULT_LEVEL_UP_FEE_WEI: u64 = 1_000_000_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnumerationStrategy {
    Native,
    Probing,
}

impl FromStr for EnumerationStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" => Ok(Self::Native),
            "probing" => Ok(Self::Probing),
            other => Err(anyhow!("unknown enumeration strategy '{other}'")),
        }
    }
}

impl fmt::Display for EnumerationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => f.write_str("native"),
            Self::Probing => f.write_str("probing"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub rpc_url: String,
    pub fallback_chain_id: String,
    pub probe_max_attempts: u64,
    pub zombie_enumeration: EnumerationStrategy,
    pub kitty_enumeration: EnumerationStrategy,
    pub level_up_fee_wei: u64,
    pub gas_limit: u64,
    pub call_timeout_secs: Option<u64>,
    pub networks: HashMap<String, RegistryBindings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:7545".into(),
            fallback_chain_id: "5777".into(),
            probe_max_attempts: 10,
            zombie_enumeration: EnumerationStrategy::Native,
            kitty_enumeration: EnumerationStrategy::Probing,
            level_up_fee_wei: DEFAULT_LEVEL_UP_FEE_WEI,
            gas_limit: 300_000,
            call_timeout_secs: None,
            networks: HashMap::new(),
        }
    }
}

impl Settings {
    pub fn rpc_url(&self) -> Result<Url, ClientError> {
        Url::parse(&self.rpc_url).map_err(|err| ClientError::InvalidRpcUrl {
            url: self.rpc_url.clone(),
            cause: err.to_string(),
        })
    }

    pub fn level_up_fee(&self) -> Wei {
        Wei(u128::from(self.level_up_fee_wei))
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_secs.map(Duration::from_secs)
    }

    pub fn bindings_for(&self, chain: &ChainId) -> Result<RegistryBindings, ClientError> {
        self.networks
            .get(&chain.0)
            .or_else(|| self.networks.get(&self.fallback_chain_id))
            .cloned()
            .ok_or_else(|| ClientError::NotDeployed {
                chain: chain.clone(),
            })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.rpc_url()?;
        if self.probe_max_attempts == 0 {
            bail!("probe_max_attempts must be at least 1");
        }
        for (chain, bindings) in &self.networks {
            for contract in [&bindings.zombie, &bindings.kitty] {
                Address::parse(contract.as_str()).with_context(|| {
                    format!("invalid contract address for network {chain}")
                })?;
            }
        }
        Ok(())
    }
}

pub fn parse_settings(raw: &str) -> anyhow::Result<Settings> {
    toml::from_str(raw).context("failed to parse settings")
}

pub fn load_settings() -> anyhow::Result<Settings> {
    let path = std::env::var("APP__CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let mut settings = match fs::read_to_string(&path) {
        Ok(raw) => parse_settings(&raw).with_context(|| format!("in config file '{path}'"))?,
        Err(err) if err.kind() == ErrorKind::NotFound => Settings::default(),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read config file '{path}'"))
        }
    };

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok())?;
    settings.validate()?;
    Ok(settings)
}

pub fn apply_env_overrides(
    settings: &mut Settings,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    if let Some(v) = lookup("LEDGER_RPC_URL") {
        settings.rpc_url = v;
    }
    if let Some(v) = lookup("APP__RPC_URL") {
        settings.rpc_url = v;
    }

    if let Some(v) = lookup("APP__FALLBACK_CHAIN_ID") {
        settings.fallback_chain_id = v;
    }

    if let Some(v) = lookup("APP__PROBE_MAX_ATTEMPTS") {
        settings.probe_max_attempts = v
            .parse()
            .with_context(|| format!("APP__PROBE_MAX_ATTEMPTS is not a number: {v}"))?;
    }

    if let Some(v) = lookup("APP__ZOMBIE_ENUMERATION") {
        settings.zombie_enumeration = v.parse()?;
    }
    if let Some(v) = lookup("APP__KITTY_ENUMERATION") {
        settings.kitty_enumeration = v.parse()?;
    }

    if let Some(v) = lookup("APP__LEVEL_UP_FEE_WEI") {
        settings.level_up_fee_wei = v
            .parse()
            .with_context(|| format!("APP__LEVEL_UP_FEE_WEI is not a number: {v}"))?;
    }

    if let Some(v) = lookup("APP__GAS_LIMIT") {
        settings.gas_limit = v
            .parse()
            .with_context(|| format!("APP__GAS_LIMIT is not a number: {v}"))?;
    }

    if let Some(v) = lookup("APP__CALL_TIMEOUT_SECS") {
        settings.call_timeout_secs = Some(
            v.parse()
                .with_context(|| format!("APP__CALL_TIMEOUT_SECS is not a number: {v}"))?,
        );
    }

    Ok(())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
