//! Known networks and the contracts deployed on them.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use alloy::primitives::{address, Address};
use serde::Serialize;
use tokenvault_error::Result;
use tokenvault_provider::{AddChainParameter, HttpProvider, NativeCurrency, ProviderError};

use crate::config::ClientConfig;

/// Ethereum mainnet
pub const MAINNET_CHAIN_ID: u64 = 1;
/// Sepolia testnet, the default network
pub const SEPOLIA_CHAIN_ID: u64 = 11155111;
/// Holesky testnet
pub const HOLESKY_CHAIN_ID: u64 = 17000;
/// Local Anvil / Hardhat node
pub const ANVIL_CHAIN_ID: u64 = 31337;

/// Circle's USDC on Sepolia
pub const SEPOLIA_USDC: Address = address!("1c7d4b196cb0c7b01d743fbc6116a902379c7238");
/// TokenVault deployment on Sepolia
pub const SEPOLIA_VAULT: Address = address!("8b6d4c6ea5ee1c1f0f3a0c7a2b7f2b8f4e6d2a10");
/// First contract deployed by the default Anvil account
pub const ANVIL_VAULT: Address = address!("5fbdb2315678afecb367f032d93f642f64180aa3");
/// Second contract deployed by the default Anvil account
pub const ANVIL_USDC: Address = address!("e7f1725e7734ce288f8367e1bb143e90bb3f0512");

/// Definition of an EVM network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainDescriptor {
    /// EIP-155 chain id
    pub chain_id: u64,
    /// Display name
    pub name: String,
    /// Native currency name
    pub native_currency_name: String,
    /// Native currency ticker
    pub native_currency_symbol: String,
    /// Block explorer
    pub explorer_url: Option<String>,
    /// Whether the vault UI operates on this network
    pub is_supported: bool,
    /// Public JSON-RPC endpoints
    pub rpc_urls: Vec<String>,
}

impl ChainDescriptor {
    fn known(
        chain_id: u64,
        name: &str,
        explorer_url: Option<&str>,
        is_supported: bool,
        rpc_urls: &[&str],
    ) -> Self {
        Self {
            chain_id,
            name: name.to_string(),
            native_currency_name: "Ether".to_string(),
            native_currency_symbol: "ETH".to_string(),
            explorer_url: explorer_url.map(str::to_string),
            is_supported,
            rpc_urls: rpc_urls.iter().map(|u| u.to_string()).collect(),
        }
    }

    /// Placeholder for a chain the registry does not know
    pub fn unknown(chain_id: u64) -> Self {
        Self {
            chain_id,
            name: format!("Unknown network ({chain_id})"),
            native_currency_name: "Ether".to_string(),
            native_currency_symbol: "ETH".to_string(),
            explorer_url: None,
            is_supported: false,
            rpc_urls: Vec::new(),
        }
    }

    /// `wallet_addEthereumChain` parameter describing this chain
    pub fn add_chain_parameter(&self) -> AddChainParameter {
        AddChainParameter {
            chain_id: format!("{:#x}", self.chain_id),
            chain_name: self.name.clone(),
            native_currency: NativeCurrency {
                name: self.native_currency_name.clone(),
                symbol: self.native_currency_symbol.clone(),
                decimals: 18,
            },
            rpc_urls: self.rpc_urls.clone(),
            block_explorer_urls: self.explorer_url.iter().cloned().collect(),
        }
    }

    /// Read-only JSON-RPC provider over the public endpoints
    pub fn read_provider(&self, timeout: Duration) -> Result<HttpProvider> {
        HttpProvider::new(&self.rpc_urls, timeout).map_err(ProviderError::into_read_error)
    }

    /// Explorer link for a transaction
    pub fn explorer_tx_url(&self, hash: &str) -> Option<String> {
        self.explorer_url.as_ref().map(|base| format!("{}/tx/{hash}", base.trim_end_matches('/')))
    }
}

/// Contracts deployed on one chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractAddressSet {
    /// Vault contract
    pub vault: Address,
    /// Supported tokens by symbol
    pub supported_tokens: BTreeMap<String, Address>,
}

impl ContractAddressSet {
    /// New set with no tokens
    pub fn new(vault: Address) -> Self {
        Self { vault, supported_tokens: BTreeMap::new() }
    }

    /// Adds a supported token
    pub fn with_token(mut self, symbol: &str, address: Address) -> Self {
        self.supported_tokens.insert(symbol.to_string(), address);
        self
    }

    /// Looks up a token by symbol, ignoring case
    pub fn token(&self, symbol: &str) -> Option<Address> {
        self.supported_tokens
            .iter()
            .find(|(s, _)| s.eq_ignore_ascii_case(symbol))
            .map(|(_, a)| *a)
    }

    /// Every supported token address
    pub fn token_addresses(&self) -> Vec<Address> {
        self.supported_tokens.values().copied().collect()
    }
}

static NO_CONTRACTS: ContractAddressSet =
    ContractAddressSet { vault: Address::ZERO, supported_tokens: BTreeMap::new() };

/// Registry of networks and contract deployments.
#[derive(Debug, Clone)]
pub struct ChainRegistry {
    chains: BTreeMap<u64, ChainDescriptor>,
    contracts: HashMap<u64, ContractAddressSet>,
    default_chain_id: u64,
}

impl Default for ChainRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainRegistry {
    /// The built-in networks and deployments
    pub fn new() -> Self {
        let chains = [
            ChainDescriptor::known(
                SEPOLIA_CHAIN_ID,
                "Sepolia",
                Some("https://sepolia.etherscan.io"),
                true,
                &["https://rpc.sepolia.org", "https://ethereum-sepolia-rpc.publicnode.com"],
            ),
            ChainDescriptor::known(
                HOLESKY_CHAIN_ID,
                "Holesky",
                Some("https://holesky.etherscan.io"),
                true,
                &["https://ethereum-holesky-rpc.publicnode.com"],
            ),
            ChainDescriptor::known(ANVIL_CHAIN_ID, "Localhost", None, true, &["http://127.0.0.1:8545"]),
            ChainDescriptor::known(
                MAINNET_CHAIN_ID,
                "Ethereum",
                Some("https://etherscan.io"),
                false,
                &["https://eth.llamarpc.com"],
            ),
        ];

        let contracts = HashMap::from([
            (SEPOLIA_CHAIN_ID, ContractAddressSet::new(SEPOLIA_VAULT).with_token("USDC", SEPOLIA_USDC)),
            (ANVIL_CHAIN_ID, ContractAddressSet::new(ANVIL_VAULT).with_token("USDC", ANVIL_USDC)),
        ]);

        Self {
            chains: chains.into_iter().map(|c| (c.chain_id, c)).collect(),
            contracts,
            default_chain_id: SEPOLIA_CHAIN_ID,
        }
    }

    /// Built-in registry with configured overrides applied
    pub fn from_config(config: &ClientConfig) -> Self {
        let mut registry = Self::new();
        registry.default_chain_id = config.default_chain_id;
        for (chain_id, overrides) in &config.contracts {
            let mut set = registry.contracts_for(*chain_id).clone();
            if let Some(vault) = overrides.vault {
                set.vault = vault;
            }
            set.supported_tokens.extend(overrides.tokens.iter().map(|(s, a)| (s.clone(), *a)));
            registry.contracts.insert(*chain_id, set);
        }
        registry
    }

    /// Adds or replaces a network
    pub fn with_chain(mut self, chain: ChainDescriptor) -> Self {
        self.chains.insert(chain.chain_id, chain);
        self
    }

    /// Adds or replaces the deployment on a network
    pub fn with_contracts(mut self, chain_id: u64, contracts: ContractAddressSet) -> Self {
        self.contracts.insert(chain_id, contracts);
        self
    }

    /// Looks up a known network
    pub fn get(&self, chain_id: u64) -> Option<&ChainDescriptor> {
        self.chains.get(&chain_id)
    }

    /// Known network, or an unsupported placeholder
    pub fn describe(&self, chain_id: u64) -> ChainDescriptor {
        self.get(chain_id).cloned().unwrap_or_else(|| ChainDescriptor::unknown(chain_id))
    }

    /// Whether the network is known and supported
    pub fn is_supported(&self, chain_id: u64) -> bool {
        self.get(chain_id).is_some_and(|c| c.is_supported)
    }

    /// Deployment on `chain_id`, falling back to the Sepolia deployment
    pub fn contracts_for(&self, chain_id: u64) -> &ContractAddressSet {
        self.contracts
            .get(&chain_id)
            .or_else(|| self.contracts.get(&SEPOLIA_CHAIN_ID))
            .unwrap_or(&NO_CONTRACTS)
    }

    /// Supported networks, by chain id
    pub fn supported(&self) -> Vec<&ChainDescriptor> {
        self.chains.values().filter(|c| c.is_supported).collect()
    }

    /// The configured default network
    pub fn default_chain_id(&self) -> u64 {
        self.default_chain_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContractOverride;

    #[test]
    fn test_builtin_chains() {
        let registry = ChainRegistry::new();
        let sepolia = registry.get(SEPOLIA_CHAIN_ID).unwrap();
        assert_eq!(sepolia.name, "Sepolia");
        assert!(sepolia.is_supported);
        assert!(registry.is_supported(ANVIL_CHAIN_ID));
        assert!(registry.is_supported(HOLESKY_CHAIN_ID));
        assert!(!registry.is_supported(MAINNET_CHAIN_ID));
        assert!(registry.get(MAINNET_CHAIN_ID).is_some());
    }

    #[test]
    fn test_unknown_chain() {
        let registry = ChainRegistry::new();
        assert!(registry.get(999_999).is_none());
        let described = registry.describe(999_999);
        assert_eq!(described.chain_id, 999_999);
        assert!(!described.is_supported);
        assert!(!registry.is_supported(999_999));
    }

    #[test]
    fn test_contracts_fall_back_to_sepolia() {
        let registry = ChainRegistry::new();
        assert_eq!(registry.contracts_for(999_999), registry.contracts_for(SEPOLIA_CHAIN_ID));
        assert_eq!(registry.contracts_for(ANVIL_CHAIN_ID).vault, ANVIL_VAULT);
        assert_eq!(registry.contracts_for(SEPOLIA_CHAIN_ID).token("usdc"), Some(SEPOLIA_USDC));
    }

    #[test]
    fn test_supported_list() {
        let registry = ChainRegistry::new();
        let ids: Vec<u64> = registry.supported().iter().map(|c| c.chain_id).collect();
        assert_eq!(ids, vec![HOLESKY_CHAIN_ID, ANVIL_CHAIN_ID, SEPOLIA_CHAIN_ID]);
    }

    #[test]
    fn test_add_chain_parameter() {
        let registry = ChainRegistry::new();
        let param = registry.get(SEPOLIA_CHAIN_ID).unwrap().add_chain_parameter();
        assert_eq!(param.chain_id, "0xaa36a7");
        assert_eq!(param.native_currency.decimals, 18);
        assert_eq!(param.block_explorer_urls, vec!["https://sepolia.etherscan.io".to_string()]);
    }

    #[test]
    fn test_explorer_tx_url() {
        let registry = ChainRegistry::new();
        let url = registry.describe(SEPOLIA_CHAIN_ID).explorer_tx_url("0xabc").unwrap();
        assert_eq!(url, "https://sepolia.etherscan.io/tx/0xabc");
        assert!(registry.describe(ANVIL_CHAIN_ID).explorer_tx_url("0xabc").is_none());
    }

    #[test]
    fn test_read_provider() {
        let registry = ChainRegistry::new();
        assert!(registry.describe(SEPOLIA_CHAIN_ID).read_provider(Duration::from_secs(5)).is_ok());
        assert!(registry.describe(999_999).read_provider(Duration::from_secs(5)).is_err());
    }

    #[test]
    fn test_from_config_overrides() {
        let vault = address!("1111111111111111111111111111111111111111");
        let token = address!("2222222222222222222222222222222222222222");
        let mut config = ClientConfig { default_chain_id: ANVIL_CHAIN_ID, ..Default::default() };
        config.contracts.insert(
            SEPOLIA_CHAIN_ID,
            ContractOverride { vault: Some(vault), tokens: BTreeMap::from([("DAI".to_string(), token)]) },
        );

        let registry = ChainRegistry::from_config(&config);
        assert_eq!(registry.default_chain_id(), ANVIL_CHAIN_ID);
        let sepolia = registry.contracts_for(SEPOLIA_CHAIN_ID);
        assert_eq!(sepolia.vault, vault);
        assert_eq!(sepolia.token("DAI"), Some(token));
        assert_eq!(sepolia.token("USDC"), Some(SEPOLIA_USDC));
    }

    #[test]
    fn test_with_chain_and_contracts() {
        let vault = address!("3333333333333333333333333333333333333333");
        let registry = ChainRegistry::new()
            .with_chain(ChainDescriptor { is_supported: true, ..ChainDescriptor::unknown(8453) })
            .with_contracts(8453, ContractAddressSet::new(vault));
        assert!(registry.is_supported(8453));
        assert_eq!(registry.contracts_for(8453).vault, vault);
    }
}
