//! # Provisor Config
//!
//! Typed deployment configuration and its validation rules.
//!
//! Every run starts here: the engine refuses to plan (let alone execute)
//! until the configuration has passed validation, so a bad leverage value or
//! a duplicate token symbol can never cost a single backend call.

mod loader;

pub use loader::{load_config, ConfigError};

use serde::Deserialize;

/// Basis points per 1x of leverage.
const LEVERAGE_BASIS_POINTS: u64 = 10_000;

/// Top-level deployment configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DeployConfig {
    pub project: ProjectConfig,
    pub tokens: TokensConfig,
    pub settings: SettingsConfig,
    pub network: NetworkConfig,
    #[serde(default)]
    pub supported_tokens: Vec<SupportedToken>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// The four role tokens the deployment provisions.
#[derive(Debug, Clone, Deserialize)]
pub struct TokensConfig {
    pub governance: TokenSpec,
    pub liquidity: TokenSpec,
    pub escrowed: TokenSpec,
    pub bonus: TokenSpec,
}

impl TokensConfig {
    /// Role tokens in declaration order.
    pub fn roles(&self) -> [(&'static str, &TokenSpec); 4] {
        [
            ("governance", &self.governance),
            ("liquidity", &self.liquidity),
            ("escrowed", &self.escrowed),
            ("bonus", &self.bonus),
        ]
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenSpec {
    pub name: String,
    pub symbol: String,
    #[serde(default)]
    pub initial_supply: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SettingsConfig {
    /// Maximum leverage multiple; validated to 1..=2000.
    pub max_leverage: u64,
    /// Vesting duration in seconds.
    #[serde(default = "default_vesting_duration")]
    pub vesting_duration: u64,
    /// Cooldown for liquidity-pool withdrawals, in seconds.
    #[serde(default = "default_cooldown")]
    pub glp_cooldown_duration: u64,
    #[serde(default)]
    pub fees: FeesConfig,
}

impl SettingsConfig {
    /// Leverage expressed the way the vault expects it.
    pub fn max_leverage_basis_points(&self) -> u64 {
        self.max_leverage * LEVERAGE_BASIS_POINTS
    }
}

fn default_vesting_duration() -> u64 {
    365 * 24 * 60 * 60
}

fn default_cooldown() -> u64 {
    15 * 60
}

/// Fee parameters, all in basis points unless noted.
#[derive(Debug, Clone, Deserialize)]
pub struct FeesConfig {
    #[serde(default = "default_tax_bp")]
    pub tax_basis_points: u32,
    #[serde(default = "default_stable_tax_bp")]
    pub stable_tax_basis_points: u32,
    #[serde(default = "default_mint_burn_bp")]
    pub mint_burn_fee_basis_points: u32,
    #[serde(default = "default_swap_bp")]
    pub swap_fee_basis_points: u32,
    #[serde(default = "default_stable_swap_bp")]
    pub stable_swap_fee_basis_points: u32,
    #[serde(default = "default_margin_bp")]
    pub margin_fee_basis_points: u32,
    /// Seconds before profit is counted, not basis points.
    #[serde(default)]
    pub min_profit_time: u64,
    #[serde(default)]
    pub has_dynamic_fees: bool,
}

impl Default for FeesConfig {
    fn default() -> Self {
        Self {
            tax_basis_points: default_tax_bp(),
            stable_tax_basis_points: default_stable_tax_bp(),
            mint_burn_fee_basis_points: default_mint_burn_bp(),
            swap_fee_basis_points: default_swap_bp(),
            stable_swap_fee_basis_points: default_stable_swap_bp(),
            margin_fee_basis_points: default_margin_bp(),
            min_profit_time: 0,
            has_dynamic_fees: false,
        }
    }
}

fn default_tax_bp() -> u32 {
    50
}

fn default_stable_tax_bp() -> u32 {
    20
}

fn default_mint_burn_bp() -> u32 {
    30
}

fn default_swap_bp() -> u32 {
    30
}

fn default_stable_swap_bp() -> u32 {
    4
}

fn default_margin_bp() -> u32 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub name: String,
    pub native_token: NativeToken,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NativeToken {
    pub symbol: String,
    pub address: String,
}

/// An auxiliary token the deployed system will support.
#[derive(Debug, Clone, Deserialize)]
pub struct SupportedToken {
    pub symbol: String,
    pub address: String,
    pub price_feed: String,
}

impl DeployConfig {
    /// Validate every rule that must hold before any step executes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.project.name.trim().is_empty() {
            return Err(ConfigError::MissingField("project.name".to_string()));
        }
        if self.network.name.trim().is_empty() {
            return Err(ConfigError::MissingField("network.name".to_string()));
        }
        if self.network.chain_id == 0 {
            return Err(ConfigError::Invalid(
                "network.chain_id must be non-zero".to_string(),
            ));
        }

        if !(1..=2000).contains(&self.settings.max_leverage) {
            return Err(ConfigError::LeverageOutOfRange(self.settings.max_leverage));
        }

        let mut seen = std::collections::HashSet::new();
        for (role, token) in self.tokens.roles() {
            if token.name.trim().is_empty() || token.symbol.trim().is_empty() {
                return Err(ConfigError::MissingField(format!(
                    "tokens.{role}.name/symbol"
                )));
            }
            if !seen.insert(token.symbol.clone()) {
                return Err(ConfigError::DuplicateSymbol(token.symbol.clone()));
            }
        }

        validate_address("network.native_token.address", &self.network.native_token.address)?;

        let mut aux_seen = std::collections::HashSet::new();
        for token in &self.supported_tokens {
            if !aux_seen.insert(token.symbol.clone()) {
                return Err(ConfigError::DuplicateSymbol(token.symbol.clone()));
            }
            validate_address(&format!("supported_tokens.{}.address", token.symbol), &token.address)?;
            validate_address(
                &format!("supported_tokens.{}.price_feed", token.symbol),
                &token.price_feed,
            )?;
        }

        Ok(())
    }
}

impl DeployConfig {
    /// The example configuration shipped with the repository.
    ///
    /// Matches `configs/deploy.example.yaml`; also used as a fixture by tests
    /// across the workspace.
    pub fn example() -> Self {
        let token = |name: &str, symbol: &str| TokenSpec {
            name: name.to_string(),
            symbol: symbol.to_string(),
            initial_supply: 0,
        };
        Self {
            project: ProjectConfig {
                name: "Example Exchange".to_string(),
                description: "Example perpetual exchange deployment".to_string(),
            },
            tokens: TokensConfig {
                governance: token("Example Governance", "EXG"),
                liquidity: token("Example Liquidity", "EXL"),
                escrowed: token("Escrowed Example", "esEXG"),
                bonus: token("Bonus Example", "bnEXG"),
            },
            settings: SettingsConfig {
                max_leverage: 50,
                vesting_duration: default_vesting_duration(),
                glp_cooldown_duration: default_cooldown(),
                fees: FeesConfig::default(),
            },
            network: NetworkConfig {
                chain_id: 42161,
                name: "arbitrum".to_string(),
                native_token: NativeToken {
                    symbol: "ETH".to_string(),
                    address: "0x82aF49447D8a07e3bd95BD0d56f35241523fBab1".to_string(),
                },
            },
            supported_tokens: vec![SupportedToken {
                symbol: "USDC".to_string(),
                address: "0xaf88d065e77c8cC2239327C5EDb3A432268e5831".to_string(),
                price_feed: "0x50834F3163758fcC1Df9973b6e91f0F0F0434aD3".to_string(),
            }],
        }
    }
}

/// Check the `0x` + 40 hex digit address form.
pub fn is_address(value: &str) -> bool {
    let Some(hex_part) = value.strip_prefix("0x") else {
        return false;
    };
    hex_part.len() == 40 && hex_part.chars().all(|c| c.is_ascii_hexdigit())
}

fn validate_address(field: &str, value: &str) -> Result<(), ConfigError> {
    if is_address(value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidAddress {
            field: field.to_string(),
            value: value.to_string(),
        })
    }
}
