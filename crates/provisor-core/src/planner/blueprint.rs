//! The built-in deployment blueprint.
//!
//! Declares every resource and step of a full exchange deployment as a
//! function of the validated configuration: role tokens, the trading core,
//! the staking lattice, and the capability wiring that ties them together.
//! The PlanBuilder turns this declaration into a validated Plan; nothing
//! here performs side effects.

use provisor_config::DeployConfig;

use crate::types::{Address, ArgValue, GrantRole, Resource, ResourceId};

use super::{PhaseSpec, PlanSpec, StepSpec};

/// Maximum allowed deviation between primary and secondary prices,
/// denominated in the price feed's 30-decimal fixed point (0.5 units).
const MAX_STRICT_PRICE_DEVIATION: &str = "500000000000000000000000000000";

/// Number of historical samples the price feed aggregates.
const PRICE_SAMPLE_SPACE: u64 = 3;

fn refer(id: &str) -> ArgValue {
    ArgValue::ResourceRef(ResourceId::from(id))
}

fn text(value: impl Into<String>) -> ArgValue {
    ArgValue::Str(value.into())
}

/// Declare the full deployment for a validated configuration.
pub fn declare(config: &DeployConfig) -> PlanSpec {
    let native = Address::from(config.network.native_token.address.as_str());

    PlanSpec {
        resources: declare_resources(config, &native),
        phases: vec![
            token_phase(),
            core_phase(config),
            staking_phase(&native),
            wiring_phase(),
        ],
    }
}

fn declare_resources(config: &DeployConfig, native: &Address) -> Vec<Resource> {
    let tokens = &config.tokens;
    let settings = &config.settings;
    let gov = &tokens.governance.symbol;
    let liq = &tokens.liquidity.symbol;
    let native_arg = ArgValue::Address(native.clone());

    let mut resources = vec![
        Resource::new("governanceToken", "GovernanceToken").with_constructor_args(vec![
            text(&tokens.governance.name),
            text(gov),
        ]),
        Resource::new("liquidityToken", "LiquidityToken").with_constructor_args(vec![
            text(&tokens.liquidity.name),
            text(liq),
        ]),
        Resource::new("escrowedToken", "EscrowedToken").with_constructor_args(vec![
            text(&tokens.escrowed.name),
            text(&tokens.escrowed.symbol),
        ]),
        Resource::new("bonusToken", "MintableBaseToken").with_constructor_args(vec![
            text(&tokens.bonus.name),
            text(&tokens.bonus.symbol),
            ArgValue::Uint(tokens.bonus.initial_supply),
        ]),
        Resource::new("vault", "Vault"),
        Resource::new("usdg", "Usdg").with_constructor_args(vec![refer("vault")]),
        Resource::new("router", "Router").with_constructor_args(vec![
            refer("vault"),
            refer("usdg"),
            native_arg.clone(),
        ]),
        Resource::new("priceFeed", "VaultPriceFeed"),
        Resource::new("shortsTracker", "ShortsTracker")
            .with_constructor_args(vec![refer("vault")]),
        Resource::new("liquidityManager", "LiquidityManager").with_constructor_args(vec![
            refer("vault"),
            refer("usdg"),
            refer("liquidityToken"),
            refer("shortsTracker"),
            ArgValue::Uint(settings.glp_cooldown_duration),
        ]),
        Resource::new("vaultUtils", "VaultUtils").with_constructor_args(vec![refer("vault")]),
    ];

    let tracker = |id: &str, name: String, symbol: String| {
        Resource::new(id, "RewardTracker").with_constructor_args(vec![text(name), text(symbol)])
    };
    let distributor = |id: &str, kind: &str, reward: ArgValue, tracker_id: &str| {
        Resource::new(id, kind).with_constructor_args(vec![reward, refer(tracker_id)])
    };

    resources.extend([
        tracker("stakedTracker", format!("Staked {gov}"), format!("s{gov}")),
        distributor(
            "stakedDistributor",
            "RewardDistributor",
            refer("escrowedToken"),
            "stakedTracker",
        ),
        tracker(
            "bonusTracker",
            format!("Staked + Bonus {gov}"),
            format!("sb{gov}"),
        ),
        distributor(
            "bonusDistributor",
            "BonusDistributor",
            refer("bonusToken"),
            "bonusTracker",
        ),
        tracker(
            "feeTracker",
            format!("Staked + Bonus + Fee {gov}"),
            format!("sbf{gov}"),
        ),
        distributor(
            "feeDistributor",
            "RewardDistributor",
            native_arg.clone(),
            "feeTracker",
        ),
        tracker(
            "feeLiquidityTracker",
            format!("Fee {liq}"),
            format!("f{liq}"),
        ),
        distributor(
            "feeLiquidityDistributor",
            "RewardDistributor",
            native_arg,
            "feeLiquidityTracker",
        ),
        tracker(
            "stakedLiquidityTracker",
            format!("Fee + Staked {liq}"),
            format!("fs{liq}"),
        ),
        distributor(
            "stakedLiquidityDistributor",
            "RewardDistributor",
            refer("escrowedToken"),
            "stakedLiquidityTracker",
        ),
        Resource::new("governanceVester", "Vester").with_constructor_args(vec![
            text(format!("Vested {gov}")),
            text(format!("v{gov}")),
            ArgValue::Uint(settings.vesting_duration),
            refer("escrowedToken"),
            refer("feeTracker"),
            refer("governanceToken"),
            refer("stakedTracker"),
        ]),
        Resource::new("liquidityVester", "Vester").with_constructor_args(vec![
            text(format!("Vested {liq}")),
            text(format!("v{liq}")),
            ArgValue::Uint(settings.vesting_duration),
            refer("escrowedToken"),
            refer("stakedLiquidityTracker"),
            refer("governanceToken"),
            refer("stakedLiquidityTracker"),
        ]),
        Resource::new("rewardRouter", "RewardRouter"),
    ]);

    resources
}

/// Phase 1: role tokens, plus locking transfers down to handler-mediated
/// movement before anything else can touch them.
fn token_phase() -> PhaseSpec {
    let private = |id: &str| {
        StepSpec::configure(id, "setInPrivateTransferMode", vec![ArgValue::Bool(true)])
    };
    PhaseSpec::new(
        "tokens",
        vec![
            StepSpec::provision("governanceToken"),
            StepSpec::provision("liquidityToken"),
            StepSpec::provision("escrowedToken"),
            StepSpec::provision("bonusToken"),
            private("governanceToken"),
            private("liquidityToken"),
            private("escrowedToken"),
        ],
    )
}

/// Phase 2: the trading core and its parameterization.
fn core_phase(config: &DeployConfig) -> PhaseSpec {
    PhaseSpec::new(
        "core",
        vec![
            StepSpec::provision("vault"),
            StepSpec::provision("usdg"),
            StepSpec::provision("router"),
            StepSpec::provision("priceFeed"),
            StepSpec::provision("shortsTracker"),
            StepSpec::provision("liquidityManager"),
            StepSpec::provision("vaultUtils"),
            StepSpec::configure(
                "priceFeed",
                "setMaxStrictPriceDeviation",
                vec![text(MAX_STRICT_PRICE_DEVIATION)],
            ),
            StepSpec::configure(
                "priceFeed",
                "setPriceSampleSpace",
                vec![ArgValue::Uint(PRICE_SAMPLE_SPACE)],
            ),
            StepSpec::configure("priceFeed", "setIsAmmEnabled", vec![ArgValue::Bool(false)]),
            StepSpec::configure(
                "vault",
                "setMaxLeverage",
                vec![ArgValue::Uint(config.settings.max_leverage_basis_points())],
            ),
            StepSpec::configure("vault", "setVaultUtils", vec![refer("vaultUtils")]),
            StepSpec::configure("vault", "setPriceFeed", vec![refer("priceFeed")]),
            // Router registration and reserve-token binding are deliberately
            // separate steps so each is individually recorded and resumable.
            StepSpec::configure_grant(
                "vault",
                "addRouter",
                vec![refer("router")],
                "router",
                GrantRole::Router,
            ),
            StepSpec::configure("vault", "setUsdg", vec![refer("usdg")]),
        ],
    )
}

/// Phase 3: the staking lattice. Trackers are initialized with their deposit
/// tokens and distributor, distributors get their clocks started, and every
/// tracker is switched to private modes before the wiring phase opens the
/// narrow handler paths back up.
fn staking_phase(native: &Address) -> PhaseSpec {
    let initialize = |id: &str, deposits: Vec<ArgValue>, distributor: &str| {
        StepSpec::configure(
            id,
            "initialize",
            vec![ArgValue::List(deposits), refer(distributor)],
        )
    };
    let start_clock =
        |id: &str| StepSpec::configure(id, "updateLastDistributionTime", Vec::new());
    let private_modes = |id: &str| {
        [
            StepSpec::configure(id, "setInPrivateTransferMode", vec![ArgValue::Bool(true)]),
            StepSpec::configure(id, "setInPrivateStakingMode", vec![ArgValue::Bool(true)]),
        ]
    };

    let mut steps = vec![
        StepSpec::provision("stakedTracker"),
        StepSpec::provision("stakedDistributor"),
        StepSpec::provision("bonusTracker"),
        StepSpec::provision("bonusDistributor"),
        StepSpec::provision("feeTracker"),
        StepSpec::provision("feeDistributor"),
        StepSpec::provision("feeLiquidityTracker"),
        StepSpec::provision("feeLiquidityDistributor"),
        StepSpec::provision("stakedLiquidityTracker"),
        StepSpec::provision("stakedLiquidityDistributor"),
        StepSpec::provision("governanceVester"),
        StepSpec::provision("liquidityVester"),
        StepSpec::provision("rewardRouter"),
        initialize(
            "stakedTracker",
            vec![refer("governanceToken"), refer("escrowedToken")],
            "stakedDistributor",
        ),
        start_clock("stakedDistributor"),
        initialize("bonusTracker", vec![refer("stakedTracker")], "bonusDistributor"),
        start_clock("bonusDistributor"),
        initialize(
            "feeTracker",
            vec![refer("bonusTracker"), refer("bonusToken")],
            "feeDistributor",
        ),
        start_clock("feeDistributor"),
        initialize(
            "feeLiquidityTracker",
            vec![refer("liquidityToken")],
            "feeLiquidityDistributor",
        ),
        start_clock("feeLiquidityDistributor"),
        initialize(
            "stakedLiquidityTracker",
            vec![refer("feeLiquidityTracker")],
            "stakedLiquidityDistributor",
        ),
        start_clock("stakedLiquidityDistributor"),
    ];

    for tracker in [
        "stakedTracker",
        "bonusTracker",
        "feeTracker",
        "feeLiquidityTracker",
        "stakedLiquidityTracker",
    ] {
        steps.extend(private_modes(tracker));
    }
    // Only the bonus tracker's reward is claimed through the reward router,
    // so it alone runs in private claiming mode.
    steps.push(StepSpec::configure(
        "bonusTracker",
        "setInPrivateClaimingMode",
        vec![ArgValue::Bool(true)],
    ));

    steps.push(StepSpec::configure(
        "rewardRouter",
        "initialize",
        vec![
            ArgValue::Address(native.clone()),
            refer("governanceToken"),
            refer("escrowedToken"),
            refer("bonusToken"),
            refer("liquidityToken"),
            refer("stakedTracker"),
            refer("bonusTracker"),
            refer("feeTracker"),
            refer("feeLiquidityTracker"),
            refer("stakedLiquidityTracker"),
            refer("liquidityManager"),
            refer("governanceVester"),
            refer("liquidityVester"),
        ],
    ));

    PhaseSpec::new("staking", steps)
}

/// Phase 4: capability wiring. Every step here both invokes a method and
/// declares the grant it establishes, so the realized grant set can be
/// reconciled against the plan after the run.
fn wiring_phase() -> PhaseSpec {
    let handler = |grantor: &str, grantee: &str| {
        StepSpec::configure_grant(
            grantor,
            "setHandler",
            vec![refer(grantee), ArgValue::Bool(true)],
            grantee,
            GrantRole::Handler,
        )
    };
    PhaseSpec::new(
        "wiring",
        vec![
            handler("liquidityManager", "rewardRouter"),
            handler("stakedTracker", "rewardRouter"),
            handler("stakedTracker", "bonusTracker"),
            handler("bonusTracker", "rewardRouter"),
            handler("bonusTracker", "feeTracker"),
            handler("feeTracker", "rewardRouter"),
            handler("feeLiquidityTracker", "rewardRouter"),
            handler("feeLiquidityTracker", "stakedLiquidityTracker"),
            handler("stakedLiquidityTracker", "rewardRouter"),
            handler("governanceVester", "rewardRouter"),
            handler("liquidityVester", "rewardRouter"),
            handler("escrowedToken", "stakedDistributor"),
            handler("escrowedToken", "stakedLiquidityDistributor"),
            handler("escrowedToken", "governanceVester"),
            handler("escrowedToken", "liquidityVester"),
            StepSpec::configure_grant(
                "bonusToken",
                "setMinter",
                vec![refer("bonusDistributor"), ArgValue::Bool(true)],
                "bonusDistributor",
                GrantRole::Minter,
            ),
            handler("bonusToken", "feeTracker"),
        ],
    )
}
