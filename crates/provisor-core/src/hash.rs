//! Input hashing for idempotence checks.

use sha2::{Digest, Sha256};

use crate::types::ResolvedAction;

/// Hash of a step's fully resolved action.
///
/// A ledger entry only counts as "this step is done" when its hash matches,
/// so a config change that alters a step's resolved arguments forces
/// re-execution. serde_json writes struct fields in declaration order, which
/// makes the rendering canonical for our types.
pub fn input_hash(action: &ResolvedAction) -> String {
    let bytes = serde_json::to_vec(action).expect("resolved action serializes");
    let digest = Sha256::digest(&bytes);
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Address, ArgValue, ResourceKind};

    fn provision(args: Vec<ArgValue>) -> ResolvedAction {
        ResolvedAction::Provision {
            kind: ResourceKind::from("RewardTracker"),
            args,
        }
    }

    #[test]
    fn identical_actions_hash_identically() {
        let a = provision(vec![ArgValue::Str("Staked EXG".to_string())]);
        let b = provision(vec![ArgValue::Str("Staked EXG".to_string())]);
        assert_eq!(input_hash(&a), input_hash(&b));
    }

    #[test]
    fn changed_argument_changes_hash() {
        let a = provision(vec![ArgValue::Uint(500_000)]);
        let b = provision(vec![ArgValue::Uint(1_000_000)]);
        assert_ne!(input_hash(&a), input_hash(&b));
    }

    #[test]
    fn resolved_address_is_part_of_the_hash() {
        let a = ResolvedAction::Configure {
            target: Address::from("0x0000000000000000000000000000000000000001"),
            method: "setHandler".to_string(),
            args: Vec::new(),
        };
        let b = ResolvedAction::Configure {
            target: Address::from("0x0000000000000000000000000000000000000002"),
            method: "setHandler".to_string(),
            args: Vec::new(),
        };
        assert_ne!(input_hash(&a), input_hash(&b));
    }
}
