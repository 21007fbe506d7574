//! Solidity interfaces for the token contracts and the ring submitter.

use alloy::sol;

sol! {
    #[sol(all_derives = true)]
    interface IERC20 {
        event Transfer(address indexed from, address indexed to, uint256 value);
    }
}

// Test tokens deployed alongside the protocol mint on demand so scenario
// setup can top up balances.
sol! {
    #[sol(all_derives = true)]
    interface ITestToken {
        function mint(address to, uint256 amount) external;
    }
}

sol! {
    #[sol(all_derives = true)]
    interface IRingSubmitter {
        function submitRings(bytes data) external;
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::keccak256;
    use alloy::sol_types::{SolCall, SolEvent};

    use super::*;

    #[test]
    fn selectors_match_deployed_signatures() {
        assert_eq!(
            IERC20::Transfer::SIGNATURE_HASH,
            keccak256("Transfer(address,address,uint256)")
        );
        assert_eq!(
            ITestToken::mintCall::SELECTOR,
            keccak256("mint(address,uint256)")[..4]
        );
        assert_eq!(
            IRingSubmitter::submitRingsCall::SELECTOR,
            keccak256("submitRings(bytes)")[..4]
        );
    }
}
