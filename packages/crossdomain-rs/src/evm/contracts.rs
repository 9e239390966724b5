//! OP-stack bridge contract ABI definitions
//!
//! Uses alloy's sol! macro to generate type-safe bindings for the subset of
//! the standard bridge, messenger and portal interfaces the client calls.

#![allow(clippy::too_many_arguments)]

use alloy::primitives::{address, Address};
use alloy::sol;

// ============================================================================
// L2 Predeploys
// ============================================================================

/// L2CrossDomainMessenger predeploy
pub const L2_CROSS_DOMAIN_MESSENGER: Address = address!("4200000000000000000000000000000000000007");

/// L2StandardBridge predeploy
pub const L2_STANDARD_BRIDGE: Address = address!("4200000000000000000000000000000000000010");

/// L2ToL1MessagePasser predeploy
pub const L2_TO_L1_MESSAGE_PASSER: Address = address!("4200000000000000000000000000000000000016");

/// Legacy ERC20 representation of ETH on L2, used as the token for ETH withdrawals
pub const LEGACY_ERC20_ETH: Address = address!("DeadDeAddeAddEAddeadDEaDDEAdDeaDDeAD0000");

sol! {
    /// L1 side of the standard bridge
    #[sol(rpc)]
    contract L1StandardBridge {
        function depositETHTo(address _to, uint32 _minGasLimit, bytes _extraData) external payable;

        function depositERC20To(
            address _l1Token,
            address _l2Token,
            address _to,
            uint256 _amount,
            uint32 _minGasLimit,
            bytes _extraData
        ) external;
    }
}

sol! {
    /// L2 side of the standard bridge
    #[sol(rpc)]
    contract L2StandardBridge {
        function withdrawTo(
            address _l2Token,
            address _to,
            uint256 _amount,
            uint32 _minGasLimit,
            bytes _extraData
        ) external payable;
    }
}

sol! {
    /// Cross-domain messenger (same interface on both chains)
    #[sol(rpc)]
    contract CrossDomainMessenger {
        function successfulMessages(bytes32 msgHash) external view returns (bool);
        function failedMessages(bytes32 msgHash) external view returns (bool);

        event SentMessage(address indexed target, address sender, bytes message, uint256 messageNonce, uint256 gasLimit);
        event SentMessageExtension1(address indexed sender, uint256 value);
    }
}

sol! {
    /// L2 -> L1 message passer predeploy
    #[sol(rpc)]
    contract L2ToL1MessagePasser {
        event MessagePassed(
            uint256 indexed nonce,
            address indexed sender,
            address indexed target,
            uint256 value,
            uint256 gasLimit,
            bytes data,
            bytes32 withdrawalHash
        );
    }
}

sol! {
    /// L1 portal holding proven and finalized withdrawals (output-oracle
    /// proofs, before fault proofs)
    #[sol(rpc)]
    contract OptimismPortal {
        struct WithdrawalTransaction {
            uint256 nonce;
            address sender;
            address target;
            uint256 value;
            uint256 gasLimit;
            bytes data;
        }

        function finalizedWithdrawals(bytes32 withdrawalHash) external view returns (bool);

        function provenWithdrawals(bytes32 withdrawalHash)
            external
            view
            returns (bytes32 outputRoot, uint128 timestamp, uint128 l2OutputIndex);

        function finalizeWithdrawalTransaction(WithdrawalTransaction _tx) external;

        function version() external view returns (string);
    }
}

sol! {
    /// Fault-proof L1 portal
    ///
    /// Proofs are recorded per proof submitter; `checkWithdrawal` reverts
    /// unless the withdrawal can be finalized with that submitter's proof.
    #[sol(rpc)]
    contract OptimismPortal2 {
        struct WithdrawalTransaction {
            uint256 nonce;
            address sender;
            address target;
            uint256 value;
            uint256 gasLimit;
            bytes data;
        }

        function finalizedWithdrawals(bytes32 withdrawalHash) external view returns (bool);

        function provenWithdrawals(bytes32 withdrawalHash, address proofSubmitter)
            external
            view
            returns (address disputeGameProxy, uint64 timestamp);

        function numProofSubmitters(bytes32 withdrawalHash) external view returns (uint256);

        function proofSubmitters(bytes32 withdrawalHash, uint256 index) external view returns (address);

        function proofMaturityDelaySeconds() external view returns (uint256);

        function checkWithdrawal(bytes32 withdrawalHash, address proofSubmitter) external view;

        function finalizeWithdrawalTransaction(WithdrawalTransaction _tx) external;

        function finalizeWithdrawalTransactionExternalProof(
            WithdrawalTransaction _tx,
            address _proofSubmitter
        ) external;
    }
}

sol! {
    /// L2 output oracle, source of the challenge period length
    #[sol(rpc)]
    contract L2OutputOracle {
        function FINALIZATION_PERIOD_SECONDS() external view returns (uint256);
    }
}

sol! {
    /// Minimal ERC20 interface for balance and allowance reads
    #[sol(rpc)]
    contract ERC20 {
        function balanceOf(address account) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
    }
}
