//! Contract ABI definitions and well-known addresses
//!
//! Uses alloy's sol! macro to generate call and event types for the standard
//! bridge, the cross-domain messengers and the ERC20 surface of the tokens.
//! The signatures must stay bit-exact with the deployed bridge contracts.

use alloy::primitives::{address, keccak256, Address, B256};
use alloy::sol;
use alloy::sol_types::SolCall;

sol! {
    /// ERC20 surface used on the root and child tokens
    #[derive(Debug, PartialEq, Eq)]
    contract IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
    }

    /// L1 side of the standard bridge
    #[derive(Debug, PartialEq, Eq)]
    contract IL1StandardBridge {
        function depositERC20(
            address _l1Token,
            address _l2Token,
            uint256 _amount,
            uint32 _l2Gas,
            bytes calldata _data
        ) external;
    }

    /// L2 side of the standard bridge
    #[derive(Debug, PartialEq, Eq)]
    contract IL2StandardBridge {
        function withdraw(
            address _l2Token,
            uint256 _amount,
            uint32 _l1Gas,
            bytes calldata _data
        ) external;

        function l1TokenBridge() external view returns (address);
    }

    /// L2 messenger predeploy
    #[derive(Debug, PartialEq, Eq)]
    contract IL2CrossDomainMessenger {
        function l1CrossDomainMessenger() external view returns (address);
    }

    /// Events and relay entry point shared by both messengers
    #[derive(Debug, PartialEq, Eq)]
    contract ICrossDomainMessenger {
        event SentMessage(
            address indexed target,
            address sender,
            bytes message,
            uint256 messageNonce,
            uint256 gasLimit
        );

        event RelayedMessage(bytes32 indexed msgHash);

        event FailedRelayedMessage(bytes32 indexed msgHash);

        function relayMessage(
            address _target,
            address _sender,
            bytes memory _message,
            uint256 _messageNonce
        ) external;
    }
}

/// Standard bridge predeploy on L2
pub const L2_STANDARD_BRIDGE: Address = address!("4200000000000000000000000000000000000010");

/// Cross-domain messenger predeploy on L2
pub const L2_CROSS_DOMAIN_MESSENGER: Address =
    address!("4200000000000000000000000000000000000007");

/// Hash under which the destination messenger records a relayed message.
///
/// Matches the messenger's own bookkeeping: keccak256 of the
/// `relayMessage(address,address,bytes,uint256)` calldata.
pub fn relay_message_hash(event: &ICrossDomainMessenger::SentMessage) -> B256 {
    let call = ICrossDomainMessenger::relayMessageCall {
        _target: event.target,
        _sender: event.sender,
        _message: event.message.clone(),
        _messageNonce: event.messageNonce,
    };
    keccak256(call.abi_encode())
}
