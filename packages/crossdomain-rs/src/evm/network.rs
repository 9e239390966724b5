//! Known OP-stack deployments
//!
//! L1 contract addresses for the networks the client ships presets for.
//! Custom deployments supply all three addresses explicitly.

use alloy::primitives::{address, Address};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BridgeError;

/// L1 contract addresses of one OP-stack deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct L1Contracts {
    pub l1_standard_bridge: Address,
    pub optimism_portal: Address,
    pub l2_output_oracle: Address,
}

/// Named deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Ethereum mainnet / OP mainnet
    Mainnet,
    /// Sepolia / OP Sepolia
    Sepolia,
    /// Addresses supplied by configuration
    Custom,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Sepolia => "sepolia",
            Network::Custom => "custom",
        }
    }

    /// (L1, L2) chain ids, unknown for custom deployments
    pub fn chain_ids(&self) -> Option<(u64, u64)> {
        match self {
            Network::Mainnet => Some((1, 10)),
            Network::Sepolia => Some((11_155_111, 11_155_420)),
            Network::Custom => None,
        }
    }

    /// Preset L1 contracts, unknown for custom deployments
    pub fn l1_contracts(&self) -> Option<L1Contracts> {
        match self {
            Network::Mainnet => Some(L1Contracts {
                l1_standard_bridge: address!("99C9fc46f92E8a1c0deC1b1747d010903E884bE1"),
                optimism_portal: address!("bEb5Fc579115071764c7423A4f12eDde41f106Ed"),
                l2_output_oracle: address!("dfe97868233d1aa22e815a266982f2cf17685a27"),
            }),
            Network::Sepolia => Some(L1Contracts {
                l1_standard_bridge: address!("FBb0621E0B23b5478B630BD55a5f21f67730B0F1"),
                optimism_portal: address!("16Fc5058F25648194471939df75CF27A2fdC48BC"),
                l2_output_oracle: address!("90E9c4f8a994a250F6aEfd61CAFb4F2e895D458F"),
            }),
            Network::Custom => None,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Network {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "sepolia" => Ok(Network::Sepolia),
            "custom" => Ok(Network::Custom),
            other => Err(BridgeError::InvalidRequest(format!(
                "unknown network '{}', expected mainnet, sepolia or custom",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        assert_eq!(Network::Mainnet.chain_ids(), Some((1, 10)));
        assert!(Network::Sepolia.l1_contracts().is_some());
        assert!(Network::Custom.l1_contracts().is_none());
        assert!(Network::Custom.chain_ids().is_none());
    }

    #[test]
    fn test_parse() {
        assert_eq!("Sepolia".parse::<Network>().unwrap(), Network::Sepolia);
        assert_eq!(" mainnet ".parse::<Network>().unwrap(), Network::Mainnet);
        assert!("kovan".parse::<Network>().is_err());
    }
}
