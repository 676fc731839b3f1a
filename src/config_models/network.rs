use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use strum::EnumIter;

#[derive(
    Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default, EnumIter,
)]
pub enum Network {
    /// Production chain. Addresses carry the `f` prefix.
    #[default]
    Mainnet,

    /// Long-lived public test chain. Addresses carry the `t` prefix.
    Calibnet,
}

impl Network {
    /// The leading character of every address on this network.
    pub fn address_prefix(&self) -> char {
        match self {
            Network::Mainnet => 'f',
            Network::Calibnet => 't',
        }
    }

    pub fn from_address_prefix(prefix: char) -> Option<Self> {
        match prefix {
            'f' => Some(Network::Mainnet),
            't' => Some(Network::Calibnet),
            _ => None,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let string = match self {
            Network::Mainnet => "mainnet",
            Network::Calibnet => "calibnet",
        };
        write!(f, "{}", string)
    }
}

impl FromStr for Network {
    type Err = String;
    fn from_str(input: &str) -> Result<Network, Self::Err> {
        match input {
            "mainnet" | "main" => Ok(Network::Mainnet),
            "calibnet" | "calibration" => Ok(Network::Calibnet),
            _ => Err(format!("Failed to parse {} as network", input)),
        }
    }
}
