use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Cosmetic avatar tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Skin {
    #[default]
    Default,
    Blue,
    Red,
    Green,
}

impl Skin {
    /// Every known skin, in display order
    pub const ALL: [Skin; 4] = [Skin::Default, Skin::Blue, Skin::Red, Skin::Green];

    pub fn as_str(self) -> &'static str {
        match self {
            Skin::Default => "default",
            Skin::Blue => "blue",
            Skin::Red => "red",
            Skin::Green => "green",
        }
    }

    /// Parse a skin id, falling back to `Default` for anything unrecognized
    pub fn parse_or_default(id: &str) -> Self {
        id.parse().unwrap_or_default()
    }
}

impl fmt::Display for Skin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown skin: {0}")]
pub struct UnknownSkin(pub String);

impl FromStr for Skin {
    type Err = UnknownSkin;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Skin::ALL
            .into_iter()
            .find(|skin| skin.as_str() == s)
            .ok_or_else(|| UnknownSkin(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known() {
        assert_eq!("blue".parse::<Skin>().unwrap(), Skin::Blue);
        assert_eq!("default".parse::<Skin>().unwrap(), Skin::Default);
    }

    #[test]
    fn test_unknown_falls_back() {
        assert_eq!(Skin::parse_or_default("purple"), Skin::Default);
        assert_eq!(Skin::parse_or_default("Blue"), Skin::Default);
        assert_eq!(Skin::parse_or_default("green"), Skin::Green);
    }

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Skin::Red).unwrap(), "\"red\"");
        let skin: Skin = serde_json::from_str("\"green\"").unwrap();
        assert_eq!(skin, Skin::Green);
    }
}
