use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Visibility level of a post. Defaults to `Public` at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Privacy {
    Public,
    Private,
    Friends,
}

impl Privacy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Privacy::Public => "PUBLIC",
            Privacy::Private => "PRIVATE",
            Privacy::Friends => "FRIENDS",
        }
    }
}

impl fmt::Display for Privacy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Privacy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PUBLIC" => Ok(Privacy::Public),
            "PRIVATE" => Ok(Privacy::Private),
            "FRIENDS" => Ok(Privacy::Friends),
            other => Err(format!("unknown privacy level: {}", other)),
        }
    }
}
