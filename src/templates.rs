// Strip templates and the photo limits they impose

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TemplateKind {
    #[default]
    Single,
    ThreeVertical,
    FourVertical,
}

impl TemplateKind {
    pub fn capacity(self) -> usize {
        match self {
            TemplateKind::Single => 1,
            TemplateKind::ThreeVertical => 3,
            TemplateKind::FourVertical => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TemplateKind::Single => "single",
            TemplateKind::ThreeVertical => "three-vertical",
            TemplateKind::FourVertical => "four-vertical",
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TemplateKind {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(TemplateKind::Single),
            "three-vertical" => Ok(TemplateKind::ThreeVertical),
            "four-vertical" => Ok(TemplateKind::FourVertical),
            other => Err(SessionError::InvalidRequest(format!(
                "unknown template: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacities() {
        assert_eq!(TemplateKind::Single.capacity(), 1);
        assert_eq!(TemplateKind::ThreeVertical.capacity(), 3);
        assert_eq!(TemplateKind::FourVertical.capacity(), 4);
    }

    #[test]
    fn test_names_match_serde() {
        for kind in [
            TemplateKind::Single,
            TemplateKind::ThreeVertical,
            TemplateKind::FourVertical,
        ] {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, kind.as_str());
            assert_eq!(kind.as_str().parse::<TemplateKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_template_rejected() {
        assert!("two-horizontal".parse::<TemplateKind>().is_err());
    }
}
