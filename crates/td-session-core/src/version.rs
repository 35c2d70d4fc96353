//! Engine version reported through the `version` option.

use std::{fmt, str::FromStr};

use thiserror::Error;

/// Semantic engine version (`major.minor.patch`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EngineVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl EngineVersion {
    /// First version taking flattened `setTdlibParameters` and offering the
    /// email authorization states.
    pub const FLATTENED_PARAMETERS: Self = Self::new(1, 8, 6);

    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Whether the handshake must use the flattened request shape.
    #[must_use]
    pub fn uses_flattened_parameters(self) -> bool {
        self >= Self::FLATTENED_PARAMETERS
    }
}

impl fmt::Display for EngineVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid engine version: {0:?}")]
pub struct ParseVersionError(String);

impl FromStr for EngineVersion {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseVersionError(s.to_string());
        let mut parts = s.trim().split('.');
        let mut next = |required: bool| -> Result<u32, ParseVersionError> {
            match parts.next() {
                Some(part) => part.parse().map_err(|_| invalid()),
                None if required => Err(invalid()),
                None => Ok(0),
            }
        };
        let major = next(true)?;
        let minor = next(true)?;
        let patch = next(false)?;
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self::new(major, minor, patch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_order() {
        let old: EngineVersion = "1.8.5".parse().unwrap();
        let new: EngineVersion = "1.8.10".parse().unwrap();
        assert!(old < new);
        assert!(!old.uses_flattened_parameters());
        assert!(new.uses_flattened_parameters());
        assert!(EngineVersion::FLATTENED_PARAMETERS.uses_flattened_parameters());
    }

    #[test]
    fn test_missing_patch_defaults_to_zero() {
        assert_eq!("1.7".parse::<EngineVersion>().unwrap(), EngineVersion::new(1, 7, 0));
    }

    #[test]
    fn test_invalid_versions() {
        assert!("".parse::<EngineVersion>().is_err());
        assert!("1".parse::<EngineVersion>().is_err());
        assert!("1.x.0".parse::<EngineVersion>().is_err());
        assert!("1.2.3.4".parse::<EngineVersion>().is_err());
    }
}
