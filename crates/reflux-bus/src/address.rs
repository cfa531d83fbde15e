//! Versioned handler addresses

use std::fmt;
use std::str::FromStr;

/// A three-component version with semver ordering.
///
/// The registry keeps handlers ordered by version so `latest` can resolve to
/// the newest registration per name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SemVer {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl SemVer {
    pub const V1: SemVer = SemVer {
        major: 1,
        minor: 0,
        patch: 0,
    };
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SemVer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('.');
        let mut next = |label: &str| -> Result<u64, String> {
            parts
                .next()
                .ok_or_else(|| format!("version {s:?} is missing its {label} component"))?
                .parse::<u64>()
                .map_err(|_| format!("version {s:?} has a non-numeric {label} component"))
        };
        let major = next("major")?;
        let minor = next("minor")?;
        let patch = next("patch")?;
        if parts.next().is_some() {
            return Err(format!("version {s:?} has too many components"));
        }
        Ok(SemVer {
            major,
            minor,
            patch,
        })
    }
}

/// A fully-resolved bus address: `<version>.<name>.execute`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    pub version: SemVer,
    pub name: String,
}

impl Address {
    pub fn new(version: SemVer, name: impl Into<String>) -> Self {
        Self {
            version,
            name: name.into(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.execute", self.version, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semver_parses_and_orders() {
        let a: SemVer = "1.0.0".parse().unwrap();
        let b: SemVer = "1.2.0".parse().unwrap();
        let c: SemVer = "2.0.1".parse().unwrap();
        assert!(a < b && b < c);
        assert_eq!(a, SemVer::V1);
    }

    #[test]
    fn semver_rejects_malformed_strings() {
        assert!("1.0".parse::<SemVer>().is_err());
        assert!("1.0.0.0".parse::<SemVer>().is_err());
        assert!("1.x.0".parse::<SemVer>().is_err());
        assert!("latest".parse::<SemVer>().is_err());
    }

    #[test]
    fn address_renders_with_execute_suffix() {
        let addr = Address::new(SemVer::V1, "nodes.http.request");
        assert_eq!(addr.to_string(), "1.0.0.nodes.http.request.execute");
    }
}
