//! The platform ("subdir") tags a package can be built for.

use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// A platform a package supports, named after the channel subdirectory that
/// stores packages for it (e.g. `linux-64`, `osx-arm64`, `noarch`).
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Platform {
    NoArch,

    Linux32,
    Linux64,
    LinuxAarch64,
    LinuxArmV6l,
    LinuxArmV7l,
    LinuxPpc64,
    LinuxPpc64le,
    LinuxS390X,
    LinuxRiscv64,

    Osx64,
    OsxArm64,

    Win32,
    Win64,
    WinArm64,
}

/// The architecture part of a [`Platform`].
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Arch {
    X86,
    X86_64,
    Aarch64,
    ArmV6l,
    ArmV7l,
    Ppc64,
    Ppc64le,
    S390X,
    Riscv64,
}

impl Platform {
    /// Returns the platform this binary was built for.
    pub const fn current() -> Platform {
        #[cfg(all(target_os = "linux", target_arch = "x86"))]
        return Platform::Linux32;
        #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
        return Platform::Linux64;
        #[cfg(all(target_os = "linux", target_arch = "aarch64"))]
        return Platform::LinuxAarch64;
        #[cfg(all(target_os = "linux", target_arch = "riscv64"))]
        return Platform::LinuxRiscv64;
        #[cfg(all(target_os = "linux", target_arch = "powerpc64le"))]
        return Platform::LinuxPpc64le;
        #[cfg(all(target_os = "linux", target_arch = "powerpc64"))]
        return Platform::LinuxPpc64;
        #[cfg(all(target_os = "linux", target_arch = "s390x"))]
        return Platform::LinuxS390X;

        #[cfg(all(target_os = "macos", target_arch = "x86_64"))]
        return Platform::Osx64;
        #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
        return Platform::OsxArm64;

        #[cfg(all(target_os = "windows", target_arch = "x86"))]
        return Platform::Win32;
        #[cfg(all(target_os = "windows", target_arch = "x86_64"))]
        return Platform::Win64;
        #[cfg(all(target_os = "windows", target_arch = "aarch64"))]
        return Platform::WinArm64;
    }

    /// Returns a string representation of the platform.
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// Returns true when the platform is a windows platform.
    pub const fn is_windows(self) -> bool {
        matches!(self, Platform::Win32 | Platform::Win64 | Platform::WinArm64)
    }

    /// Returns true when the platform is a unix (linux or macOS) platform.
    pub const fn is_unix(self) -> bool {
        self.is_linux() || self.is_osx()
    }

    /// Returns true when the platform is a linux platform.
    pub const fn is_linux(self) -> bool {
        matches!(
            self,
            Platform::Linux32
                | Platform::Linux64
                | Platform::LinuxAarch64
                | Platform::LinuxArmV6l
                | Platform::LinuxArmV7l
                | Platform::LinuxPpc64
                | Platform::LinuxPpc64le
                | Platform::LinuxS390X
                | Platform::LinuxRiscv64
        )
    }

    /// Returns true when the platform is a macOS platform.
    pub const fn is_osx(self) -> bool {
        matches!(self, Platform::Osx64 | Platform::OsxArm64)
    }

    /// Returns true for the `noarch` pseudo-platform.
    pub const fn is_noarch(self) -> bool {
        matches!(self, Platform::NoArch)
    }

    /// Returns the architecture of the platform, or `None` for `noarch`.
    pub const fn arch(self) -> Option<Arch> {
        match self {
            Platform::NoArch => None,
            Platform::Linux32 | Platform::Win32 => Some(Arch::X86),
            Platform::Linux64 | Platform::Osx64 | Platform::Win64 => Some(Arch::X86_64),
            Platform::LinuxAarch64 | Platform::OsxArm64 | Platform::WinArm64 => {
                Some(Arch::Aarch64)
            }
            Platform::LinuxArmV6l => Some(Arch::ArmV6l),
            Platform::LinuxArmV7l => Some(Arch::ArmV7l),
            Platform::LinuxPpc64 => Some(Arch::Ppc64),
            Platform::LinuxPpc64le => Some(Arch::Ppc64le),
            Platform::LinuxS390X => Some(Arch::S390X),
            Platform::LinuxRiscv64 => Some(Arch::Riscv64),
        }
    }
}

/// An error that occurs when parsing an unknown platform string.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
#[error("'{string}' is not a known platform")]
pub struct ParsePlatformError {
    /// The string that could not be parsed.
    pub string: String,
}

impl FromStr for Platform {
    type Err = ParsePlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "noarch" => Platform::NoArch,
            "linux-32" => Platform::Linux32,
            "linux-64" => Platform::Linux64,
            "linux-aarch64" => Platform::LinuxAarch64,
            "linux-armv6l" => Platform::LinuxArmV6l,
            "linux-armv7l" => Platform::LinuxArmV7l,
            "linux-ppc64" => Platform::LinuxPpc64,
            "linux-ppc64le" => Platform::LinuxPpc64le,
            "linux-s390x" => Platform::LinuxS390X,
            "linux-riscv64" => Platform::LinuxRiscv64,
            "osx-64" => Platform::Osx64,
            "osx-arm64" => Platform::OsxArm64,
            "win-32" => Platform::Win32,
            "win-64" => Platform::Win64,
            "win-arm64" => Platform::WinArm64,
            string => {
                return Err(ParsePlatformError {
                    string: string.to_owned(),
                })
            }
        })
    }
}

impl From<Platform> for &'static str {
    fn from(platform: Platform) -> Self {
        match platform {
            Platform::NoArch => "noarch",
            Platform::Linux32 => "linux-32",
            Platform::Linux64 => "linux-64",
            Platform::LinuxAarch64 => "linux-aarch64",
            Platform::LinuxArmV6l => "linux-armv6l",
            Platform::LinuxArmV7l => "linux-armv7l",
            Platform::LinuxPpc64 => "linux-ppc64",
            Platform::LinuxPpc64le => "linux-ppc64le",
            Platform::LinuxS390X => "linux-s390x",
            Platform::LinuxRiscv64 => "linux-riscv64",
            Platform::Osx64 => "osx-64",
            Platform::OsxArm64 => "osx-arm64",
            Platform::Win32 => "win-32",
            Platform::Win64 => "win-64",
            Platform::WinArm64 => "win-arm64",
        }
    }
}

impl Display for Platform {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PartialOrd<str> for Platform {
    fn partial_cmp(&self, other: &str) -> Option<Ordering> {
        Some(self.as_str().cmp(other))
    }
}

impl PartialEq<str> for Platform {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl Serialize for Platform {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Platform {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        source.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::Platform;
    use std::str::FromStr;

    #[test]
    fn roundtrip() {
        for subdir in ["noarch", "linux-64", "osx-arm64", "win-64"] {
            let platform = Platform::from_str(subdir).unwrap();
            assert_eq!(platform.as_str(), subdir);
        }
        assert!(Platform::from_str("commodore-64").is_err());
    }

    #[test]
    fn classification() {
        assert!(Platform::Win64.is_windows());
        assert!(Platform::Linux64.is_unix());
        assert!(Platform::OsxArm64.is_osx());
        assert!(Platform::NoArch.is_noarch());
        assert!(!Platform::NoArch.is_unix());
    }
}
