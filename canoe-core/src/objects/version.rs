//! Application version.

use std::fmt;

use serde::Serialize;

use crate::errors::Result;
use crate::proxy::Proxy;

proxy! {
    pub struct Version;
}

impl Version {
    getters! {
        build: i32 => "Build";
        full_name: String => "FullName";
        major: i32 => "major";
        minor: i32 => "minor";
        name: String => "Name";
        patch: i32 => "Patch";
    }

    /// Read every field in one go.
    pub fn info(&self) -> Result<VersionInfo> {
        Ok(VersionInfo {
            full_name: self.full_name()?,
            name: self.name()?,
            major: self.major()?,
            minor: self.minor()?,
            build: self.build()?,
            patch: self.patch()?,
        })
    }
}

/// Version snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    pub full_name: String,
    pub name: String,
    pub major: i32,
    pub minor: i32,
    pub build: i32,
    pub patch: i32,
}

impl VersionInfo {
    /// `true` if this version is `major.minor` or newer.
    pub fn at_least(&self, major: i32, minor: i32) -> bool {
        (self.major, self.minor) >= (major, minor)
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockObject;

    fn version(major: i32, minor: i32) -> Version {
        let mock = MockObject::new("Version")
            .with_prop("FullName", format!("Vector CANoe {major}.{minor}"))
            .with_prop("Name", "CANoe")
            .with_prop("major", major)
            .with_prop("minor", minor)
            .with_prop("Build", 40)
            .with_prop("Patch", 1);
        Version::from_handle(mock.handle())
    }

    #[test]
    fn test_info_and_comparison() {
        let info = version(15, 3).info().unwrap();
        assert_eq!(info.to_string(), "Vector CANoe 15.3");
        assert!(info.at_least(15, 3));
        assert!(info.at_least(12, 9));
        assert!(!info.at_least(15, 4));
        assert!(!info.at_least(16, 0));
    }

    #[test]
    fn test_minor_ten_is_newer_than_minor_three() {
        assert!(version(15, 10).info().unwrap().at_least(15, 3));
    }

    #[test]
    fn test_info_serializes() {
        let json = serde_json::to_value(version(17, 0).info().unwrap()).unwrap();
        assert_eq!(json["major"], 17);
        assert_eq!(json["name"], "CANoe");
    }
}
