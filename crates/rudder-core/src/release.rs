//! Release information exposed to templates

use serde::{Deserialize, Serialize};

/// What templates see as `release`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseInfo {
    pub name: String,

    /// Target namespace
    pub namespace: String,

    /// Version being rendered
    pub revision: u32,

    pub is_install: bool,

    pub is_upgrade: bool,

    /// Always "Rudder"
    pub service: String,
}

impl ReleaseInfo {
    /// Release info for an install. The revision is above 1 when a deleted
    /// or failed name is reused.
    pub fn for_install(name: &str, namespace: &str, revision: u32) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            revision,
            is_install: true,
            is_upgrade: false,
            service: "Rudder".to_string(),
        }
    }

    /// Release info for an upgrade
    pub fn for_upgrade(name: &str, namespace: &str, revision: u32) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            revision,
            is_install: false,
            is_upgrade: true,
            service: "Rudder".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_info_flags() {
        let install = ReleaseInfo::for_install("web", "prod", 1);
        assert!(install.is_install && !install.is_upgrade);

        let upgrade = ReleaseInfo::for_upgrade("web", "prod", 4);
        assert!(upgrade.is_upgrade && !upgrade.is_install);
        assert_eq!(upgrade.revision, 4);
    }

    #[test]
    fn test_camel_case_serialization() {
        let json = serde_json::to_value(ReleaseInfo::for_install("web", "prod", 1)).unwrap();
        assert_eq!(json["isInstall"], true);
        assert_eq!(json["service"], "Rudder");
    }
}
