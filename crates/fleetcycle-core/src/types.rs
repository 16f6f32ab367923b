//! Domain types for fleet groups, launch templates, and instances.
//!
//! These are observations of provider-owned state. The controller reads
//! them fresh before every decision and never trusts a value past one
//! poll cycle; nothing here is persisted locally.

use serde::{Deserialize, Serialize};

/// Name of a scaling group (unique within the provider account).
pub type GroupName = String;

/// Reference to a machine image.
pub type ImageRef = String;

/// Reference to a launch template.
pub type TemplateRef = String;

/// Unique identifier of a compute instance.
pub type InstanceId = String;

// ── Fleet group ────────────────────────────────────────────────────

/// A scaling group as observed at one point in time.
///
/// Mutated only through [`GroupUpdate`]; the provider converges the
/// member set toward `desired_capacity` asynchronously.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FleetGroup {
    pub name: GroupName,
    pub desired_capacity: u32,
    pub max_capacity: u32,
    pub min_capacity: u32,
    /// Template used for any subsequently launched instance.
    pub launch_template: TemplateRef,
    /// Current member instances.
    pub instances: Vec<InstanceRef>,
}

/// Partial update applied to a group. Unset fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GroupUpdate {
    pub launch_template: Option<TemplateRef>,
    pub desired_capacity: Option<u32>,
    pub max_capacity: Option<u32>,
}

impl GroupUpdate {
    pub fn launch_template(tref: impl Into<TemplateRef>) -> Self {
        Self {
            launch_template: Some(tref.into()),
            ..Self::default()
        }
    }

    pub fn desired_capacity(desired: u32) -> Self {
        Self {
            desired_capacity: Some(desired),
            ..Self::default()
        }
    }

    pub fn max_capacity(max: u32) -> Self {
        Self {
            max_capacity: Some(max),
            ..Self::default()
        }
    }
}

// ── Launch template ────────────────────────────────────────────────

/// Immutable bundle of instance-creation parameters.
///
/// Created once per replacement run by cloning the group's active
/// template with only the image substituted; never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LaunchTemplate {
    pub name: String,
    pub image: ImageRef,
    /// Instance size/class (e.g. "c5.large").
    pub instance_class: String,
    pub subnets: Vec<String>,
    pub security_groups: Vec<String>,
    pub block_devices: Vec<BlockDevice>,
    pub iam_profile: Option<String>,
    /// User-supplied bootstrap data, base64-encoded.
    pub user_data: Option<String>,
    /// Placement hint (availability zone / group).
    pub placement: Option<String>,
    /// Spot price ceiling, if the group runs on spot capacity.
    pub spot_price: Option<String>,
}

impl LaunchTemplate {
    /// Clone this template with a new name and image; every other
    /// field is carried over unchanged.
    pub fn with_image(&self, name: impl Into<String>, image: impl Into<ImageRef>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ..self.clone()
        }
    }
}

/// A block device mapping within a launch template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlockDevice {
    pub device_name: String,
    pub volume_size_gb: u32,
    pub volume_type: String,
}

/// Metadata about a machine image, used to validate the target image
/// resolves before any mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageMetadata {
    pub id: ImageRef,
    pub name: String,
    /// Provider-side image state (e.g. "available", "pending").
    pub state: String,
}

// ── Instance ───────────────────────────────────────────────────────

/// One instance as observed during a single poll.
///
/// Transient: recomputed from the provider on every poll.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceRef {
    pub id: InstanceId,
    /// Image the instance was launched from.
    pub image: ImageRef,
    pub health: HealthStatus,
    pub lifecycle: LifecycleState,
}

/// Provider-reported instance readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Still booting or registering.
    Provisioning,
    Healthy,
    Unhealthy,
    Unknown,
    /// Being drained out of the group.
    Terminating,
}

/// Provider-reported instance lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Pending,
    InService,
    Terminating,
    Terminated,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HealthStatus::Provisioning => "provisioning",
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unknown => "unknown",
            HealthStatus::Terminating => "terminating",
        };
        f.write_str(s)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LifecycleState::Pending => "pending",
            LifecycleState::InService => "in_service",
            LifecycleState::Terminating => "terminating",
            LifecycleState::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> LaunchTemplate {
        LaunchTemplate {
            name: "web-v1".to_string(),
            image: "img-old".to_string(),
            instance_class: "c5.large".to_string(),
            subnets: vec!["subnet-a".to_string()],
            security_groups: vec!["sg-web".to_string()],
            block_devices: vec![BlockDevice {
                device_name: "/dev/sda1".to_string(),
                volume_size_gb: 50,
                volume_type: "gp3".to_string(),
            }],
            iam_profile: Some("web-role".to_string()),
            user_data: Some("IyEvYmluL3No".to_string()),
            placement: None,
            spot_price: None,
        }
    }

    #[test]
    fn with_image_substitutes_only_name_and_image() {
        let src = template();
        let out = src.with_image("web-v1-run1-r0", "img-new");
        assert_eq!(out.name, "web-v1-run1-r0");
        assert_eq!(out.image, "img-new");
        assert_eq!(out.instance_class, src.instance_class);
        assert_eq!(out.subnets, src.subnets);
        assert_eq!(out.security_groups, src.security_groups);
        assert_eq!(out.block_devices, src.block_devices);
        assert_eq!(out.iam_profile, src.iam_profile);
        assert_eq!(out.user_data, src.user_data);
    }

    #[test]
    fn group_update_builders_set_one_field() {
        let u = GroupUpdate::desired_capacity(3);
        assert_eq!(u.desired_capacity, Some(3));
        assert_eq!(u.launch_template, None);
        assert_eq!(u.max_capacity, None);
    }

    #[test]
    fn health_status_serde_snake_case() {
        let json = serde_json::to_string(&HealthStatus::Provisioning).unwrap();
        assert_eq!(json, "\"provisioning\"");
        let back: HealthStatus = serde_json::from_str("\"healthy\"").unwrap();
        assert_eq!(back, HealthStatus::Healthy);
    }

    #[test]
    fn lifecycle_serde_snake_case() {
        let json = serde_json::to_string(&LifecycleState::InService).unwrap();
        assert_eq!(json, "\"in_service\"");
    }
}
