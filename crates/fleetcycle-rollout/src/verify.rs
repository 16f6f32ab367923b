//! Post-run verification.
//!
//! Read-only: re-lists the group's instances and reports, per
//! instance, whether its observed image matches the requested one.
//! Provider errors while fetching one instance become `unknown`
//! entries rather than failing the report.

use serde::Serialize;
use tracing::debug;

use fleetcycle_core::{GroupName, ImageRef, InstanceId, LifecycleState};
use fleetcycle_provider::FleetProvider;

use crate::error::ReplaceResult;

/// Verification result for one instance.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyEntry {
    pub id: InstanceId,
    /// Observed image, when it could be fetched.
    pub image: Option<ImageRef>,
    /// Observed lifecycle, for diagnosing mismatches.
    pub lifecycle: Option<LifecycleState>,
    pub updated: bool,
}

/// Per-instance verification report for a group.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub group: GroupName,
    pub target_image: ImageRef,
    pub entries: Vec<VerifyEntry>,
}

impl VerifyReport {
    /// Whether every instance reports the target image.
    pub fn all_updated(&self) -> bool {
        !self.entries.is_empty() && self.entries.iter().all(|e| e.updated)
    }
}

/// Build the verification report for a group against a target image.
pub async fn verify_group<P: FleetProvider>(
    provider: &P,
    group: &GroupName,
    target_image: &ImageRef,
) -> ReplaceResult<VerifyReport> {
    let members = provider.list_group_instances(group).await?;
    let mut entries = Vec::with_capacity(members.len());

    for member in members {
        let image = match provider.get_instance_image(&member.id).await {
            Ok(image) => Some(image),
            Err(e) => {
                debug!(id = %member.id, error = %e, "could not fetch instance image");
                None
            }
        };
        let lifecycle = match provider.get_instance_lifecycle(&member.id).await {
            Ok(state) => Some(state),
            Err(e) => {
                debug!(id = %member.id, error = %e, "could not fetch instance lifecycle");
                None
            }
        };
        let updated = image.as_deref() == Some(target_image.as_str());
        entries.push(VerifyEntry {
            id: member.id,
            image,
            lifecycle,
            updated,
        });
    }

    Ok(VerifyReport {
        group: group.clone(),
        target_image: target_image.clone(),
        entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetcycle_core::{FleetGroup, HealthStatus, InstanceRef};
    use fleetcycle_provider::SimFleet;

    fn instance(id: &str, image: &str) -> InstanceRef {
        InstanceRef {
            id: id.to_string(),
            image: image.to_string(),
            health: HealthStatus::Healthy,
            lifecycle: LifecycleState::InService,
        }
    }

    fn fleet(instances: Vec<InstanceRef>) -> SimFleet {
        SimFleet::new().with_group(FleetGroup {
            name: "web".to_string(),
            desired_capacity: instances.len() as u32,
            max_capacity: 4,
            min_capacity: 0,
            launch_template: "lt-web".to_string(),
            instances,
        })
    }

    #[tokio::test]
    async fn all_updated_when_images_match() {
        let sim = fleet(vec![instance("i-a", "img-new"), instance("i-b", "img-new")]);
        let report = verify_group(&sim, &"web".to_string(), &"img-new".to_string())
            .await
            .unwrap();
        assert_eq!(report.entries.len(), 2);
        assert!(report.all_updated());
    }

    #[tokio::test]
    async fn mismatched_instance_is_flagged() {
        let sim = fleet(vec![instance("i-a", "img-new"), instance("i-b", "img-old")]);
        let report = verify_group(&sim, &"web".to_string(), &"img-new".to_string())
            .await
            .unwrap();
        assert!(!report.all_updated());
        let stale = report.entries.iter().find(|e| e.id == "i-b").unwrap();
        assert!(!stale.updated);
        assert_eq!(stale.image.as_deref(), Some("img-old"));
        assert_eq!(stale.lifecycle, Some(LifecycleState::InService));
    }

    #[tokio::test]
    async fn empty_group_is_not_all_updated() {
        let sim = fleet(vec![]);
        let report = verify_group(&sim, &"web".to_string(), &"img-new".to_string())
            .await
            .unwrap();
        assert!(report.entries.is_empty());
        assert!(!report.all_updated());
    }
}
