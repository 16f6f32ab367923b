//! Replacement controller — drives the rolling-replacement state machine.
//!
//! One instance at a time: grow the group by one, wait for the new
//! instance to register, shrink back to steady state, wait for every
//! snapshotted instance to settle healthy, then confirm that the
//! instance the provider removed was an old one. Exactly one cycle per
//! instance present at run start; instances added externally mid-run
//! are not accounted for.

use std::collections::BTreeSet;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use fleetcycle_core::{
    FleetError, GroupName, GroupUpdate, HealthStatus, ImageRef, InstanceId, LifecycleState,
    TemplateRef,
};
use fleetcycle_provider::FleetProvider;

use crate::error::{ReplaceError, ReplaceResult};
use crate::poll::{PollPolicy, poll_until};
use crate::template::{TemplateNamer, prepare_template};

/// Current phase of a replacement run.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ReplacePhase {
    /// Run not started.
    Idle,
    /// Requesting desired capacity steady+1.
    Growing { remaining: u32 },
    /// Waiting for group membership to reach steady+1.
    AwaitingNewInstanceRegistered,
    /// Waiting for every snapshotted instance to settle healthy.
    AwaitingNewInstanceHealthy,
    /// Requesting desired capacity back to steady state.
    Shrinking,
    /// Waiting for the terminated instance to leave the group.
    AwaitingOldInstanceTerminated,
    /// Every original instance has been cycled out.
    Done,
}

/// Parameters for one replacement run.
#[derive(Debug, Clone)]
pub struct ReplaceConfig {
    pub poll: PollPolicy,
    /// Run identifier used in template names.
    pub run_id: String,
}

impl Default for ReplaceConfig {
    fn default() -> Self {
        Self {
            poll: PollPolicy::default(),
            run_id: default_run_id(),
        }
    }
}

fn default_run_id() -> String {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("run{secs}")
}

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct ReplaceOutcome {
    /// Grow/shrink cycles performed (one per original instance).
    pub cycles: u32,
    /// The launch template created for this run.
    pub template_ref: TemplateRef,
    /// The group's steady-state desired capacity.
    pub steady_capacity: u32,
}

/// A rolling replacement of every instance in one scaling group.
///
/// The controller assumes it is the group's sole writer for the run's
/// duration; concurrent external capacity changes can desynchronize
/// its expectations.
#[derive(Debug)]
pub struct Replacement {
    group: GroupName,
    image: ImageRef,
    config: ReplaceConfig,
    phase: ReplacePhase,
    shutdown: watch::Receiver<bool>,
}

impl Replacement {
    /// Create a run. The `shutdown` receiver aborts the run at the
    /// next poll point when its value turns true.
    pub fn new(
        group: impl Into<GroupName>,
        image: impl Into<ImageRef>,
        config: ReplaceConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            group: group.into(),
            image: image.into(),
            config,
            phase: ReplacePhase::Idle,
            shutdown,
        }
    }

    /// Create a run with no external shutdown signal.
    pub fn detached(
        group: impl Into<GroupName>,
        image: impl Into<ImageRef>,
        config: ReplaceConfig,
    ) -> Self {
        let (_tx, rx) = watch::channel(false);
        Self::new(group, image, config, rx)
    }

    pub fn phase(&self) -> &ReplacePhase {
        &self.phase
    }

    /// Run the replacement to completion.
    pub async fn run<P: FleetProvider>(&mut self, provider: &P) -> ReplaceResult<ReplaceOutcome> {
        let group_name = self.group.clone();
        let image = self.image.clone();
        let poll = self.config.poll.clone();
        let mut shutdown = self.shutdown.clone();

        let group = provider.get_group(&group_name).await.map_err(|e| match e {
            FleetError::NotFound(_) => ReplaceError::GroupNotFound(group_name.clone()),
            other => ReplaceError::Provider(other),
        })?;

        let steady = group.desired_capacity;
        let mut remaining = group.instances.len() as u32;
        info!(
            group = %group_name,
            image = %image,
            steady,
            remaining,
            run_id = %self.config.run_id,
            "starting rolling replacement"
        );

        if remaining == 0 {
            self.phase = ReplacePhase::Done;
            info!(group = %group_name, "group has no instances, nothing to replace");
            return Ok(ReplaceOutcome {
                cycles: 0,
                template_ref: group.launch_template,
                steady_capacity: steady,
            });
        }

        let mut namer = TemplateNamer::new(self.config.run_id.clone());
        let (tref, _spec) = prepare_template(provider, &group, &image, &mut namer).await?;

        provider
            .update_group(&group_name, &GroupUpdate::launch_template(tref.clone()))
            .await?;

        // The provider rejects growth past max capacity, so raise the
        // ceiling first if the transient +1 would hit it. One-way
        // ratchet: never lowered back.
        if group.desired_capacity == group.max_capacity {
            let max = group.max_capacity + 1;
            provider
                .update_group(&group_name, &GroupUpdate::max_capacity(max))
                .await?;
            info!(group = %group_name, max, "raised max capacity for transient growth");
        }

        let mut cycles = 0u32;
        while remaining > 0 {
            self.phase = ReplacePhase::Growing { remaining };
            debug!(group = %group_name, remaining, "growing for next cycle");

            let before: BTreeSet<InstanceId> = provider
                .list_group_instances(&group_name)
                .await?
                .into_iter()
                .map(|m| m.id)
                .collect();

            provider
                .update_group(&group_name, &GroupUpdate::desired_capacity(steady + 1))
                .await?;

            self.phase = ReplacePhase::AwaitingNewInstanceRegistered;
            let snapshot: Vec<InstanceId> = poll_until(
                &poll,
                "new instance registration",
                &mut shutdown,
                async || {
                    let members = provider.list_group_instances(&group_name).await?;
                    if members.len() as u32 == steady + 1 {
                        Ok(Some(members.into_iter().map(|m| m.id).collect()))
                    } else {
                        Ok(None)
                    }
                },
            )
            .await?;

            // The departing instance is not chosen yet, so the snapshot
            // holds both old members and the new one.
            let new_ids: Vec<InstanceId> = snapshot
                .iter()
                .filter(|id| !before.contains(*id))
                .cloned()
                .collect();
            if new_ids.len() != 1 {
                warn!(
                    group = %group_name,
                    new = ?new_ids,
                    "expected exactly one new instance; group is being mutated externally"
                );
            }
            info!(group = %group_name, new = ?new_ids, "new instance registered");

            // Shrink right away: the provider picks one instance to
            // terminate, which its over-provisioning policy resolves
            // to a pre-existing one. Confirmed below, not trusted.
            self.phase = ReplacePhase::Shrinking;
            provider
                .update_group(&group_name, &GroupUpdate::desired_capacity(steady))
                .await?;

            self.phase = ReplacePhase::AwaitingNewInstanceHealthy;
            for id in &snapshot {
                poll_until(&poll, "instance health", &mut shutdown, async || {
                    instance_settled(provider, id).await
                })
                .await?;
            }
            debug!(group = %group_name, "all snapshotted instances settled");

            self.phase = ReplacePhase::AwaitingOldInstanceTerminated;
            let after: BTreeSet<InstanceId> = poll_until(
                &poll,
                "old instance termination",
                &mut shutdown,
                async || {
                    let members = provider.list_group_instances(&group_name).await?;
                    if members.len() as u32 == steady {
                        Ok(Some(members.into_iter().map(|m| m.id).collect()))
                    } else {
                        Ok(None)
                    }
                },
            )
            .await?;

            // Confirm the provider removed an old instance, not the
            // one just launched.
            let snapshot_set: BTreeSet<InstanceId> = snapshot.into_iter().collect();
            let removed: Vec<InstanceId> =
                snapshot_set.difference(&after).cloned().collect();
            if let Some(bad) = removed.iter().find(|id| new_ids.contains(id)) {
                return Err(ReplaceError::UnexpectedRemoval(bad.clone()));
            }
            if removed.is_empty() {
                return Err(ReplaceError::Inconsistent(format!(
                    "membership of {group_name} returned to {steady} but no snapshotted instance left"
                )));
            }

            remaining -= 1;
            cycles += 1;
            info!(
                group = %group_name,
                removed = ?removed,
                remaining,
                "instance cycle complete"
            );
        }

        self.phase = ReplacePhase::Done;
        info!(group = %group_name, cycles, "rolling replacement complete");
        Ok(ReplaceOutcome {
            cycles,
            template_ref: tref,
            steady_capacity: steady,
        })
    }
}

/// One health observation for a snapshotted instance.
///
/// Settles on `Healthy`, and also on gone / terminating: the instance
/// the provider chose to terminate can never report healthy again and
/// no longer matters to the cycle.
async fn instance_settled<P: FleetProvider>(
    provider: &P,
    id: &InstanceId,
) -> Result<Option<()>, FleetError> {
    match provider.get_instance_health(id).await {
        Ok(HealthStatus::Healthy | HealthStatus::Terminating) => Ok(Some(())),
        Ok(_) => match provider.get_instance_lifecycle(id).await {
            Ok(LifecycleState::Terminating | LifecycleState::Terminated) => Ok(Some(())),
            Ok(_) => Ok(None),
            Err(FleetError::NotFound(_)) => Ok(Some(())),
            Err(e) => Err(e),
        },
        Err(FleetError::NotFound(_)) => Ok(Some(())),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetcycle_core::{FleetGroup, ImageMetadata, InstanceRef, LaunchTemplate};
    use fleetcycle_provider::SimFleet;
    use std::time::Duration;

    fn fast_config() -> ReplaceConfig {
        ReplaceConfig {
            poll: PollPolicy {
                interval: Duration::from_millis(1),
                max_wait: Duration::from_millis(500),
                max_backoff: Duration::from_millis(4),
            },
            run_id: "t1".to_string(),
        }
    }

    fn template(name: &str, image: &str) -> LaunchTemplate {
        LaunchTemplate {
            name: name.to_string(),
            image: image.to_string(),
            instance_class: "c5.large".to_string(),
            subnets: vec!["subnet-a".to_string()],
            security_groups: vec!["sg-web".to_string()],
            block_devices: vec![],
            iam_profile: None,
            user_data: None,
            placement: None,
            spot_price: None,
        }
    }

    #[test]
    fn phase_serializes_roundtrip() {
        let phase = ReplacePhase::Growing { remaining: 3 };
        let json = serde_json::to_string(&phase).unwrap();
        let back: ReplacePhase = serde_json::from_str(&json).unwrap();
        assert_eq!(back, phase);
    }

    #[test]
    fn starts_idle() {
        let run = Replacement::detached("web", "img-new", fast_config());
        assert_eq!(*run.phase(), ReplacePhase::Idle);
    }

    #[tokio::test]
    async fn missing_group_aborts_before_any_mutation() {
        let sim = SimFleet::new().with_image(ImageMetadata {
            id: "img-new".to_string(),
            name: "base".to_string(),
            state: "available".to_string(),
        });
        let mut run = Replacement::detached("ghost", "img-new", fast_config());
        let err = run.run(&sim).await.unwrap_err();
        assert!(matches!(err, ReplaceError::GroupNotFound(_)));
        assert_eq!(sim.templates_created().await, 0);
        assert_eq!(sim.updates_applied().await, 0);
    }

    #[tokio::test]
    async fn missing_image_aborts_before_any_mutation() {
        let sim = SimFleet::new()
            .with_template("lt-web", template("web-v1", "img-old"))
            .with_group(FleetGroup {
                name: "web".to_string(),
                desired_capacity: 1,
                max_capacity: 2,
                min_capacity: 1,
                launch_template: "lt-web".to_string(),
                instances: vec![InstanceRef {
                    id: "i-a".to_string(),
                    image: "img-old".to_string(),
                    health: HealthStatus::Healthy,
                    lifecycle: LifecycleState::InService,
                }],
            });
        let mut run = Replacement::detached("web", "img-ghost", fast_config());
        let err = run.run(&sim).await.unwrap_err();
        assert!(matches!(err, ReplaceError::ImageNotFound(_)));
        assert_eq!(sim.templates_created().await, 0);
        assert_eq!(sim.updates_applied().await, 0);
    }

    #[tokio::test]
    async fn empty_group_completes_without_cycles() {
        let sim = SimFleet::new()
            .with_image(ImageMetadata {
                id: "img-new".to_string(),
                name: "base".to_string(),
                state: "available".to_string(),
            })
            .with_template("lt-web", template("web-v1", "img-old"))
            .with_group(FleetGroup {
                name: "web".to_string(),
                desired_capacity: 0,
                max_capacity: 2,
                min_capacity: 0,
                launch_template: "lt-web".to_string(),
                instances: vec![],
            });
        let mut run = Replacement::detached("web", "img-new", fast_config());
        let outcome = run.run(&sim).await.unwrap();
        assert_eq!(outcome.cycles, 0);
        assert_eq!(*run.phase(), ReplacePhase::Done);
        assert_eq!(sim.templates_created().await, 0);
    }
}
