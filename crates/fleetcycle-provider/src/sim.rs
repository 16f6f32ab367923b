//! Deterministic in-memory fleet, for tests and dry runs.
//!
//! `SimFleet` models the provider's eventually-consistent behavior
//! without timers: every read observation advances pending transitions
//! by one tick. A launch appears after [`LAUNCH_DELAY`] observations,
//! a provisioning instance turns healthy after [`HEALTH_DELAY`], and
//! a scale-down victim is marked terminating and then removed after
//! [`TERM_DELAY`]. Mutations apply immediately; convergence happens on
//! observation, so test runs are fully deterministic.
//!
//! Fault knobs cover the failure scenarios the controller must handle:
//! `stall_health` keeps newly launched instances provisioning forever,
//! and `terminate_newest` makes the scale-down victim selection pick
//! the just-launched instance instead of an old one.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::debug;

use fleetcycle_core::{
    FleetError, FleetGroup, FleetResult, GroupName, GroupUpdate, HealthStatus, ImageMetadata,
    ImageRef, InstanceId, InstanceRef, LaunchTemplate, LifecycleState, TemplateRef,
};

use crate::provider::FleetProvider;

/// Observations before a requested instance joins the group.
const LAUNCH_DELAY: u32 = 2;
/// Observations before a provisioning instance reports healthy.
const HEALTH_DELAY: u32 = 2;
/// Observations before a terminating instance leaves the group.
const TERM_DELAY: u32 = 2;

#[derive(Debug)]
struct SimInstance {
    id: InstanceId,
    image: ImageRef,
    health: HealthStatus,
    lifecycle: LifecycleState,
    /// Launch order, for victim selection.
    seq: u32,
    boot_ticks: u32,
    term_ticks: u32,
    /// Never progresses past provisioning (fault injection).
    stalled: bool,
}

#[derive(Debug)]
struct SimGroup {
    name: GroupName,
    desired: u32,
    max: u32,
    min: u32,
    launch_template: TemplateRef,
    instances: Vec<SimInstance>,
    launch_ticks: u32,
}

impl SimGroup {
    /// Instances counted toward capacity (terminating ones are not).
    fn counted(&self) -> u32 {
        self.instances
            .iter()
            .filter(|i| {
                matches!(
                    i.lifecycle,
                    LifecycleState::Pending | LifecycleState::InService
                )
            })
            .count() as u32
    }
}

#[derive(Debug, Default)]
struct SimState {
    groups: HashMap<GroupName, SimGroup>,
    templates: HashMap<TemplateRef, LaunchTemplate>,
    images: HashMap<ImageRef, ImageMetadata>,
    template_seq: u32,
    instance_seq: u32,
    templates_created: u32,
    updates_applied: u32,
    stall_health: bool,
    terminate_newest: bool,
}

impl SimState {
    /// Advance every group's pending transitions by one tick.
    fn tick(&mut self) {
        let stall = self.stall_health;
        let newest_first = self.terminate_newest;
        let mut spawns: Vec<(GroupName, ImageRef)> = Vec::new();

        for group in self.groups.values_mut() {
            // Pending launch.
            if group.counted() < group.desired {
                group.launch_ticks += 1;
                if group.launch_ticks >= LAUNCH_DELAY {
                    group.launch_ticks = 0;
                    let image = self
                        .templates
                        .get(&group.launch_template)
                        .map(|t| t.image.clone())
                        .unwrap_or_else(|| "img-unknown".to_string());
                    spawns.push((group.name.clone(), image));
                }
            } else {
                group.launch_ticks = 0;
            }

            // Provisioning instances boot toward healthy.
            for inst in &mut group.instances {
                if inst.lifecycle == LifecycleState::Pending && !inst.stalled {
                    inst.boot_ticks += 1;
                    if inst.boot_ticks >= HEALTH_DELAY {
                        inst.health = HealthStatus::Healthy;
                        inst.lifecycle = LifecycleState::InService;
                        debug!(id = %inst.id, "sim instance in service");
                    }
                }
            }

            // Over capacity: pick a victim the way the provider policy
            // would — oldest instance not running the active template's
            // image (or, in fault mode, the newest instance).
            if group.counted() > group.desired {
                let active_image = self
                    .templates
                    .get(&group.launch_template)
                    .map(|t| t.image.clone());
                let victim = select_victim(&mut group.instances, active_image, newest_first);
                if let Some(inst) = victim {
                    inst.lifecycle = LifecycleState::Terminating;
                    inst.health = HealthStatus::Terminating;
                    debug!(id = %inst.id, "sim instance terminating");
                }
            }

            // Terminating instances drain out.
            for inst in &mut group.instances {
                if inst.lifecycle == LifecycleState::Terminating {
                    inst.term_ticks += 1;
                }
            }
            group
                .instances
                .retain(|i| !(i.lifecycle == LifecycleState::Terminating && i.term_ticks >= TERM_DELAY));
        }

        for (name, image) in spawns {
            self.instance_seq += 1;
            let id = format!("i-{:04}", self.instance_seq);
            let seq = self.instance_seq;
            if let Some(group) = self.groups.get_mut(&name) {
                debug!(%id, group = %name, %image, "sim instance launched");
                group.instances.push(SimInstance {
                    id,
                    image,
                    health: HealthStatus::Provisioning,
                    lifecycle: LifecycleState::Pending,
                    seq,
                    boot_ticks: 0,
                    term_ticks: 0,
                    stalled: stall,
                });
            }
        }
    }

    fn find_instance(&self, id: &InstanceId) -> Option<&SimInstance> {
        self.groups
            .values()
            .flat_map(|g| g.instances.iter())
            .find(|i| &i.id == id)
    }
}

fn select_victim<'a>(
    instances: &'a mut [SimInstance],
    active_image: Option<ImageRef>,
    newest_first: bool,
) -> Option<&'a mut SimInstance> {
    let candidates = instances.iter_mut().filter(|i| {
        matches!(
            i.lifecycle,
            LifecycleState::Pending | LifecycleState::InService
        )
    });
    if newest_first {
        candidates.max_by_key(|i| i.seq)
    } else {
        // Prefer the oldest instance still on a stale image.
        let mut best: Option<&mut SimInstance> = None;
        for inst in candidates {
            let stale = active_image.as_ref().is_none_or(|img| &inst.image != img);
            let better = match &best {
                None => true,
                Some(b) => {
                    let b_stale = active_image.as_ref().is_none_or(|img| &b.image != img);
                    (stale && !b_stale) || (stale == b_stale && inst.seq < b.seq)
                }
            };
            if better {
                best = Some(inst);
            }
        }
        best
    }
}

/// In-memory fleet provider with deterministic lazy convergence.
#[derive(Debug, Default)]
pub struct SimFleet {
    state: Mutex<SimState>,
}

impl SimFleet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an image.
    pub fn with_image(mut self, image: ImageMetadata) -> Self {
        let state = self.state.get_mut();
        state.images.insert(image.id.clone(), image);
        self
    }

    /// Register a launch template under a fixed reference.
    pub fn with_template(mut self, tref: impl Into<TemplateRef>, template: LaunchTemplate) -> Self {
        self.state.get_mut().templates.insert(tref.into(), template);
        self
    }

    /// Register a group; its member `InstanceRef`s seed sim instances.
    pub fn with_group(mut self, group: FleetGroup) -> Self {
        let state = self.state.get_mut();
        let mut instances = Vec::new();
        for r in &group.instances {
            state.instance_seq += 1;
            instances.push(SimInstance {
                id: r.id.clone(),
                image: r.image.clone(),
                health: r.health,
                lifecycle: r.lifecycle,
                seq: state.instance_seq,
                boot_ticks: 0,
                term_ticks: 0,
                stalled: false,
            });
        }
        state.groups.insert(
            group.name.clone(),
            SimGroup {
                name: group.name,
                desired: group.desired_capacity,
                max: group.max_capacity,
                min: group.min_capacity,
                launch_template: group.launch_template,
                instances,
                launch_ticks: 0,
            },
        );
        self
    }

    /// Newly launched instances never leave provisioning.
    pub fn stall_health(mut self, on: bool) -> Self {
        self.state.get_mut().stall_health = on;
        self
    }

    /// Scale-down victim selection picks the newest instance.
    pub fn terminate_newest(mut self, on: bool) -> Self {
        self.state.get_mut().terminate_newest = on;
        self
    }

    /// Number of launch templates created through the provider.
    pub async fn templates_created(&self) -> u32 {
        self.state.lock().await.templates_created
    }

    /// Number of group updates applied.
    pub async fn updates_applied(&self) -> u32 {
        self.state.lock().await.updates_applied
    }

    /// Current max capacity of a group (test inspection).
    pub async fn group_max(&self, name: &str) -> Option<u32> {
        self.state.lock().await.groups.get(name).map(|g| g.max)
    }

    /// Current images of a group's members (test inspection).
    pub async fn group_images(&self, name: &str) -> Vec<ImageRef> {
        self.state
            .lock()
            .await
            .groups
            .get(name)
            .map(|g| g.instances.iter().map(|i| i.image.clone()).collect())
            .unwrap_or_default()
    }
}

impl FleetProvider for SimFleet {
    async fn get_group(&self, name: &GroupName) -> FleetResult<FleetGroup> {
        let mut state = self.state.lock().await;
        state.tick();
        let group = state
            .groups
            .get(name)
            .ok_or_else(|| FleetError::NotFound(format!("group {name}")))?;
        Ok(FleetGroup {
            name: group.name.clone(),
            desired_capacity: group.desired,
            max_capacity: group.max,
            min_capacity: group.min,
            launch_template: group.launch_template.clone(),
            instances: group
                .instances
                .iter()
                .map(|i| InstanceRef {
                    id: i.id.clone(),
                    image: i.image.clone(),
                    health: i.health,
                    lifecycle: i.lifecycle,
                })
                .collect(),
        })
    }

    async fn get_image(&self, image: &ImageRef) -> FleetResult<ImageMetadata> {
        let state = self.state.lock().await;
        state
            .images
            .get(image)
            .cloned()
            .ok_or_else(|| FleetError::NotFound(format!("image {image}")))
    }

    async fn get_launch_template(&self, tref: &TemplateRef) -> FleetResult<LaunchTemplate> {
        let state = self.state.lock().await;
        state
            .templates
            .get(tref)
            .cloned()
            .ok_or_else(|| FleetError::NotFound(format!("launch template {tref}")))
    }

    async fn create_launch_template(&self, spec: &LaunchTemplate) -> FleetResult<TemplateRef> {
        let mut state = self.state.lock().await;
        if state.templates.values().any(|t| t.name == spec.name) {
            return Err(FleetError::Rejected(format!(
                "launch template name already exists: {}",
                spec.name
            )));
        }
        state.template_seq += 1;
        state.templates_created += 1;
        let tref = format!("lt-{:04}", state.template_seq);
        state.templates.insert(tref.clone(), spec.clone());
        Ok(tref)
    }

    async fn update_group(&self, name: &GroupName, update: &GroupUpdate) -> FleetResult<()> {
        let mut state = self.state.lock().await;
        let Some(group) = state.groups.get_mut(name) else {
            return Err(FleetError::NotFound(format!("group {name}")));
        };
        if let Some(desired) = update.desired_capacity {
            let max = update.max_capacity.unwrap_or(group.max);
            if desired > max {
                return Err(FleetError::Rejected(format!(
                    "desired capacity {desired} exceeds max {max}"
                )));
            }
            group.desired = desired;
        }
        if let Some(max) = update.max_capacity {
            group.max = max;
        }
        if let Some(tref) = &update.launch_template {
            group.launch_template = tref.clone();
        }
        state.updates_applied += 1;
        Ok(())
    }

    async fn list_group_instances(&self, name: &GroupName) -> FleetResult<Vec<InstanceRef>> {
        let group = self.get_group(name).await?;
        Ok(group.instances)
    }

    async fn get_instance_health(&self, id: &InstanceId) -> FleetResult<HealthStatus> {
        let mut state = self.state.lock().await;
        state.tick();
        state
            .find_instance(id)
            .map(|i| i.health)
            .ok_or_else(|| FleetError::NotFound(format!("instance {id}")))
    }

    async fn get_instance_image(&self, id: &InstanceId) -> FleetResult<ImageRef> {
        let mut state = self.state.lock().await;
        state.tick();
        state
            .find_instance(id)
            .map(|i| i.image.clone())
            .ok_or_else(|| FleetError::NotFound(format!("instance {id}")))
    }

    async fn get_instance_lifecycle(&self, id: &InstanceId) -> FleetResult<LifecycleState> {
        let mut state = self.state.lock().await;
        state.tick();
        state
            .find_instance(id)
            .map(|i| i.lifecycle)
            .ok_or_else(|| FleetError::NotFound(format!("instance {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn instance(id: &str, image: &str) -> InstanceRef {
        InstanceRef {
            id: id.to_string(),
            image: image.to_string(),
            health: HealthStatus::Healthy,
            lifecycle: LifecycleState::InService,
        }
    }

    fn fleet() -> SimFleet {
        SimFleet::new()
            .with_image(ImageMetadata {
                id: "img-old".to_string(),
                name: "base-2025-01".to_string(),
                state: "available".to_string(),
            })
            .with_template("lt-web", template("web-v1", "img-old"))
            .with_group(FleetGroup {
                name: "web".to_string(),
                desired_capacity: 2,
                max_capacity: 4,
                min_capacity: 1,
                launch_template: "lt-web".to_string(),
                instances: vec![instance("i-a", "img-old"), instance("i-b", "img-old")],
            })
    }

    #[tokio::test]
    async fn grow_launches_after_delay() {
        let sim = fleet();
        sim.update_group(&"web".to_string(), &GroupUpdate::desired_capacity(3))
            .await
            .unwrap();

        // Not there on the first observation.
        let members = sim.list_group_instances(&"web".to_string()).await.unwrap();
        assert_eq!(members.len(), 2);

        // Appears after LAUNCH_DELAY observations, provisioning.
        let members = sim.list_group_instances(&"web".to_string()).await.unwrap();
        assert_eq!(members.len(), 3);
        assert_eq!(members[2].health, HealthStatus::Provisioning);
    }

    #[tokio::test]
    async fn provisioning_instance_turns_healthy() {
        let sim = fleet();
        let name = "web".to_string();
        sim.update_group(&name, &GroupUpdate::desired_capacity(3))
            .await
            .unwrap();

        let mut last = HealthStatus::Unknown;
        for _ in 0..8 {
            let members = sim.list_group_instances(&name).await.unwrap();
            if let Some(newest) = members.iter().find(|i| i.id.starts_with("i-0")) {
                last = newest.health;
                if last == HealthStatus::Healthy {
                    break;
                }
            }
        }
        assert_eq!(last, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn shrink_removes_stale_image_instance_first() {
        let sim = fleet()
            .with_template("lt-web-new", template("web-v2", "img-new"));
        let name = "web".to_string();
        sim.update_group(&name, &GroupUpdate::launch_template("lt-web-new"))
            .await
            .unwrap();
        sim.update_group(&name, &GroupUpdate::desired_capacity(1))
            .await
            .unwrap();

        // Drain until one member remains.
        let mut members = Vec::new();
        for _ in 0..10 {
            members = sim.list_group_instances(&name).await.unwrap();
            if members.len() == 1 {
                break;
            }
        }
        assert_eq!(members.len(), 1);
        // The oldest stale-image instance (i-a) went first.
        assert_eq!(members[0].id, "i-b");
    }

    #[tokio::test]
    async fn desired_above_max_is_rejected() {
        let sim = fleet();
        let err = sim
            .update_group(&"web".to_string(), &GroupUpdate::desired_capacity(5))
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::Rejected(_)));
    }

    #[tokio::test]
    async fn duplicate_template_name_is_rejected() {
        let sim = fleet();
        let spec = template("web-v1", "img-new");
        let err = sim.create_launch_template(&spec).await.unwrap_err();
        assert!(matches!(err, FleetError::Rejected(_)));
    }

    #[tokio::test]
    async fn missing_instance_reports_not_found() {
        let sim = fleet();
        let err = sim
            .get_instance_health(&"i-nope".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::NotFound(_)));
    }

    #[tokio::test]
    async fn stalled_instance_never_leaves_provisioning() {
        let sim = fleet().stall_health(true);
        let name = "web".to_string();
        sim.update_group(&name, &GroupUpdate::desired_capacity(3))
            .await
            .unwrap();

        for _ in 0..10 {
            let _ = sim.list_group_instances(&name).await.unwrap();
        }
        let members = sim.list_group_instances(&name).await.unwrap();
        let newest = members.iter().find(|i| i.id.starts_with("i-0")).unwrap();
        assert_eq!(newest.health, HealthStatus::Provisioning);
    }
}
