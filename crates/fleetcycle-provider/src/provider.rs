//! The fleet provider capability set.

use fleetcycle_core::{
    FleetGroup, FleetResult, GroupName, GroupUpdate, HealthStatus, ImageMetadata, ImageRef,
    InstanceId, InstanceRef, LaunchTemplate, LifecycleState, TemplateRef,
};

/// Scaling-group and compute-instance management operations.
///
/// The provider is the source of truth: group membership and instance
/// health converge asynchronously after a mutation, so callers must
/// re-read rather than assume. Implementations are injected for
/// testability — the controller is generic over this trait.
pub trait FleetProvider: Send + Sync {
    /// Fetch a group by name. `NotFound` if no such group exists.
    fn get_group(
        &self,
        name: &GroupName,
    ) -> impl Future<Output = FleetResult<FleetGroup>> + Send;

    /// Resolve an image reference. `NotFound` if it does not resolve
    /// to a valid, accessible image.
    fn get_image(
        &self,
        image: &ImageRef,
    ) -> impl Future<Output = FleetResult<ImageMetadata>> + Send;

    /// Fetch a launch template by reference.
    fn get_launch_template(
        &self,
        tref: &TemplateRef,
    ) -> impl Future<Output = FleetResult<LaunchTemplate>> + Send;

    /// Create a new launch template; returns its reference.
    fn create_launch_template(
        &self,
        spec: &LaunchTemplate,
    ) -> impl Future<Output = FleetResult<TemplateRef>> + Send;

    /// Apply a partial update to a group.
    fn update_group(
        &self,
        name: &GroupName,
        update: &GroupUpdate,
    ) -> impl Future<Output = FleetResult<()>> + Send;

    /// List the group's current member instances.
    fn list_group_instances(
        &self,
        name: &GroupName,
    ) -> impl Future<Output = FleetResult<Vec<InstanceRef>>> + Send;

    /// Observed health of one instance. `NotFound` once the instance
    /// has left the group.
    fn get_instance_health(
        &self,
        id: &InstanceId,
    ) -> impl Future<Output = FleetResult<HealthStatus>> + Send;

    /// Image the instance is currently running.
    fn get_instance_image(
        &self,
        id: &InstanceId,
    ) -> impl Future<Output = FleetResult<ImageRef>> + Send;

    /// Observed lifecycle phase of one instance.
    fn get_instance_lifecycle(
        &self,
        id: &InstanceId,
    ) -> impl Future<Output = FleetResult<LifecycleState>> + Send;
}
