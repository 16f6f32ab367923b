//! Launch template preparation.
//!
//! Clones the group's active template with only the image substituted.
//! Template names are run-scoped and deterministic: `{source}-{run_id}-r{seq}`,
//! so a run never collides with prior templates and re-running with the
//! same run id reproduces the same names.

use tracing::info;

use fleetcycle_core::{FleetError, FleetGroup, ImageRef, LaunchTemplate, TemplateRef};
use fleetcycle_provider::FleetProvider;

use crate::error::{ReplaceError, ReplaceResult};

/// Produces run-scoped template names.
///
/// Each call to [`TemplateNamer::next_name`] advances the sequence, so
/// two preparations within one run yield distinct names.
#[derive(Debug)]
pub struct TemplateNamer {
    run_id: String,
    next_seq: u32,
}

impl TemplateNamer {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            next_seq: 0,
        }
    }

    /// Next template name derived from the source template's name.
    pub fn next_name(&mut self, source: &str) -> String {
        let seq = self.next_seq;
        self.next_seq += 1;
        format!("{source}-{}-r{seq}", self.run_id)
    }
}

/// Validate the target image and create the run's launch template.
///
/// Fails before any mutation if the image does not resolve. The new
/// template is identical to the group's active one in every field
/// except name and image. Not idempotent: each call creates a fresh
/// template under the next run-scoped name.
pub async fn prepare_template<P: FleetProvider>(
    provider: &P,
    group: &FleetGroup,
    image: &ImageRef,
    namer: &mut TemplateNamer,
) -> ReplaceResult<(TemplateRef, LaunchTemplate)> {
    let metadata = provider.get_image(image).await.map_err(|e| match e {
        FleetError::NotFound(_) => ReplaceError::ImageNotFound(image.clone()),
        other => ReplaceError::Provider(other),
    })?;

    let source = provider.get_launch_template(&group.launch_template).await?;
    let spec = source.with_image(namer.next_name(&source.name), image.clone());
    let tref = provider.create_launch_template(&spec).await?;

    info!(
        group = %group.name,
        template = %tref,
        name = %spec.name,
        image = %metadata.id,
        "created replacement launch template"
    );
    Ok((tref, spec))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_run_scoped_and_sequential() {
        let mut namer = TemplateNamer::new("deploy-42");
        assert_eq!(namer.next_name("web-v1"), "web-v1-deploy-42-r0");
        assert_eq!(namer.next_name("web-v1"), "web-v1-deploy-42-r1");
    }

    #[test]
    fn same_run_id_reproduces_names() {
        let mut a = TemplateNamer::new("deploy-42");
        let mut b = TemplateNamer::new("deploy-42");
        assert_eq!(a.next_name("web"), b.next_name("web"));
    }
}
