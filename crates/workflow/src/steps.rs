use serde::{Deserialize, Serialize};

use crate::{Artifact, Project, WorkflowError};

/// Ordered pipeline stages. Forward movement requires the prior stage's
/// artifact; backward movement cascade-clears everything downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Upload,
    Crop,
    Colorize,
    Animate,
}

impl Step {
    pub const ALL: [Step; 4] = [Step::Upload, Step::Crop, Step::Colorize, Step::Animate];

    pub fn next(&self) -> Option<Step> {
        match self {
            Step::Upload => Some(Step::Crop),
            Step::Crop => Some(Step::Colorize),
            Step::Colorize => Some(Step::Animate),
            Step::Animate => None,
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::Upload => write!(f, "upload"),
            Step::Crop => write!(f, "crop"),
            Step::Colorize => write!(f, "colorize"),
            Step::Animate => write!(f, "animate"),
        }
    }
}

/// The artifact a completed stage action hands to `advance`.
#[derive(Debug, Clone)]
pub enum StageArtifact {
    Image(Artifact),
    SelectedPanel(Artifact),
    ColorizedPanel(Artifact),
}

impl StageArtifact {
    fn kind(&self) -> &'static str {
        match self {
            Self::Image(_) => "image",
            Self::SelectedPanel(_) => "selected_panel",
            Self::ColorizedPanel(_) => "colorized_panel",
        }
    }
}

/// Project fields that can be cascade-cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Image,
    Panels,
    SelectedPanel,
    ColorizedPanel,
}

/// Retreat target → fields downstream of it. Keeping this as a table makes
/// the artifact invariant chain mechanically checkable: every entry clears a
/// suffix of the dependency chain.
const CLEAR_ON_RETREAT: &[(Step, &[Field])] = &[
    (
        Step::Upload,
        &[
            Field::Image,
            Field::Panels,
            Field::SelectedPanel,
            Field::ColorizedPanel,
        ],
    ),
    (Step::Crop, &[Field::SelectedPanel, Field::ColorizedPanel]),
    (Step::Colorize, &[Field::ColorizedPanel]),
    (Step::Animate, &[]),
];

/// Steps currently unreachable for this project, derived from which artifact
/// fields are populated.
pub fn blocked_steps(project: &Project) -> Vec<Step> {
    let mut blocked = Vec::new();
    if project.image.is_none() {
        blocked.extend([Step::Crop, Step::Colorize, Step::Animate]);
    }
    if project.panels.is_empty() || project.selected_panel.is_none() {
        blocked.extend([Step::Colorize, Step::Animate]);
    }
    if project.colorized_panel.is_none() {
        blocked.push(Step::Animate);
    }
    blocked.sort();
    blocked.dedup();
    blocked
}

/// Record the detected panels for the crop stage. Does not move the step:
/// crop completes only once a panel is selected.
pub fn set_panels(project: &mut Project, panels: Vec<Artifact>) -> Result<(), WorkflowError> {
    if project.image.is_none() {
        return Err(WorkflowError::StepBlocked {
            target: Step::Crop,
            reason: "no image uploaded".into(),
        });
    }
    project.panels = panels;
    project.selected_panel = None;
    project.colorized_panel = None;
    Ok(())
}

/// Complete the current stage with its artifact and move forward exactly one
/// step. The artifact kind must match the stage being completed.
pub fn advance(project: &mut Project, artifact: StageArtifact) -> Result<(), WorkflowError> {
    match (project.current_step, artifact) {
        (Step::Upload, StageArtifact::Image(image)) => {
            // Replacing the page invalidates everything derived from it.
            project.image = Some(image);
            project.panels.clear();
            project.selected_panel = None;
            project.colorized_panel = None;
            project.current_step = Step::Crop;
        }
        (Step::Crop, StageArtifact::SelectedPanel(panel)) => {
            if project.panels.is_empty() {
                return Err(WorkflowError::StepBlocked {
                    target: Step::Colorize,
                    reason: "no panels detected".into(),
                });
            }
            project.selected_panel = Some(panel);
            project.colorized_panel = None;
            project.current_step = Step::Colorize;
        }
        (Step::Colorize, StageArtifact::ColorizedPanel(panel)) => {
            if project.selected_panel.is_none() {
                return Err(WorkflowError::StepBlocked {
                    target: Step::Animate,
                    reason: "no panel selected".into(),
                });
            }
            project.colorized_panel = Some(panel);
            project.current_step = Step::Animate;
        }
        (step, artifact) => {
            return Err(WorkflowError::ArtifactMismatch {
                step,
                got: artifact.kind(),
            })
        }
    }
    debug_assert!(project.check_invariants().is_ok());
    Ok(())
}

/// Move backward to `target`, clearing every artifact field downstream of it
/// per the retreat table. Forward or same-step "retreats" are rejected.
pub fn retreat(project: &mut Project, target: Step) -> Result<(), WorkflowError> {
    if target >= project.current_step {
        return Err(WorkflowError::InvalidTransition {
            from: project.current_step,
            to: target,
        });
    }
    let fields = CLEAR_ON_RETREAT
        .iter()
        .find(|(step, _)| *step == target)
        .map(|(_, fields)| *fields)
        .unwrap_or(&[]);
    for field in fields {
        match field {
            Field::Image => project.image = None,
            Field::Panels => project.panels.clear(),
            Field::SelectedPanel => project.selected_panel = None,
            Field::ColorizedPanel => project.colorized_panel = None,
        }
    }
    project.current_step = target;
    debug_assert!(project.check_invariants().is_ok());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Artifact;

    fn project_at_animate() -> Project {
        let mut project = Project::new("Page 1");
        advance(
            &mut project,
            StageArtifact::Image(Artifact::local("data:image/png;base64,PAGE")),
        )
        .unwrap();
        set_panels(
            &mut project,
            vec![
                Artifact::remote("data:image/png;base64,AAA"),
                Artifact::remote("data:image/png;base64,BBB"),
            ],
        )
        .unwrap();
        advance(
            &mut project,
            StageArtifact::SelectedPanel(Artifact::remote("data:image/png;base64,BBB")),
        )
        .unwrap();
        advance(
            &mut project,
            StageArtifact::ColorizedPanel(Artifact::remote("data:image/png;base64,CCC")),
        )
        .unwrap();
        project
    }

    #[test]
    fn test_blocked_steps_for_empty_project() {
        let project = Project::new("Page 1");
        assert_eq!(
            blocked_steps(&project),
            vec![Step::Crop, Step::Colorize, Step::Animate]
        );
    }

    #[test]
    fn test_blocked_steps_unlock_progressively() {
        let mut project = Project::new("Page 1");
        advance(
            &mut project,
            StageArtifact::Image(Artifact::local("data:image/png;base64,PAGE")),
        )
        .unwrap();
        assert_eq!(blocked_steps(&project), vec![Step::Colorize, Step::Animate]);

        set_panels(&mut project, vec![Artifact::remote("data:image/png;base64,AAA")]).unwrap();
        // Panels alone do not unlock colorize; a selection is required.
        assert_eq!(blocked_steps(&project), vec![Step::Colorize, Step::Animate]);

        advance(
            &mut project,
            StageArtifact::SelectedPanel(Artifact::remote("data:image/png;base64,AAA")),
        )
        .unwrap();
        assert_eq!(blocked_steps(&project), vec![Step::Animate]);

        advance(
            &mut project,
            StageArtifact::ColorizedPanel(Artifact::remote("data:image/png;base64,CCC")),
        )
        .unwrap();
        assert!(blocked_steps(&project).is_empty());
    }

    #[test]
    fn test_advance_moves_exactly_one_step() {
        let mut project = Project::new("Page 1");
        advance(
            &mut project,
            StageArtifact::Image(Artifact::local("data:image/png;base64,PAGE")),
        )
        .unwrap();
        assert_eq!(project.current_step, Step::Crop);
    }

    #[test]
    fn test_advance_rejects_wrong_artifact_kind() {
        let mut project = Project::new("Page 1");
        let err = advance(
            &mut project,
            StageArtifact::ColorizedPanel(Artifact::remote("data:image/png;base64,CCC")),
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::ArtifactMismatch { .. }));
    }

    #[test]
    fn test_retreat_to_crop_clears_selection_and_colorized() {
        let mut project = project_at_animate();
        retreat(&mut project, Step::Crop).unwrap();
        assert_eq!(project.current_step, Step::Crop);
        assert!(project.selected_panel.is_none());
        assert!(project.colorized_panel.is_none());
        // Detected panels survive so the user can pick a different one.
        assert_eq!(project.panels.len(), 2);
        assert!(project.image.is_some());
    }

    #[test]
    fn test_retreat_to_colorize_clears_only_colorized() {
        let mut project = project_at_animate();
        let selected = project.selected_panel.clone();
        retreat(&mut project, Step::Colorize).unwrap();
        assert!(project.colorized_panel.is_none());
        assert_eq!(project.selected_panel, selected);
    }

    #[test]
    fn test_retreat_to_upload_clears_everything() {
        let mut project = project_at_animate();
        retreat(&mut project, Step::Upload).unwrap();
        assert!(project.image.is_none());
        assert!(project.panels.is_empty());
        assert!(project.selected_panel.is_none());
        assert!(project.colorized_panel.is_none());
        assert!(project.check_invariants().is_ok());
    }

    #[test]
    fn test_retreat_forward_is_rejected() {
        let mut project = Project::new("Page 1");
        let err = retreat(&mut project, Step::Animate).unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
    }

    #[test]
    fn test_reupload_resets_downstream_fields() {
        let mut project = project_at_animate();
        retreat(&mut project, Step::Upload).unwrap();
        advance(
            &mut project,
            StageArtifact::Image(Artifact::local("data:image/png;base64,PAGE2")),
        )
        .unwrap();
        assert!(project.panels.is_empty());
        assert!(project.colorized_panel.is_none());
        assert_eq!(project.current_step, Step::Crop);
    }

    #[test]
    fn test_clear_table_clears_suffixes_of_dependency_chain() {
        // Each retreat target must clear a contiguous suffix of
        // [image, panels, selected, colorized]; anything else would let the
        // invariant chain break.
        for (_, fields) in CLEAR_ON_RETREAT {
            if let Some(first) = fields.first() {
                let order = [
                    Field::Image,
                    Field::Panels,
                    Field::SelectedPanel,
                    Field::ColorizedPanel,
                ];
                let start = order.iter().position(|f| f == first).unwrap();
                assert_eq!(*fields, &order[start..]);
            }
        }
    }
}
