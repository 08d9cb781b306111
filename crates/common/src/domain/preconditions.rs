// State-dependent checks that run before a command is applied.

use serde_json::{json, Value};

use super::command::Command;
use super::constants::{ResourceType, LAYOUT_FOLDER_TYPE};
use super::errors::PreconditionError;
use super::model::ProjectState;
use super::operation::{present, Operation};

fn ensure(condition: bool, message: &str, details: Value) -> Result<(), PreconditionError> {
    if condition {
        Ok(())
    } else {
        Err(PreconditionError::new(message).with_details(details))
    }
}

fn scene_exists(state: &ProjectState, scene_id: &str) -> Result<(), PreconditionError> {
    ensure(state.scenes.contains_key(scene_id), "scene not found", json!({ "sceneId": scene_id }))
}

fn section_exists(state: &ProjectState, section_id: &str) -> Result<(), PreconditionError> {
    ensure(
        state.sections.contains_key(section_id),
        "section not found",
        json!({ "sectionId": section_id }),
    )
}

fn line_exists(state: &ProjectState, line_id: &str) -> Result<(), PreconditionError> {
    ensure(state.lines.contains_key(line_id), "line not found", json!({ "lineId": line_id }))
}

fn resource_exists(
    state: &ProjectState,
    kind: ResourceType,
    resource_id: &str,
) -> Result<(), PreconditionError> {
    ensure(
        state.resource(kind, resource_id).is_some(),
        "resource not found",
        json!({ "resourceType": kind, "resourceId": resource_id }),
    )
}

fn layout_exists(state: &ProjectState, layout_id: &str) -> Result<(), PreconditionError> {
    ensure(state.layouts.contains_key(layout_id), "layout not found", json!({ "layoutId": layout_id }))
}

fn element_exists(
    state: &ProjectState,
    layout_id: &str,
    element_id: &str,
) -> Result<(), PreconditionError> {
    layout_exists(state, layout_id)?;
    let found = state
        .layouts
        .get(layout_id)
        .is_some_and(|layout| layout.elements.contains_key(element_id));
    ensure(
        found,
        "layout element not found",
        json!({ "layoutId": layout_id, "elementId": element_id }),
    )
}

fn variable_exists(state: &ProjectState, variable_id: &str) -> Result<(), PreconditionError> {
    ensure(
        state.variables.contains(variable_id),
        "variable not found",
        json!({ "variableId": variable_id }),
    )
}

fn resource_parent_valid(
    state: &ProjectState,
    kind: ResourceType,
    resource_id: &str,
    parent_id: Option<&str>,
    moving: bool,
) -> Result<(), PreconditionError> {
    let Some(parent_id) = parent_id else {
        return Ok(());
    };
    let details = json!({ "resourceType": kind, "resourceId": resource_id, "parentId": parent_id });
    ensure(parent_id != resource_id, "resource cannot parent itself", details.clone())?;
    ensure(
        state.resource(kind, parent_id).is_some(),
        "resource parent not found",
        details.clone(),
    )?;
    if moving {
        let below = state
            .resource_collection(kind)
            .is_some_and(|collection| collection.is_descendant(resource_id, parent_id));
        ensure(!below, "resource cannot move under its own descendant", details)?;
    }
    Ok(())
}

fn variable_parent_valid(
    state: &ProjectState,
    variable_id: &str,
    parent_id: &str,
    moving: bool,
) -> Result<(), PreconditionError> {
    let details = json!({ "variableId": variable_id, "parentId": parent_id });
    ensure(parent_id != variable_id, "variable cannot parent itself", details.clone())?;
    ensure(state.variables.contains(parent_id), "variable parent not found", details.clone())?;
    if moving {
        ensure(
            !state.variables.is_descendant(variable_id, parent_id),
            "variable cannot move under its own descendant",
            details,
        )?;
    }
    Ok(())
}

fn layout_parent_valid(
    state: &ProjectState,
    layout_id: &str,
    parent_id: &str,
) -> Result<(), PreconditionError> {
    let details = json!({ "layoutId": layout_id, "parentId": parent_id });
    ensure(parent_id != layout_id, "layout cannot parent itself", details.clone())?;
    let Some(parent) = state.layouts.get(parent_id) else {
        return Err(PreconditionError::new("layout parent not found").with_details(details));
    };
    ensure(
        parent.layout_type == LAYOUT_FOLDER_TYPE,
        "layout parent must be folder",
        json!({ "layoutId": layout_id, "parentId": parent_id, "parentType": parent.layout_type }),
    )?;
    ensure(
        !state.is_layout_descendant(layout_id, parent_id),
        "layout cannot move under its own descendant",
        details,
    )
}

/// Fails on the first reason `command` cannot apply to `state`.
pub fn check_preconditions(
    state: &ProjectState,
    command: &Command,
    operation: &Operation,
) -> Result<(), PreconditionError> {
    if !state.project.id.is_empty() {
        ensure(
            state.project.id == command.project_id,
            "projectId mismatch",
            json!({ "expected": state.project.id, "got": command.project_id }),
        )?;
    }

    match operation {
        Operation::ProjectUpdate(_) => Ok(()),

        Operation::SceneCreate(p) => ensure(
            !state.scenes.contains_key(&p.scene_id),
            "scene already exists",
            json!({ "sceneId": p.scene_id }),
        ),
        Operation::SceneUpdate(p) => scene_exists(state, &p.scene_id),
        Operation::SceneRename(p) => scene_exists(state, &p.scene_id),
        Operation::SceneDelete(p) | Operation::SceneSetInitial(p) => scene_exists(state, &p.scene_id),
        Operation::SceneReorder(p) => scene_exists(state, &p.scene_id),

        Operation::SectionCreate(p) => {
            ensure(
                state.scenes.contains_key(&p.scene_id),
                "parent scene not found",
                json!({ "sceneId": p.scene_id }),
            )?;
            ensure(
                !state.sections.contains_key(&p.section_id),
                "section already exists",
                json!({ "sectionId": p.section_id }),
            )
        }
        Operation::SectionRename(p) => section_exists(state, &p.section_id),
        Operation::SectionDelete(p) => section_exists(state, &p.section_id),
        Operation::SectionReorder(p) => section_exists(state, &p.section_id),

        Operation::LineInsertAfter(p) => {
            section_exists(state, &p.section_id)?;
            ensure(
                !state.lines.contains_key(&p.line_id),
                "line already exists",
                json!({ "lineId": p.line_id }),
            )?;
            if let Some(after) = &p.after_line_id {
                let Some(anchor) = state.lines.get(after) else {
                    return Err(PreconditionError::new("afterLineId not found")
                        .with_details(json!({ "afterLineId": after })));
                };
                ensure(
                    anchor.section_id == p.section_id,
                    "afterLineId must belong to target section",
                    json!({
                        "afterLineId": after,
                        "sectionId": p.section_id,
                        "actualSectionId": anchor.section_id,
                    }),
                )?;
            }
            Ok(())
        }
        Operation::LineUpdateActions(p) => line_exists(state, &p.line_id),
        Operation::LineDelete(p) => line_exists(state, &p.line_id),
        Operation::LineMove(p) => {
            line_exists(state, &p.line_id)?;
            ensure(
                state.sections.contains_key(&p.to_section_id),
                "target section not found",
                json!({ "toSectionId": p.to_section_id }),
            )
        }

        Operation::ResourceCreate(p) => {
            ensure(
                state.resource(p.resource_type, &p.resource_id).is_none(),
                "resource already exists",
                json!({ "resourceType": p.resource_type, "resourceId": p.resource_id }),
            )?;
            resource_parent_valid(state, p.resource_type, &p.resource_id, present(&p.parent_id), false)
        }
        Operation::ResourceUpdate(p) => resource_exists(state, p.resource_type, &p.resource_id),
        Operation::ResourceRename(p) => resource_exists(state, p.resource_type, &p.resource_id),
        Operation::ResourceDelete(p) => resource_exists(state, p.resource_type, &p.resource_id),
        Operation::ResourceMove(p) => {
            resource_exists(state, p.resource_type, &p.resource_id)?;
            resource_parent_valid(state, p.resource_type, &p.resource_id, present(&p.parent_id), true)
        }
        Operation::ResourceDuplicate(p) => {
            ensure(
                state.resource(p.resource_type, &p.source_id).is_some(),
                "source resource not found",
                json!({ "resourceType": p.resource_type, "sourceId": p.source_id }),
            )?;
            ensure(
                state.resource(p.resource_type, &p.new_id).is_none(),
                "duplicate target id exists",
                json!({ "resourceType": p.resource_type, "newId": p.new_id }),
            )
        }

        Operation::LayoutCreate(p) => {
            ensure(
                !state.layouts.contains_key(&p.layout_id),
                "layout already exists",
                json!({ "layoutId": p.layout_id }),
            )?;
            match present(&p.parent_id) {
                Some(parent_id) => layout_parent_valid(state, &p.layout_id, parent_id),
                None => Ok(()),
            }
        }
        Operation::LayoutRename(p) => layout_exists(state, &p.layout_id),
        Operation::LayoutDelete(p) => layout_exists(state, &p.layout_id),
        Operation::LayoutReorder(p) => {
            layout_exists(state, &p.layout_id)?;
            match p.parent_id.as_ref().and_then(present) {
                Some(parent_id) => layout_parent_valid(state, &p.layout_id, parent_id),
                None => Ok(()),
            }
        }

        Operation::LayoutElementCreate(p) => {
            layout_exists(state, &p.layout_id)?;
            let layout = state.layouts.get(&p.layout_id);
            ensure(
                !layout.is_some_and(|layout| layout.elements.contains_key(&p.element_id)),
                "layout element already exists",
                json!({ "layoutId": p.layout_id, "elementId": p.element_id }),
            )?;
            if let Some(parent_id) = present(&p.parent_id) {
                ensure(
                    layout.is_some_and(|layout| layout.elements.contains_key(parent_id)),
                    "layout element parent not found",
                    json!({ "layoutId": p.layout_id, "elementId": p.element_id, "parentId": parent_id }),
                )?;
            }
            Ok(())
        }
        Operation::LayoutElementUpdate(p) => element_exists(state, &p.layout_id, &p.element_id),
        Operation::LayoutElementDelete(p) => element_exists(state, &p.layout_id, &p.element_id),
        Operation::LayoutElementMove(p) => {
            element_exists(state, &p.layout_id, &p.element_id)?;
            let Some(parent_id) = present(&p.parent_id) else {
                return Ok(());
            };
            let details =
                json!({ "layoutId": p.layout_id, "elementId": p.element_id, "parentId": parent_id });
            ensure(parent_id != p.element_id, "layout element cannot parent itself", details.clone())?;
            let Some(layout) = state.layouts.get(&p.layout_id) else {
                return Err(PreconditionError::new("layout not found").with_details(details));
            };
            ensure(
                layout.elements.contains_key(parent_id),
                "layout element parent not found",
                details.clone(),
            )?;
            ensure(
                !layout.is_element_descendant(&p.element_id, parent_id),
                "layout element cannot move under its own descendant",
                details,
            )
        }

        Operation::VariableCreate(p) => {
            ensure(
                !state.variables.contains(&p.variable_id),
                "variable already exists",
                json!({ "variableId": p.variable_id }),
            )?;
            match present(&p.parent_id) {
                Some(parent_id) => variable_parent_valid(state, &p.variable_id, parent_id, false),
                None => Ok(()),
            }
        }
        Operation::VariableUpdate(p) => {
            variable_exists(state, &p.variable_id)?;
            let current_type = state
                .variables
                .get(&p.variable_id)
                .map(|variable| variable.variable_type.as_str())
                .unwrap_or_default();
            for key in ["type", "variableType"] {
                if let Some(next) = p.patch.get(key) {
                    ensure(
                        next.as_str() == Some(current_type),
                        "variable type is immutable",
                        json!({ "variableId": p.variable_id, "currentType": current_type, "nextType": next }),
                    )?;
                }
            }
            if let Some(parent_id) = p.patch.get("parentId").and_then(Value::as_str) {
                variable_parent_valid(state, &p.variable_id, parent_id, true)?;
            }
            Ok(())
        }
        Operation::VariableDelete(p) => variable_exists(state, &p.variable_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::command::Actor;
    use crate::domain::constants::{CommandType, COMMAND_VERSION};
    use crate::domain::engine::process_command;
    use crate::domain::validate::validate_command;

    fn command(kind: &str, payload: Value) -> Command {
        Command {
            id: format!("cmd-{kind}"),
            project_id: "p1".into(),
            partition: "project:p1:story".into(),
            partitions: None,
            command_type: kind.into(),
            payload,
            actor: Actor::new("u1", "c1"),
            client_ts: 10,
            command_version: COMMAND_VERSION,
        }
    }

    fn apply(state: ProjectState, kind: &str, payload: Value) -> ProjectState {
        process_command(&state, &command(kind, payload)).unwrap().state
    }

    fn check(state: &ProjectState, kind: &str, payload: Value) -> Result<(), PreconditionError> {
        let command = command(kind, payload);
        let op = validate_command(&command).unwrap();
        check_preconditions(state, &command, &op)
    }

    fn story() -> ProjectState {
        let state = ProjectState::empty_at("p1", "Demo", "", 0);
        let state = apply(state, "scene.create", json!({ "sceneId": "scene-1", "name": "One" }));
        let state = apply(
            state,
            "section.create",
            json!({ "sectionId": "sec-1", "sceneId": "scene-1", "name": "A" }),
        );
        let state = apply(
            state,
            "section.create",
            json!({ "sectionId": "sec-2", "sceneId": "scene-1", "name": "B" }),
        );
        apply(state, "line.insert_after", json!({ "lineId": "line-1", "sectionId": "sec-1", "line": {} }))
    }

    #[test]
    fn project_id_must_match() {
        let state = story();
        let mut foreign = command("scene.delete", json!({ "sceneId": "scene-1" }));
        foreign.project_id = "p2".into();
        let op = Operation::decode(CommandType::SceneDelete, &foreign.payload).unwrap();
        let err = check_preconditions(&state, &foreign, &op).unwrap_err();
        assert_eq!(err.message, "projectId mismatch");
        assert_eq!(err.details["expected"], "p1");
    }

    #[test]
    fn duplicate_create_is_rejected() {
        let err = check(&story(), "scene.create", json!({ "sceneId": "scene-1", "name": "Again" }))
            .unwrap_err();
        assert_eq!(err.message, "scene already exists");
        assert_eq!(err.details["sceneId"], "scene-1");
    }

    #[test]
    fn targets_must_exist() {
        let state = story();
        assert_eq!(
            check(&state, "scene.rename", json!({ "sceneId": "nope", "name": "x" })).unwrap_err().message,
            "scene not found"
        );
        assert_eq!(
            check(&state, "line.move", json!({ "lineId": "line-1", "toSectionId": "gone", "index": 0 }))
                .unwrap_err()
                .message,
            "target section not found"
        );
        assert_eq!(
            check(&state, "section.create", json!({ "sectionId": "s9", "sceneId": "gone", "name": "x" }))
                .unwrap_err()
                .message,
            "parent scene not found"
        );
    }

    #[test]
    fn after_line_must_belong_to_target_section() {
        let err = check(
            &story(),
            "line.insert_after",
            json!({ "lineId": "line-2", "sectionId": "sec-2", "line": {}, "afterLineId": "line-1" }),
        )
        .unwrap_err();
        assert_eq!(err.message, "afterLineId must belong to target section");
        assert_eq!(err.details["actualSectionId"], "sec-1");
    }

    #[test]
    fn resource_parent_rules() {
        let state = ProjectState::empty_at("p1", "", "", 0);
        let state = apply(
            state,
            "resource.create",
            json!({ "resourceType": "images", "resourceId": "folder", "data": { "name": "F" } }),
        );
        let state = apply(
            state,
            "resource.create",
            json!({ "resourceType": "images", "resourceId": "img", "data": {}, "parentId": "folder" }),
        );

        let err = check(
            &state,
            "resource.create",
            json!({ "resourceType": "images", "resourceId": "x", "data": {}, "parentId": "ghost" }),
        )
        .unwrap_err();
        assert_eq!(err.message, "resource parent not found");

        let err = check(
            &state,
            "resource.move",
            json!({ "resourceType": "images", "resourceId": "folder", "index": 0, "parentId": "img" }),
        )
        .unwrap_err();
        assert_eq!(err.message, "resource cannot move under its own descendant");

        let err = check(
            &state,
            "resource.duplicate",
            json!({ "resourceType": "images", "sourceId": "img", "newId": "folder" }),
        )
        .unwrap_err();
        assert_eq!(err.message, "duplicate target id exists");
    }

    #[test]
    fn layout_element_move_cannot_create_cycle() {
        let state = ProjectState::empty_at("p1", "", "", 0);
        let state = apply(
            state,
            "layout.create",
            json!({ "layoutId": "L", "name": "Main", "layoutType": "normal" }),
        );
        let state = apply(
            state,
            "layout.element.create",
            json!({ "layoutId": "L", "elementId": "A", "element": {} }),
        );
        let state = apply(
            state,
            "layout.element.create",
            json!({ "layoutId": "L", "elementId": "B", "element": {}, "parentId": "A" }),
        );

        let err = check(
            &state,
            "layout.element.move",
            json!({ "layoutId": "L", "elementId": "A", "index": 0, "parentId": "B" }),
        )
        .unwrap_err();
        assert_eq!(err.message, "layout element cannot move under its own descendant");

        let err = check(
            &state,
            "layout.element.move",
            json!({ "layoutId": "L", "elementId": "A", "index": 0, "parentId": "A" }),
        )
        .unwrap_err();
        assert_eq!(err.message, "layout element cannot parent itself");
    }

    #[test]
    fn layout_parent_must_be_a_folder() {
        let state = ProjectState::empty_at("p1", "", "", 0);
        let state = apply(
            state,
            "layout.create",
            json!({ "layoutId": "plain", "name": "Plain", "layoutType": "normal" }),
        );
        let state = apply(
            state,
            "layout.create",
            json!({ "layoutId": "L", "name": "Main", "layoutType": "normal" }),
        );
        let err = check(&state, "layout.reorder", json!({ "layoutId": "L", "index": 0, "parentId": "plain" }))
            .unwrap_err();
        assert_eq!(err.message, "layout parent must be folder");
        assert_eq!(err.details["parentType"], "normal");
    }

    #[test]
    fn variable_type_is_immutable() {
        let state = apply(
            ProjectState::empty_at("p1", "", "", 0),
            "variable.create",
            json!({ "variableId": "v1", "name": "score", "variableType": "number", "initialValue": 0 }),
        );
        let err = check(&state, "variable.update", json!({ "variableId": "v1", "patch": { "type": "string" } }))
            .unwrap_err();
        assert_eq!(err.message, "variable type is immutable");

        check(&state, "variable.update", json!({ "variableId": "v1", "patch": { "type": "number" } }))
            .unwrap();
        let err = check(&state, "variable.update", json!({ "variableId": "v1", "patch": { "parentId": "v1" } }))
            .unwrap_err();
        assert_eq!(err.message, "variable cannot parent itself");
    }
}
