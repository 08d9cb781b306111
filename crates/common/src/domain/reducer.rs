// Applies domain events to the project aggregate.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde_json::{Map, Value};

use super::command::DomainEvent;
use super::constants::EventType;
use super::errors::ReducerError;
use super::model::{
    touch_updated_at, Layout, LayoutElement, Line, ProjectState, Resource, Scene, Section,
    Timestamp, Variable,
};
use super::operation::{self as op, present, LegacyElements, Operation};
use super::utils::{
    apply_patch, insert_at_index, insert_stable, normalize_index, remove_from,
    upsert_no_duplicate, PatchMode,
};

const PROJECT_PROTECTED: &[&str] = &["id", "createdAt", "updatedAt"];
const SCENE_PROTECTED: &[&str] = &["id", "sectionIds", "createdAt", "updatedAt"];
const RESOURCE_PROTECTED: &[&str] = &["id", "parentId", "createdAt", "updatedAt"];
const ELEMENT_PROTECTED: &[&str] = &["id", "parentId", "children"];
const VARIABLE_PROTECTED: &[&str] = &["id", "itemType", "type", "createdAt", "updatedAt"];
const LAYOUT_RESERVED: &[&str] = &[
    "id",
    "name",
    "layoutType",
    "parentId",
    "elements",
    "rootElementOrder",
    "createdAt",
    "updatedAt",
];

fn entry_mut<'a, T: Clone>(
    map: &'a mut BTreeMap<String, Arc<T>>,
    kind: &'static str,
    id: &str,
) -> Result<&'a mut T, ReducerError> {
    map.get_mut(id)
        .map(Arc::make_mut)
        .ok_or_else(|| ReducerError::MissingEntity { kind, id: id.to_string() })
}

fn without_keys(source: &Map<String, Value>, reserved: &[&str]) -> Map<String, Value> {
    source
        .iter()
        .filter(|(key, _)| !reserved.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Explicit index when given, otherwise stable by `(createdAt, id)`.
fn place<F>(list: &mut Vec<String>, id: &str, index: Option<i64>, created_at: Timestamp, key_of: F)
where
    F: Fn(&str) -> Option<i64>,
{
    match index {
        Some(_) => upsert_no_duplicate(list, id.to_string(), normalize_index(index)),
        None => insert_stable(list, id.to_string(), created_at, key_of),
    }
}

/// Parses, decodes and applies one event. `event.meta.ts` is the logical clock.
pub fn apply_event(state: &mut ProjectState, event: &DomainEvent) -> Result<(), ReducerError> {
    let kind = EventType::parse(&event.event_type)
        .ok_or_else(|| ReducerError::UnknownEventType(event.event_type.clone()))?;
    let operation = Operation::decode_event(kind, &event.payload).map_err(|err| {
        ReducerError::MalformedPayload { event_type: event.event_type.clone(), reason: err.to_string() }
    })?;

    let now = event.meta.ts;
    apply_operation(state, &operation, now)?;
    touch_updated_at(state, now);
    Ok(())
}

fn apply_operation(
    state: &mut ProjectState,
    operation: &Operation,
    now: Timestamp,
) -> Result<(), ReducerError> {
    match operation {
        Operation::ProjectUpdate(p) => {
            state.project = apply_patch(&state.project, &p.patch, PatchMode::Merge, PROJECT_PROTECTED)?;
        }

        Operation::SceneCreate(p) => scene_created(state, p, now),
        Operation::SceneUpdate(p) => {
            let scene = entry_mut(&mut state.scenes, "scene", &p.scene_id)?;
            let mut patched = apply_patch(&*scene, &p.patch, PatchMode::Merge, SCENE_PROTECTED)?;
            patched.updated_at = now;
            *scene = patched;
        }
        Operation::SceneRename(p) => {
            let scene = entry_mut(&mut state.scenes, "scene", &p.scene_id)?;
            scene.name = p.name.clone();
            scene.updated_at = now;
        }
        Operation::SceneDelete(p) => scene_deleted(state, &p.scene_id),
        Operation::SceneSetInitial(p) => {
            state.story.initial_scene_id = Some(p.scene_id.clone());
        }
        Operation::SceneReorder(p) => {
            upsert_no_duplicate(
                &mut state.story.scene_order,
                p.scene_id.clone(),
                normalize_index(Some(p.index)),
            );
        }

        Operation::SectionCreate(p) => section_created(state, p, now)?,
        Operation::SectionRename(p) => {
            let section = entry_mut(&mut state.sections, "section", &p.section_id)?;
            section.name = p.name.clone();
            section.updated_at = now;
        }
        Operation::SectionDelete(p) => section_deleted(state, &p.section_id),
        Operation::SectionReorder(p) => {
            let scene_id = state
                .sections
                .get(&p.section_id)
                .map(|section| section.scene_id.clone())
                .ok_or_else(|| ReducerError::MissingEntity { kind: "section", id: p.section_id.clone() })?;
            let scene = entry_mut(&mut state.scenes, "scene", &scene_id)?;
            upsert_no_duplicate(
                &mut scene.section_ids,
                p.section_id.clone(),
                normalize_index(Some(p.index)),
            );
        }

        Operation::LineInsertAfter(p) => line_inserted(state, p, now)?,
        Operation::LineUpdateActions(p) => {
            let line = entry_mut(&mut state.lines, "line", &p.line_id)?;
            if p.replace {
                line.actions = p.patch.clone();
            } else {
                line.actions.extend(p.patch.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            line.updated_at = now;
        }
        Operation::LineDelete(p) => {
            if let Some(line) = state.lines.remove(&p.line_id) {
                if let Some(section) = state.sections.get_mut(&line.section_id).map(Arc::make_mut) {
                    remove_from(&mut section.line_ids, &p.line_id);
                }
            }
        }
        Operation::LineMove(p) => {
            let line = entry_mut(&mut state.lines, "line", &p.line_id)?;
            let from = std::mem::replace(&mut line.section_id, p.to_section_id.clone());
            if let Some(section) = state.sections.get_mut(&from).map(Arc::make_mut) {
                remove_from(&mut section.line_ids, &p.line_id);
            }
            let target = entry_mut(&mut state.sections, "section", &p.to_section_id)?;
            insert_at_index(&mut target.line_ids, p.line_id.clone(), normalize_index(Some(p.index)));
        }

        Operation::ResourceCreate(p) => {
            let resource = Resource {
                id: p.resource_id.clone(),
                parent_id: present(&p.parent_id).map(str::to_string),
                created_at: now,
                updated_at: now,
                fields: without_keys(&p.data, RESOURCE_PROTECTED),
            };
            state.resource_collection_mut(p.resource_type).insert_ordered(
                p.resource_id.clone(),
                resource,
                normalize_index(p.index),
            );
        }
        Operation::ResourceUpdate(p) => {
            let collection = state.resource_collection_mut(p.resource_type);
            let current = collection
                .get(&p.resource_id)
                .ok_or_else(|| ReducerError::MissingEntity { kind: "resource", id: p.resource_id.clone() })?;
            let mut patched =
                apply_patch(current, &p.patch, PatchMode::from_replace_flag(p.replace), RESOURCE_PROTECTED)?;
            patched.updated_at = now;
            collection.replace(&p.resource_id, patched);
        }
        Operation::ResourceRename(p) => {
            let item = state
                .resource_collection_mut(p.resource_type)
                .get_mut(&p.resource_id)
                .ok_or_else(|| ReducerError::MissingEntity { kind: "resource", id: p.resource_id.clone() })?;
            item.fields.insert("name".into(), Value::String(p.name.clone()));
            item.updated_at = now;
        }
        Operation::ResourceMove(p) => {
            let collection = state.resource_collection_mut(p.resource_type);
            let item = collection
                .get_mut(&p.resource_id)
                .ok_or_else(|| ReducerError::MissingEntity { kind: "resource", id: p.resource_id.clone() })?;
            item.parent_id = present(&p.parent_id).map(str::to_string);
            item.updated_at = now;
            collection.move_to(&p.resource_id, normalize_index(Some(p.index)));
        }
        Operation::ResourceDelete(p) => {
            state.resource_collection_mut(p.resource_type).remove_subtree(&p.resource_id);
        }
        Operation::ResourceDuplicate(p) => resource_duplicated(state, p, now)?,

        Operation::LayoutCreate(p) => layout_created(state, p, now),
        Operation::LayoutRename(p) => {
            let layout = entry_mut(&mut state.layouts, "layout", &p.layout_id)?;
            layout.name = p.name.clone();
            layout.updated_at = now;
        }
        Operation::LayoutDelete(p) => layout_deleted(state, &p.layout_id),
        Operation::LayoutReorder(p) => {
            let layout = entry_mut(&mut state.layouts, "layout", &p.layout_id)?;
            if let Some(parent_id) = &p.parent_id {
                layout.parent_id = present(parent_id).map(str::to_string);
                layout.updated_at = now;
            }
            upsert_no_duplicate(&mut state.layout_order, p.layout_id.clone(), normalize_index(Some(p.index)));
        }

        Operation::LayoutElementCreate(p) => {
            let layout = entry_mut(&mut state.layouts, "layout", &p.layout_id)?;
            let parent_id = present(&p.parent_id).map(str::to_string);
            let siblings = layout
                .children_of_mut(parent_id.as_deref())
                .ok_or_else(|| parent_missing(parent_id.as_deref()))?;
            insert_at_index(siblings, p.element_id.clone(), normalize_index(p.index));
            layout.elements.insert(
                p.element_id.clone(),
                LayoutElement {
                    id: p.element_id.clone(),
                    parent_id,
                    children: Vec::new(),
                    props: without_keys(&p.element, ELEMENT_PROTECTED),
                },
            );
            layout.updated_at = now;
        }
        Operation::LayoutElementUpdate(p) => {
            let layout = entry_mut(&mut state.layouts, "layout", &p.layout_id)?;
            let element = layout
                .elements
                .get(&p.element_id)
                .ok_or_else(|| ReducerError::MissingEntity { kind: "layout element", id: p.element_id.clone() })?;
            let patched =
                apply_patch(element, &p.patch, PatchMode::from_replace_flag(p.replace), ELEMENT_PROTECTED)?;
            layout.elements.insert(p.element_id.clone(), patched);
            layout.updated_at = now;
        }
        Operation::LayoutElementMove(p) => {
            let layout = entry_mut(&mut state.layouts, "layout", &p.layout_id)?;
            let next_parent = present(&p.parent_id).map(str::to_string);
            let element = layout
                .elements
                .get_mut(&p.element_id)
                .ok_or_else(|| ReducerError::MissingEntity { kind: "layout element", id: p.element_id.clone() })?;
            let previous = std::mem::replace(&mut element.parent_id, next_parent.clone());
            if let Some(siblings) = layout.children_of_mut(previous.as_deref()) {
                remove_from(siblings, &p.element_id);
            }
            let siblings = layout
                .children_of_mut(next_parent.as_deref())
                .ok_or_else(|| parent_missing(next_parent.as_deref()))?;
            insert_at_index(siblings, p.element_id.clone(), normalize_index(Some(p.index)));
            layout.updated_at = now;
        }
        Operation::LayoutElementDelete(p) => {
            let layout = entry_mut(&mut state.layouts, "layout", &p.layout_id)?;
            element_deleted(layout, &p.element_id);
            layout.updated_at = now;
        }

        Operation::VariableCreate(p) => {
            let variable = Variable {
                id: p.variable_id.clone(),
                name: p.name.clone(),
                item_type: "variable".into(),
                variable_type: p.variable_type.clone(),
                default: p.initial_value.clone(),
                value: p.initial_value.clone(),
                parent_id: present(&p.parent_id).map(str::to_string),
                created_at: now,
                updated_at: now,
                extra: without_keys(
                    &p.data,
                    &["id", "name", "itemType", "type", "variableType", "default", "value", "parentId", "createdAt", "updatedAt"],
                ),
            };
            state
                .variables
                .insert_ordered(p.variable_id.clone(), variable, normalize_index(p.index));
        }
        Operation::VariableUpdate(p) => {
            let current = state
                .variables
                .get(&p.variable_id)
                .ok_or_else(|| ReducerError::MissingEntity { kind: "variable", id: p.variable_id.clone() })?;
            let mut patch = p.patch.clone();
            patch.remove("variableType");
            if let Some(default) = patch.get("default").cloned() {
                patch.insert("value".into(), default);
            }
            let mut patched =
                apply_patch(current, &patch, PatchMode::from_replace_flag(p.replace), VARIABLE_PROTECTED)?;
            patched.updated_at = now;
            state.variables.replace(&p.variable_id, patched);
        }
        Operation::VariableDelete(p) => {
            state.variables.remove_subtree(&p.variable_id);
        }
    }
    Ok(())
}

fn parent_missing(parent_id: Option<&str>) -> ReducerError {
    ReducerError::MissingEntity { kind: "layout element", id: parent_id.unwrap_or_default().to_string() }
}

fn scene_created(state: &mut ProjectState, p: &op::SceneCreate, now: Timestamp) {
    state.scenes.insert(
        p.scene_id.clone(),
        Arc::new(Scene {
            id: p.scene_id.clone(),
            name: p.name.clone(),
            section_ids: Vec::new(),
            created_at: now,
            updated_at: now,
            extra: Map::new(),
        }),
    );
    let scenes = &state.scenes;
    place(&mut state.story.scene_order, &p.scene_id, p.index, now, |id| {
        scenes.get(id).map(|scene| scene.created_at)
    });
    if state.story.initial_scene_id.is_none() {
        state.story.initial_scene_id = Some(p.scene_id.clone());
    }
}

fn scene_deleted(state: &mut ProjectState, scene_id: &str) {
    let Some(scene) = state.scenes.remove(scene_id) else {
        return;
    };
    for section_id in &scene.section_ids {
        if let Some(section) = state.sections.remove(section_id) {
            for line_id in &section.line_ids {
                state.lines.remove(line_id);
            }
        }
    }
    remove_from(&mut state.story.scene_order, &scene_id.to_string());
    if state.story.initial_scene_id.as_deref() == Some(scene_id) {
        state.story.initial_scene_id = state.story.scene_order.first().cloned();
    }
}

fn section_created(
    state: &mut ProjectState,
    p: &op::SectionCreate,
    now: Timestamp,
) -> Result<(), ReducerError> {
    state.sections.insert(
        p.section_id.clone(),
        Arc::new(Section {
            id: p.section_id.clone(),
            scene_id: p.scene_id.clone(),
            name: p.name.clone(),
            line_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }),
    );
    let scene = entry_mut(&mut state.scenes, "scene", &p.scene_id)?;
    let sections = &state.sections;
    place(&mut scene.section_ids, &p.section_id, p.index, now, |id| {
        sections.get(id).map(|section| section.created_at)
    });
    Ok(())
}

fn section_deleted(state: &mut ProjectState, section_id: &str) {
    let Some(section) = state.sections.remove(section_id) else {
        return;
    };
    for line_id in &section.line_ids {
        state.lines.remove(line_id);
    }
    if let Some(scene) = state.scenes.get_mut(&section.scene_id).map(Arc::make_mut) {
        remove_from(&mut scene.section_ids, &section_id.to_string());
    }
}

fn line_inserted(
    state: &mut ProjectState,
    p: &op::LineInsertAfter,
    now: Timestamp,
) -> Result<(), ReducerError> {
    state.lines.insert(
        p.line_id.clone(),
        Arc::new(Line {
            id: p.line_id.clone(),
            section_id: p.section_id.clone(),
            actions: p.line.actions.clone(),
            created_at: now,
            updated_at: now,
        }),
    );
    let section = entry_mut(&mut state.sections, "section", &p.section_id)?;
    if let Some(after) = present(&p.after_line_id) {
        let position = section
            .line_ids
            .iter()
            .position(|id| id == after)
            .map_or(section.line_ids.len(), |found| found + 1);
        insert_at_index(&mut section.line_ids, p.line_id.clone(), Some(position));
    } else if p.index.is_some() {
        insert_at_index(&mut section.line_ids, p.line_id.clone(), normalize_index(p.index));
    } else {
        let lines = &state.lines;
        insert_stable(&mut section.line_ids, p.line_id.clone(), now, |id| {
            lines.get(id).map(|line| line.created_at)
        });
    }
    Ok(())
}

fn resource_duplicated(
    state: &mut ProjectState,
    p: &op::ResourceDuplicate,
    now: Timestamp,
) -> Result<(), ReducerError> {
    let collection = state.resource_collection_mut(p.resource_type);
    let source = collection
        .get(&p.source_id)
        .ok_or_else(|| ReducerError::MissingEntity { kind: "resource", id: p.source_id.clone() })?;
    let mut copy = source.clone();
    let name = format!("{} Copy", source.name().filter(|name| !name.is_empty()).unwrap_or("Resource"));
    copy.id = p.new_id.clone();
    copy.fields.insert("name".into(), Value::String(name));
    copy.created_at = now;
    copy.updated_at = now;
    collection.insert_at(p.new_id.clone(), copy, normalize_index(p.index));
    Ok(())
}

fn layout_created(state: &mut ProjectState, p: &op::LayoutCreate, now: Timestamp) {
    let (elements, root_element_order) = p
        .elements
        .as_ref()
        .map(elements_from_legacy)
        .unwrap_or_default();
    state.layouts.insert(
        p.layout_id.clone(),
        Arc::new(Layout {
            id: p.layout_id.clone(),
            name: p.name.clone(),
            layout_type: p.layout_type.clone(),
            parent_id: present(&p.parent_id).map(str::to_string),
            elements,
            root_element_order,
            created_at: now,
            updated_at: now,
            extra: without_keys(&p.data, LAYOUT_RESERVED),
        }),
    );
    let layouts = &state.layouts;
    place(&mut state.layout_order, &p.layout_id, p.index, now, |id| {
        layouts.get(id).map(|layout| layout.created_at)
    });
}

fn layout_deleted(state: &mut ProjectState, layout_id: &str) {
    if !state.layouts.contains_key(layout_id) {
        return;
    }
    let mut doomed = vec![layout_id.to_string()];
    let mut cursor = 0;
    while cursor < doomed.len() {
        let current = doomed[cursor].clone();
        for (id, layout) in &state.layouts {
            if layout.parent_id.as_deref() == Some(current.as_str()) && !doomed.contains(id) {
                doomed.push(id.clone());
            }
        }
        cursor += 1;
    }
    for id in &doomed {
        state.layouts.remove(id);
        remove_from(&mut state.layout_order, id);
    }
}

fn element_deleted(layout: &mut Layout, element_id: &str) {
    let mut stack = vec![element_id.to_string()];
    while let Some(id) = stack.pop() {
        if let Some(node) = layout.elements.remove(&id) {
            stack.extend(node.children);
        }
    }
    let remaining: HashSet<String> = layout.elements.keys().cloned().collect();
    for node in layout.elements.values_mut() {
        node.children.retain(|child| remaining.contains(child));
    }
    layout.root_element_order.retain(|id| remaining.contains(id));
}

/// Flattens an imported nested element tree into parent-linked elements.
/// Placement comes from the tree; items with no tree node keep their own
/// `parentId`, and anything without a resolvable parent becomes a root.
pub fn elements_from_legacy(legacy: &LegacyElements) -> (BTreeMap<String, LayoutElement>, Vec<String>) {
    let mut parent_by_id: BTreeMap<String, Option<String>> = BTreeMap::new();
    let mut walked = Vec::new();
    let mut stack: Vec<(&op::LegacyNode, Option<&str>)> =
        legacy.order.iter().rev().map(|node| (node, None)).collect();
    while let Some((node, parent)) = stack.pop() {
        if node.id.is_empty() {
            continue;
        }
        parent_by_id.entry(node.id.clone()).or_insert_with(|| parent.map(str::to_string));
        walked.push(node.id.clone());
        for child in node.children.iter().rev() {
            stack.push((child, Some(node.id.as_str())));
        }
    }

    let mut all_ids: Vec<String> = Vec::new();
    for id in walked.iter().chain(legacy.items.keys()) {
        if !all_ids.contains(id) {
            all_ids.push(id.clone());
        }
    }

    let mut elements = BTreeMap::new();
    for id in &all_ids {
        let source = legacy.items.get(id).and_then(Value::as_object).cloned().unwrap_or_default();
        let declared = match parent_by_id.get(id) {
            Some(parent) => parent.clone(),
            None => source.get("parentId").and_then(Value::as_str).map(str::to_string),
        };
        let parent_id = declared.filter(|parent| !parent.is_empty() && parent != id);
        elements.insert(
            id.clone(),
            LayoutElement {
                id: id.clone(),
                parent_id,
                children: Vec::new(),
                props: without_keys(&source, ELEMENT_PROTECTED),
            },
        );
    }

    for id in &all_ids {
        let parent = elements.get(id).and_then(|element| element.parent_id.clone());
        if let Some(parent) = parent.filter(|parent| elements.contains_key(parent)) {
            if let Some(parent_element) = elements.get_mut(&parent) {
                parent_element.children.push(id.clone());
            }
        }
    }

    let mut roots = Vec::new();
    for id in walked.iter().chain(all_ids.iter()) {
        let has_parent = elements
            .get(id)
            .and_then(|element| element.parent_id.as_ref())
            .is_some_and(|parent| elements.contains_key(parent));
        if !has_parent && !roots.contains(id) {
            roots.push(id.clone());
        }
    }

    // placements that point at a missing parent become roots
    for id in &roots {
        if let Some(element) = elements.get_mut(id) {
            element.parent_id = None;
        }
    }

    (elements, roots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::command::{Actor, EventMeta};
    use serde_json::json;

    fn event(kind: &str, payload: Value, ts: Timestamp) -> DomainEvent {
        DomainEvent {
            event_type: kind.into(),
            payload,
            meta: EventMeta {
                command_id: format!("cmd-{ts}"),
                project_id: "p1".into(),
                actor: Actor::new("u1", "c1"),
                ts,
            },
        }
    }

    fn applied(events: &[(&str, Value)]) -> ProjectState {
        let mut state = ProjectState::empty_at("p1", "Demo", "", 0);
        for (ts, (kind, payload)) in events.iter().enumerate() {
            apply_event(&mut state, &event(kind, payload.clone(), ts as i64 + 1)).unwrap();
        }
        state
    }

    #[test]
    fn unknown_event_type_is_fatal() {
        let mut state = ProjectState::empty_at("p1", "", "", 0);
        let err = apply_event(&mut state, &event("scene.exploded", json!({}), 1)).unwrap_err();
        assert_eq!(err, ReducerError::UnknownEventType("scene.exploded".into()));
    }

    #[test]
    fn malformed_payload_is_fatal() {
        let mut state = ProjectState::empty_at("p1", "", "", 0);
        let err = apply_event(&mut state, &event("scene.created", json!({ "sceneId": 4 }), 1)).unwrap_err();
        assert!(matches!(err, ReducerError::MalformedPayload { .. }));
    }

    #[test]
    fn first_scene_becomes_initial_and_touches_project() {
        let state = applied(&[
            ("scene.created", json!({ "sceneId": "s1", "name": "One" })),
            ("scene.created", json!({ "sceneId": "s2", "name": "Two" })),
        ]);
        assert_eq!(state.story.initial_scene_id.as_deref(), Some("s1"));
        assert_eq!(state.story.scene_order, vec!["s1", "s2"]);
        assert_eq!(state.scenes["s2"].created_at, 2);
        assert_eq!(state.project.updated_at, 2);
    }

    #[test]
    fn scene_delete_cascades_and_reassigns_initial() {
        let state = applied(&[
            ("scene.created", json!({ "sceneId": "s1", "name": "One" })),
            ("scene.created", json!({ "sceneId": "s2", "name": "Two" })),
            ("section.created", json!({ "sectionId": "sec", "sceneId": "s1", "name": "A" })),
            ("line.inserted", json!({ "lineId": "l1", "sectionId": "sec", "line": {} })),
            ("scene.deleted", json!({ "sceneId": "s1" })),
        ]);
        assert!(state.scenes.get("s1").is_none());
        assert!(state.sections.is_empty());
        assert!(state.lines.is_empty());
        assert_eq!(state.story.initial_scene_id.as_deref(), Some("s2"));
        assert_eq!(state.story.scene_order, vec!["s2"]);
    }

    #[test]
    fn line_insert_after_and_move() {
        let state = applied(&[
            ("scene.created", json!({ "sceneId": "s1", "name": "One" })),
            ("section.created", json!({ "sectionId": "a", "sceneId": "s1", "name": "A" })),
            ("section.created", json!({ "sectionId": "b", "sceneId": "s1", "name": "B" })),
            ("line.inserted", json!({ "lineId": "l1", "sectionId": "a", "line": {} })),
            ("line.inserted", json!({ "lineId": "l3", "sectionId": "a", "line": {} })),
            ("line.inserted", json!({ "lineId": "l2", "sectionId": "a", "line": {}, "afterLineId": "l1" })),
            ("line.moved", json!({ "lineId": "l3", "toSectionId": "b", "index": -3 })),
        ]);
        assert_eq!(state.sections["a"].line_ids, vec!["l1", "l2"]);
        assert_eq!(state.sections["b"].line_ids, vec!["l3"]);
        assert_eq!(state.lines["l3"].section_id, "b");
    }

    #[test]
    fn line_actions_merge_or_replace() {
        let mut state = applied(&[
            ("scene.created", json!({ "sceneId": "s1", "name": "One" })),
            ("section.created", json!({ "sectionId": "a", "sceneId": "s1", "name": "A" })),
            ("line.inserted", json!({ "lineId": "l1", "sectionId": "a", "line": { "actions": { "dialogue": "hi" } } })),
            ("line.actions_updated", json!({ "lineId": "l1", "patch": { "sfx": "boom" } })),
        ]);
        assert_eq!(state.lines["l1"].actions.len(), 2);

        apply_event(
            &mut state,
            &event("line.actions_updated", json!({ "lineId": "l1", "patch": { "bgm": 1 }, "replace": true }), 9),
        )
        .unwrap();
        assert_eq!(state.lines["l1"].actions.keys().collect::<Vec<_>>(), vec!["bgm"]);
        assert_eq!(state.lines["l1"].updated_at, 9);
    }

    #[test]
    fn resource_delete_removes_descendants() {
        let state = applied(&[
            ("resource.created", json!({ "resourceType": "images", "resourceId": "dir", "data": { "name": "Dir" } })),
            ("resource.created", json!({ "resourceType": "images", "resourceId": "a", "data": {}, "parentId": "dir" })),
            ("resource.created", json!({ "resourceType": "images", "resourceId": "b", "data": {}, "parentId": "a" })),
            ("resource.created", json!({ "resourceType": "images", "resourceId": "c", "data": {} })),
            ("resource.deleted", json!({ "resourceType": "images", "resourceId": "dir" })),
        ]);
        let images = &state.resources["images"];
        assert_eq!(images.order(), ["c"]);
        assert_eq!(images.len(), 1);
    }

    #[test]
    fn resource_duplicate_names_the_copy() {
        let state = applied(&[
            ("resource.created", json!({ "resourceType": "sounds", "resourceId": "r1", "data": { "name": "Rain", "src": "rain.ogg" } })),
            ("resource.created", json!({ "resourceType": "sounds", "resourceId": "r2", "data": {} })),
            ("resource.duplicated", json!({ "resourceType": "sounds", "sourceId": "r1", "newId": "r3", "index": 0 })),
            ("resource.duplicated", json!({ "resourceType": "sounds", "sourceId": "r2", "newId": "r4" })),
        ]);
        let sounds = &state.resources["sounds"];
        assert_eq!(sounds.order(), ["r3", "r1", "r2", "r4"]);
        assert_eq!(sounds.get("r3").unwrap().name(), Some("Rain Copy"));
        assert_eq!(sounds.get("r3").unwrap().fields["src"], "rain.ogg");
        assert_eq!(sounds.get("r4").unwrap().name(), Some("Resource Copy"));
        assert_eq!(sounds.get("r3").unwrap().created_at, 3);
    }

    #[test]
    fn resource_update_keeps_identity() {
        let state = applied(&[
            ("resource.created", json!({ "resourceType": "colors", "resourceId": "c1", "data": { "name": "Red", "hex": "#f00" } })),
            ("resource.updated", json!({ "resourceType": "colors", "resourceId": "c1", "patch": { "id": "x", "hex": "#e00" } })),
        ]);
        let color = state.resources["colors"].get("c1").unwrap();
        assert_eq!(color.id, "c1");
        assert_eq!(color.fields["hex"], "#e00");
        assert_eq!(color.name(), Some("Red"));
        assert_eq!(color.updated_at, 2);
    }

    #[test]
    fn layout_element_tree_operations() {
        let mut state = applied(&[
            ("layout.created", json!({ "layoutId": "L", "name": "Main", "layoutType": "normal" })),
            ("layout.element.created", json!({ "layoutId": "L", "elementId": "A", "element": { "x": 1 } })),
            ("layout.element.created", json!({ "layoutId": "L", "elementId": "B", "element": {}, "parentId": "A" })),
            ("layout.element.created", json!({ "layoutId": "L", "elementId": "C", "element": {} })),
            ("layout.element.moved", json!({ "layoutId": "L", "elementId": "C", "parentId": "A", "index": 0 })),
        ]);
        let layout = &state.layouts["L"];
        assert_eq!(layout.root_element_order, vec!["A"]);
        assert_eq!(layout.elements["A"].children, vec!["C", "B"]);
        assert_eq!(layout.elements["C"].parent_id.as_deref(), Some("A"));

        apply_event(&mut state, &event("layout.element.deleted", json!({ "layoutId": "L", "elementId": "A" }), 9))
            .unwrap();
        let layout = &state.layouts["L"];
        assert!(layout.elements.is_empty());
        assert!(layout.root_element_order.is_empty());
    }

    #[test]
    fn layout_delete_removes_nested_layouts() {
        let state = applied(&[
            ("layout.created", json!({ "layoutId": "F", "name": "Folder", "layoutType": "folder" })),
            ("layout.created", json!({ "layoutId": "L", "name": "Main", "layoutType": "normal", "parentId": "F" })),
            ("layout.created", json!({ "layoutId": "M", "name": "Menu", "layoutType": "normal" })),
            ("layout.reordered", json!({ "layoutId": "M", "index": 0 })),
            ("layout.deleted", json!({ "layoutId": "F" })),
        ]);
        assert_eq!(state.layout_order, vec!["M"]);
        assert_eq!(state.layouts.len(), 1);
    }

    #[test]
    fn legacy_elements_are_flattened() {
        let legacy: LegacyElements = serde_json::from_value(json!({
            "items": {
                "root": { "type": "container", "children": ["ignored"] },
                "child": { "type": "text", "x": 4 },
                "loose": { "type": "sprite", "parentId": "root" }
            },
            "order": [{ "id": "root", "children": [{ "id": "child" }] }]
        }))
        .unwrap();
        let (elements, roots) = elements_from_legacy(&legacy);
        assert_eq!(roots, vec!["root"]);
        assert_eq!(elements["root"].children, vec!["child", "loose"]);
        assert_eq!(elements["child"].parent_id.as_deref(), Some("root"));
        assert_eq!(elements["child"].props["x"], 4);
        assert!(!elements["root"].props.contains_key("children"));
    }

    #[test]
    fn variable_lifecycle() {
        let state = applied(&[
            ("variable.created", json!({ "variableId": "group", "name": "G", "variableType": "folder", "initialValue": null })),
            ("variable.created", json!({ "variableId": "v1", "name": "score", "variableType": "number", "initialValue": 3, "parentId": "group" })),
            ("variable.updated", json!({ "variableId": "v1", "patch": { "default": 10, "variableType": "number" } })),
        ]);
        let v1 = state.variables.get("v1").unwrap();
        assert_eq!(v1.default, json!(10));
        assert_eq!(v1.value, json!(10));
        assert_eq!(v1.variable_type, "number");
        assert!(!v1.extra.contains_key("variableType"));

        let mut state = state;
        apply_event(&mut state, &event("variable.deleted", json!({ "variableId": "group" }), 9)).unwrap();
        assert!(state.variables.is_empty());
        assert!(state.variables.order().is_empty());
    }
}
