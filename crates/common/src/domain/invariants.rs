// Read-only structural sweep over the aggregate.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde_json::{json, Value};

use super::collection::{Collection, Hierarchical};
use super::constants::{ResourceType, LAYOUT_FOLDER_TYPE, MODEL_VERSION};
use super::errors::InvariantError;
use super::model::{Layout, LayoutElement, ProjectState, Resource, Variable};

const NUMERIC_ELEMENT_PROPS: [&str; 6] = ["x", "y", "width", "height", "rotation", "opacity"];

type Check = Result<(), InvariantError>;

fn fail(message: &str, details: Value) -> Check {
    Err(InvariantError::new(message).with_details(details))
}

fn ensure_unique(ids: &[String], label: &str) -> Check {
    let mut seen = HashSet::with_capacity(ids.len());
    if let Some(duplicate) = ids.iter().find(|id| !seen.insert(id.as_str())) {
        return fail(
            &format!("Duplicate ids in {label}"),
            json!({ "label": label, "duplicate": duplicate, "array": ids }),
        );
    }
    Ok(())
}

/// Fails on the first structural violation in `state`.
pub fn assert_invariants(state: &ProjectState) -> Check {
    if state.model_version != MODEL_VERSION {
        return fail(
            "Unsupported model version",
            json!({ "expected": MODEL_VERSION, "got": state.model_version }),
        );
    }
    if state.project.id.trim().is_empty() {
        return fail("Missing project id", json!({}));
    }

    check_resource_collections(state)?;
    check_story(state)?;
    check_scenes_and_sections(state)?;
    check_lines(state)?;
    check_line_action_references(state)?;
    check_layout_order(state)?;
    for layout in state.layouts.values() {
        check_layout_elements(layout)?;
    }
    check_hierarchy(&state.variables, "variables")?;
    Ok(())
}

fn check_resource_collections(state: &ProjectState) -> Check {
    for kind in ResourceType::ALL {
        if !state.resources.contains_key(kind.as_str()) {
            return fail("Missing resource collection", json!({ "resourceType": kind }));
        }
    }
    for (name, collection) in &state.resources {
        if ResourceType::parse(name).is_none() {
            return fail("Unknown resource collection", json!({ "resourceType": name }));
        }
        check_hierarchy(collection, &format!("resources.{name}"))?;
    }
    Ok(())
}

trait Identified {
    fn id(&self) -> &str;
}

impl Identified for Resource {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Identified for Variable {
    fn id(&self) -> &str {
        &self.id
    }
}

fn check_hierarchy<T: Hierarchical + Identified>(collection: &Collection<T>, label: &str) -> Check {
    let order = collection.order();
    ensure_unique(order, &format!("{label}.order"))?;

    let items = collection.items();
    for id in order {
        if !items.contains_key(id) {
            return fail("Collection order references missing item", json!({ "collection": label, "id": id }));
        }
    }
    let listed: HashSet<&str> = order.iter().map(String::as_str).collect();
    for (key, item) in items {
        if !listed.contains(key.as_str()) {
            return fail("Collection item missing from order", json!({ "collection": label, "id": key }));
        }
        if item.id() != key {
            return fail(
                "Collection item id does not match its key",
                json!({ "collection": label, "key": key, "id": item.id() }),
            );
        }
        if let Some(parent) = item.parent_id() {
            if parent == key {
                return fail("Collection item parents itself", json!({ "collection": label, "id": key }));
            }
            if !items.contains_key(parent) {
                return fail(
                    "Collection item references missing parent",
                    json!({ "collection": label, "id": key, "parentId": parent }),
                );
            }
        }
    }
    check_parent_chains(
        items.iter().map(|(id, item)| (id.as_str(), item.parent_id())),
        label,
    )
}

/// Walks every parent chain looking for a loop.
fn check_parent_chains<'a>(links: impl Iterator<Item = (&'a str, Option<&'a str>)>, label: &str) -> Check {
    let parents: HashMap<&str, Option<&str>> = links.collect();
    let mut acyclic: HashSet<&str> = HashSet::new();
    for start in parents.keys().copied() {
        let mut path = Vec::new();
        let mut on_path = HashSet::new();
        let mut cursor = Some(start);
        while let Some(id) = cursor {
            if acyclic.contains(id) {
                break;
            }
            if !on_path.insert(id) {
                path.push(id);
                return fail("Parent cycle detected", json!({ "collection": label, "path": path }));
            }
            path.push(id);
            cursor = parents.get(id).copied().flatten();
        }
        acyclic.extend(path);
    }
    Ok(())
}

fn check_story(state: &ProjectState) -> Check {
    let order = &state.story.scene_order;
    ensure_unique(order, "story.sceneOrder")?;
    if let Some(initial) = state.story.initial_scene_id.as_deref() {
        if !state.scenes.contains_key(initial) {
            return fail("initialSceneId does not exist", json!({ "initialSceneId": initial }));
        }
    }
    for scene_id in order {
        if !state.scenes.contains_key(scene_id) {
            return fail("sceneOrder contains missing scene", json!({ "sceneId": scene_id }));
        }
    }
    for scene_id in state.scenes.keys() {
        if !order.contains(scene_id) {
            return fail("Scene missing from sceneOrder", json!({ "sceneId": scene_id }));
        }
    }
    Ok(())
}

fn check_scenes_and_sections(state: &ProjectState) -> Check {
    for scene in state.scenes.values() {
        ensure_unique(&scene.section_ids, &format!("scene({}).sectionIds", scene.id))?;
        for section_id in &scene.section_ids {
            let Some(section) = state.sections.get(section_id) else {
                return fail(
                    "Scene references missing section",
                    json!({ "sceneId": scene.id, "sectionId": section_id }),
                );
            };
            if section.scene_id != scene.id {
                return fail(
                    "Section parent mismatch",
                    json!({ "sceneId": scene.id, "sectionId": section_id, "actualSceneId": section.scene_id }),
                );
            }
        }
    }

    for section in state.sections.values() {
        let Some(scene) = state.scenes.get(&section.scene_id) else {
            return fail(
                "Section references missing parent scene",
                json!({ "sectionId": section.id, "sceneId": section.scene_id }),
            );
        };
        if !scene.section_ids.contains(&section.id) {
            return fail(
                "Section parent does not include section id",
                json!({ "sectionId": section.id, "sceneId": section.scene_id }),
            );
        }
        ensure_unique(&section.line_ids, &format!("section({}).lineIds", section.id))?;
        for line_id in &section.line_ids {
            let Some(line) = state.lines.get(line_id) else {
                return fail(
                    "Section references missing line",
                    json!({ "sectionId": section.id, "lineId": line_id }),
                );
            };
            if line.section_id != section.id {
                return fail(
                    "Line parent mismatch",
                    json!({ "sectionId": section.id, "lineId": line_id, "actualSectionId": line.section_id }),
                );
            }
        }
    }
    Ok(())
}

fn check_lines(state: &ProjectState) -> Check {
    for line in state.lines.values() {
        let Some(section) = state.sections.get(&line.section_id) else {
            return fail(
                "Line references missing parent section",
                json!({ "lineId": line.id, "sectionId": line.section_id }),
            );
        };
        if !section.line_ids.contains(&line.id) {
            return fail(
                "Line parent does not include line id",
                json!({ "lineId": line.id, "sectionId": line.section_id }),
            );
        }
    }
    Ok(())
}

fn check_line_action_references(state: &ProjectState) -> Check {
    for line in state.lines.values() {
        let transition_scene = line
            .action("sectionTransition")
            .and_then(|transition| transition.get("sceneId"))
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty());
        if let Some(scene_id) = transition_scene {
            if !state.scenes.contains_key(scene_id) {
                return fail("Line references missing scene", json!({ "lineId": line.id, "sceneId": scene_id }));
            }
        }

        let Some(background) = line.action("background") else {
            continue;
        };
        let is_layout = background.get("resourceType").and_then(Value::as_str) == Some("layout");
        let layout_id = background
            .get("resourceId")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty());
        if let (true, Some(layout_id)) = (is_layout, layout_id) {
            if !state.layouts.contains_key(layout_id) {
                return fail("Line references missing layout", json!({ "lineId": line.id, "layoutId": layout_id }));
            }
        }
    }
    Ok(())
}

fn check_layout_order(state: &ProjectState) -> Check {
    ensure_unique(&state.layout_order, "layoutOrder")?;
    for layout_id in &state.layout_order {
        if !state.layouts.contains_key(layout_id) {
            return fail("layoutOrder contains missing layout", json!({ "layoutId": layout_id }));
        }
    }
    for (key, layout) in &state.layouts {
        if layout.id != *key {
            return fail("Layout id does not match its key", json!({ "key": key, "id": layout.id }));
        }
        if !state.layout_order.contains(key) {
            return fail("Layout missing from layoutOrder", json!({ "layoutId": key }));
        }
        if let Some(parent_id) = layout.parent_id.as_deref() {
            let Some(parent) = state.layouts.get(parent_id) else {
                return fail(
                    "Layout references missing parent",
                    json!({ "layoutId": key, "parentId": parent_id }),
                );
            };
            if parent.layout_type != LAYOUT_FOLDER_TYPE || parent_id == key {
                return fail(
                    "Layout parent must be folder",
                    json!({ "layoutId": key, "parentId": parent_id, "parentType": parent.layout_type }),
                );
            }
        }
    }
    check_parent_chains(
        state
            .layouts
            .iter()
            .map(|(id, layout)| (id.as_str(), layout.parent_id.as_deref())),
        "layouts",
    )
}

fn check_layout_elements(layout: &Layout) -> Check {
    let layout_id = layout.id.as_str();
    let elements = &layout.elements;
    ensure_unique(&layout.root_element_order, &format!("layout({layout_id}).rootElementOrder"))?;

    let mut placements: HashMap<&str, usize> = HashMap::new();
    for root_id in &layout.root_element_order {
        if !elements.contains_key(root_id) {
            return fail(
                "Layout root references missing element",
                json!({ "layoutId": layout_id, "rootId": root_id }),
            );
        }
        *placements.entry(root_id.as_str()).or_default() += 1;
    }

    for (key, element) in elements {
        if element.id != *key {
            return fail(
                "Layout element id does not match its key",
                json!({ "layoutId": layout_id, "key": key, "id": element.id }),
            );
        }
        ensure_unique(&element.children, &format!("layout({layout_id}).element({key}).children"))?;

        if let Some(parent_id) = element.parent_id.as_deref() {
            let Some(parent) = elements.get(parent_id) else {
                return fail(
                    "Layout element references missing parent",
                    json!({ "layoutId": layout_id, "elementId": key, "parentId": parent_id }),
                );
            };
            if !parent.children.contains(key) {
                return fail(
                    "Layout parent does not reference child",
                    json!({ "layoutId": layout_id, "elementId": key, "parentId": parent_id }),
                );
            }
        }

        for child_id in &element.children {
            let Some(child) = elements.get(child_id) else {
                return fail(
                    "Layout element references missing child",
                    json!({ "layoutId": layout_id, "elementId": key, "childId": child_id }),
                );
            };
            if child.parent_id.as_deref() != Some(key.as_str()) {
                return fail(
                    "Layout child parent mismatch",
                    json!({
                        "layoutId": layout_id,
                        "elementId": key,
                        "childId": child_id,
                        "actualParentId": child.parent_id,
                    }),
                );
            }
            *placements.entry(child_id.as_str()).or_default() += 1;
        }

        for prop in NUMERIC_ELEMENT_PROPS {
            let Some(value) = element.props.get(prop) else {
                continue;
            };
            let finite = value.as_f64().is_some_and(f64::is_finite);
            if !finite {
                return fail(
                    "Invalid numeric layout property",
                    json!({ "layoutId": layout_id, "elementId": key, "key": prop, "value": value }),
                );
            }
        }
        if let Some(opacity) = element.props.get("opacity").and_then(Value::as_f64) {
            if !(0.0..=1.0).contains(&opacity) {
                return fail(
                    "Layout opacity out of range",
                    json!({ "layoutId": layout_id, "elementId": key, "opacity": opacity }),
                );
            }
        }
    }

    for element_id in elements.keys() {
        let count = placements.get(element_id.as_str()).copied().unwrap_or(0);
        if count != 1 {
            return fail(
                "Layout element must appear exactly once in tree",
                json!({ "layoutId": layout_id, "elementId": element_id, "placements": count }),
            );
        }
    }

    check_element_reachability(layout_id, &layout.root_element_order, elements)
}

fn check_element_reachability(
    layout_id: &str,
    roots: &[String],
    elements: &BTreeMap<String, LayoutElement>,
) -> Check {
    let mut visited: HashSet<&str> = HashSet::new();
    for root in roots {
        // (node, path to node) walked depth first
        let mut stack: Vec<(&str, Vec<&str>)> = vec![(root.as_str(), Vec::new())];
        while let Some((id, path)) = stack.pop() {
            if path.contains(&id) {
                let mut cycle = path.clone();
                cycle.push(id);
                return fail("Layout cycle detected", json!({ "layoutId": layout_id, "path": cycle }));
            }
            if !visited.insert(id) {
                continue;
            }
            let Some(node) = elements.get(id) else {
                return fail(
                    "Layout traversal missing element",
                    json!({ "layoutId": layout_id, "elementId": id }),
                );
            };
            for child in node.children.iter().rev() {
                let mut next = path.clone();
                next.push(id);
                stack.push((child.as_str(), next));
            }
        }
    }

    if visited.len() != elements.len() {
        let unreachable: Vec<&str> = elements
            .keys()
            .map(String::as_str)
            .filter(|id| !visited.contains(id))
            .collect();
        return fail("Layout has unreachable elements", json!({ "layoutId": layout_id, "unreachable": unreachable }));
    }
    Ok(())
}
