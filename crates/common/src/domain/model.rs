// The project aggregate and its entities.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::collection::{Collection, Hierarchical};
use super::constants::{ResourceType, MODEL_VERSION};

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

pub fn now_ms() -> Timestamp {
    Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub created_at: Timestamp,
    #[serde(default)]
    pub updated_at: Timestamp,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    #[serde(default)]
    pub initial_scene_id: Option<String>,
    #[serde(default)]
    pub scene_order: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub section_ids: Vec<String>,
    #[serde(default)]
    pub created_at: Timestamp,
    #[serde(default)]
    pub updated_at: Timestamp,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: String,
    pub scene_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub line_ids: Vec<String>,
    #[serde(default)]
    pub created_at: Timestamp,
    #[serde(default)]
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Line {
    pub id: String,
    pub section_id: String,
    #[serde(default)]
    pub actions: Map<String, Value>,
    #[serde(default)]
    pub created_at: Timestamp,
    #[serde(default)]
    pub updated_at: Timestamp,
}

impl Line {
    /// Looks up an action by key, falling back to the nested `actions.actions` form.
    pub fn action(&self, key: &str) -> Option<&Value> {
        self.actions.get(key).or_else(|| {
            self.actions
                .get("actions")
                .and_then(Value::as_object)
                .and_then(|nested| nested.get(key))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub created_at: Timestamp,
    #[serde(default)]
    pub updated_at: Timestamp,
    /// Type-specific fields, `name` included.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Resource {
    pub fn name(&self) -> Option<&str> {
        self.fields.get("name").and_then(Value::as_str)
    }
}

impl Hierarchical for Resource {
    fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    fn created_at(&self) -> i64 {
        self.created_at
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutElement {
    pub id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub children: Vec<String>,
    /// Geometry and presentation props (`x`, `y`, `width`, `opacity`, ...).
    #[serde(flatten)]
    pub props: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layout {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub layout_type: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub elements: BTreeMap<String, LayoutElement>,
    #[serde(default)]
    pub root_element_order: Vec<String>,
    #[serde(default)]
    pub created_at: Timestamp,
    #[serde(default)]
    pub updated_at: Timestamp,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Layout {
    /// Sibling list an element with `parent_id` lives in.
    pub fn children_of_mut(&mut self, parent_id: Option<&str>) -> Option<&mut Vec<String>> {
        match parent_id {
            None => Some(&mut self.root_element_order),
            Some(parent) => self.elements.get_mut(parent).map(|element| &mut element.children),
        }
    }

    /// True when `candidate` is somewhere below `ancestor` in the element tree.
    pub fn is_element_descendant(&self, ancestor: &str, candidate: &str) -> bool {
        let mut cursor = self.elements.get(candidate).and_then(|e| e.parent_id.as_deref());
        let mut hops = 0;
        while let Some(parent) = cursor {
            if parent == ancestor {
                return true;
            }
            hops += 1;
            if hops > self.elements.len() {
                return false;
            }
            cursor = self.elements.get(parent).and_then(|e| e.parent_id.as_deref());
        }
        false
    }
}

fn default_item_type() -> String {
    "variable".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_item_type")]
    pub item_type: String,
    #[serde(rename = "type", default)]
    pub variable_type: String,
    #[serde(default)]
    pub default: Value,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub created_at: Timestamp,
    #[serde(default)]
    pub updated_at: Timestamp,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Hierarchical for Variable {
    fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    fn created_at(&self) -> i64 {
        self.created_at
    }
}

/// The whole project document. Entity maps share their values through `Arc`,
/// so cloning the aggregate is shallow until an entity is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectState {
    #[serde(rename = "model_version")]
    pub model_version: u32,
    pub project: Project,
    #[serde(default)]
    pub story: Story,
    #[serde(default)]
    pub scenes: BTreeMap<String, Arc<Scene>>,
    #[serde(default)]
    pub sections: BTreeMap<String, Arc<Section>>,
    #[serde(default)]
    pub lines: BTreeMap<String, Arc<Line>>,
    #[serde(default)]
    pub resources: BTreeMap<String, Collection<Resource>>,
    #[serde(default)]
    pub layouts: BTreeMap<String, Arc<Layout>>,
    #[serde(default)]
    pub layout_order: Vec<String>,
    #[serde(default)]
    pub variables: Collection<Variable>,
}

impl ProjectState {
    pub fn empty(project_id: &str, name: &str, description: &str) -> Self {
        Self::empty_at(project_id, name, description, now_ms())
    }

    pub fn empty_at(project_id: &str, name: &str, description: &str, now: Timestamp) -> Self {
        let resources = ResourceType::ALL
            .into_iter()
            .map(|kind| (kind.as_str().to_string(), Collection::new()))
            .collect();

        Self {
            model_version: MODEL_VERSION,
            project: Project {
                id: project_id.to_string(),
                name: name.to_string(),
                description: description.to_string(),
                created_at: now,
                updated_at: now,
                extra: Map::new(),
            },
            story: Story::default(),
            scenes: BTreeMap::new(),
            sections: BTreeMap::new(),
            lines: BTreeMap::new(),
            resources,
            layouts: BTreeMap::new(),
            layout_order: Vec::new(),
            variables: Collection::new(),
        }
    }

    pub fn resource_collection(&self, kind: ResourceType) -> Option<&Collection<Resource>> {
        self.resources.get(kind.as_str())
    }

    pub fn resource_collection_mut(&mut self, kind: ResourceType) -> &mut Collection<Resource> {
        self.resources.entry(kind.as_str().to_string()).or_default()
    }

    pub fn resource(&self, kind: ResourceType, id: &str) -> Option<&Resource> {
        self.resource_collection(kind).and_then(|collection| collection.get(id))
    }

    /// True when `candidate` is below `ancestor` in the layout folder tree.
    pub fn is_layout_descendant(&self, ancestor: &str, candidate: &str) -> bool {
        let mut cursor = self.layouts.get(candidate).and_then(|l| l.parent_id.as_deref());
        let mut hops = 0;
        while let Some(parent) = cursor {
            if parent == ancestor {
                return true;
            }
            hops += 1;
            if hops > self.layouts.len() {
                return false;
            }
            cursor = self.layouts.get(parent).and_then(|l| l.parent_id.as_deref());
        }
        false
    }

    pub fn counts(&self) -> StateCounts {
        StateCounts {
            scenes: self.scenes.len(),
            sections: self.sections.len(),
            lines: self.lines.len(),
            resources: self.resources.values().map(Collection::len).sum(),
            layouts: self.layouts.len(),
            layout_elements: self.layouts.values().map(|layout| layout.elements.len()).sum(),
            variables: self.variables.len(),
        }
    }
}

/// Advances `project.updatedAt` to `ts` unless it is already later.
pub fn touch_updated_at(state: &mut ProjectState, ts: Timestamp) {
    state.project.updated_at = state.project.updated_at.max(ts);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateCounts {
    pub scenes: usize,
    pub sections: usize,
    pub lines: usize,
    pub resources: usize,
    pub layouts: usize,
    pub layout_elements: usize,
    pub variables: usize,
}
