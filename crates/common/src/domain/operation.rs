// Typed command/event payloads. A command and the event it maps to carry the
// same payload, so one struct serves both sides.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::constants::{CommandType, EventType, ResourceType};

pub type Patch = Map<String, Value>;

/// `None` when absent, `Some(None)` when explicitly null.
fn explicit_option<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

/// Treats an empty or blank id the same as no id.
pub fn present(id: &Option<String>) -> Option<&str> {
    id.as_deref().filter(|value| !value.trim().is_empty())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectUpdate {
    pub patch: Patch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneCreate {
    pub scene_id: String,
    pub name: String,
    #[serde(default)]
    pub index: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneUpdate {
    pub scene_id: String,
    pub patch: Patch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneRename {
    pub scene_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneRef {
    pub scene_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneReorder {
    pub scene_id: String,
    pub index: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionCreate {
    pub section_id: String,
    pub scene_id: String,
    pub name: String,
    #[serde(default)]
    pub index: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionRename {
    pub section_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionRef {
    pub section_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionReorder {
    pub section_id: String,
    pub index: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineDraft {
    #[serde(default)]
    pub actions: Patch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineInsertAfter {
    pub line_id: String,
    pub section_id: String,
    pub line: LineDraft,
    #[serde(default)]
    pub after_line_id: Option<String>,
    #[serde(default)]
    pub index: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineUpdateActions {
    pub line_id: String,
    pub patch: Patch,
    #[serde(default)]
    pub replace: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineRef {
    pub line_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineMove {
    pub line_id: String,
    pub to_section_id: String,
    pub index: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceCreate {
    pub resource_type: ResourceType,
    pub resource_id: String,
    pub data: Patch,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub index: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUpdate {
    pub resource_type: ResourceType,
    pub resource_id: String,
    pub patch: Patch,
    #[serde(default)]
    pub replace: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRename {
    pub resource_type: ResourceType,
    pub resource_id: String,
    pub name: String,
}

/// Moves a resource in the list. A missing `parentId` moves it to the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMove {
    pub resource_type: ResourceType,
    pub resource_id: String,
    pub index: i64,
    #[serde(default)]
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    pub resource_type: ResourceType,
    pub resource_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDuplicate {
    pub resource_type: ResourceType,
    pub source_id: String,
    pub new_id: String,
    #[serde(default)]
    pub index: Option<i64>,
}

/// Nested element tree carried by imported layouts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegacyElements {
    #[serde(default)]
    pub items: Map<String, Value>,
    #[serde(default)]
    pub order: Vec<LegacyNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyNode {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub children: Vec<LegacyNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutCreate {
    pub layout_id: String,
    pub name: String,
    pub layout_type: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub data: Patch,
    #[serde(default)]
    pub elements: Option<LegacyElements>,
    #[serde(default)]
    pub index: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutRename {
    pub layout_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutRef {
    pub layout_id: String,
}

/// Reorders a layout. `parentId` absent keeps the folder, null moves to the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutReorder {
    pub layout_id: String,
    pub index: i64,
    #[serde(default, deserialize_with = "explicit_option", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutElementCreate {
    pub layout_id: String,
    pub element_id: String,
    pub element: Patch,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub index: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutElementUpdate {
    pub layout_id: String,
    pub element_id: String,
    pub patch: Patch,
    #[serde(default)]
    pub replace: bool,
}

/// Moves an element among siblings. A missing `parentId` moves it to the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutElementMove {
    pub layout_id: String,
    pub element_id: String,
    pub index: i64,
    #[serde(default)]
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutElementRef {
    pub layout_id: String,
    pub element_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableCreate {
    pub variable_id: String,
    pub name: String,
    pub variable_type: String,
    pub initial_value: Value,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub data: Patch,
    #[serde(default)]
    pub index: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableUpdate {
    pub variable_id: String,
    pub patch: Patch,
    #[serde(default)]
    pub replace: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableRef {
    pub variable_id: String,
}

macro_rules! operations {
    ($($variant:ident($payload:ty) => $event:ident,)+) => {
        /// A decoded command or event payload, one variant per command type.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Operation {
            $($variant($payload),)+
        }

        impl Operation {
            pub fn decode(kind: CommandType, payload: &Value) -> Result<Self, serde_json::Error> {
                match kind {
                    $(CommandType::$variant => <$payload>::deserialize(payload).map(Self::$variant),)+
                }
            }

            pub fn decode_event(kind: EventType, payload: &Value) -> Result<Self, serde_json::Error> {
                match kind {
                    $(EventType::$event => <$payload>::deserialize(payload).map(Self::$variant),)+
                }
            }

            pub const fn command_type(&self) -> CommandType {
                match self {
                    $(Self::$variant(_) => CommandType::$variant,)+
                }
            }
        }

        impl CommandType {
            pub const fn event_type(self) -> EventType {
                match self {
                    $(Self::$variant => EventType::$event,)+
                }
            }
        }
    };
}

operations! {
    ProjectUpdate(ProjectUpdate) => ProjectUpdated,
    SceneCreate(SceneCreate) => SceneCreated,
    SceneUpdate(SceneUpdate) => SceneUpdated,
    SceneRename(SceneRename) => SceneRenamed,
    SceneDelete(SceneRef) => SceneDeleted,
    SceneSetInitial(SceneRef) => SceneInitialSet,
    SceneReorder(SceneReorder) => SceneReordered,
    SectionCreate(SectionCreate) => SectionCreated,
    SectionRename(SectionRename) => SectionRenamed,
    SectionDelete(SectionRef) => SectionDeleted,
    SectionReorder(SectionReorder) => SectionReordered,
    LineInsertAfter(LineInsertAfter) => LineInserted,
    LineUpdateActions(LineUpdateActions) => LineActionsUpdated,
    LineDelete(LineRef) => LineDeleted,
    LineMove(LineMove) => LineMoved,
    ResourceCreate(ResourceCreate) => ResourceCreated,
    ResourceUpdate(ResourceUpdate) => ResourceUpdated,
    ResourceRename(ResourceRename) => ResourceRenamed,
    ResourceMove(ResourceMove) => ResourceMoved,
    ResourceDelete(ResourceRef) => ResourceDeleted,
    ResourceDuplicate(ResourceDuplicate) => ResourceDuplicated,
    LayoutCreate(LayoutCreate) => LayoutCreated,
    LayoutRename(LayoutRename) => LayoutRenamed,
    LayoutDelete(LayoutRef) => LayoutDeleted,
    LayoutReorder(LayoutReorder) => LayoutReordered,
    LayoutElementCreate(LayoutElementCreate) => LayoutElementCreated,
    LayoutElementUpdate(LayoutElementUpdate) => LayoutElementUpdated,
    LayoutElementMove(LayoutElementMove) => LayoutElementMoved,
    LayoutElementDelete(LayoutElementRef) => LayoutElementDeleted,
    VariableCreate(VariableCreate) => VariableCreated,
    VariableUpdate(VariableUpdate) => VariableUpdated,
    VariableDelete(VariableRef) => VariableDeleted,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_typed_payload() {
        let op = Operation::decode(
            CommandType::LineInsertAfter,
            &json!({ "lineId": "l2", "sectionId": "s1", "line": {}, "afterLineId": "l1" }),
        )
        .unwrap();
        let Operation::LineInsertAfter(insert) = op else { panic!("wrong variant") };
        assert_eq!(insert.after_line_id.as_deref(), Some("l1"));
        assert!(insert.line.actions.is_empty());
    }

    #[test]
    fn wrong_field_types_fail_to_decode() {
        let err = Operation::decode(CommandType::SceneReorder, &json!({ "sceneId": "s1", "index": "two" }));
        assert!(err.is_err());
        let err = Operation::decode(
            CommandType::ResourceDelete,
            &json!({ "resourceType": "widgets", "resourceId": "r1" }),
        );
        assert!(err.is_err());
    }

    #[test]
    fn layout_reorder_distinguishes_null_from_absent() {
        let absent: LayoutReorder =
            serde_json::from_value(json!({ "layoutId": "a", "index": 0 })).unwrap();
        let null: LayoutReorder =
            serde_json::from_value(json!({ "layoutId": "a", "index": 0, "parentId": null })).unwrap();
        let set: LayoutReorder =
            serde_json::from_value(json!({ "layoutId": "a", "index": 0, "parentId": "f" })).unwrap();
        assert_eq!(absent.parent_id, None);
        assert_eq!(null.parent_id, Some(None));
        assert_eq!(set.parent_id, Some(Some("f".into())));
    }

    #[test]
    fn every_command_decodes_its_event_with_the_same_payload() {
        let payload = json!({ "variableId": "v1" });
        let from_command = Operation::decode(CommandType::VariableDelete, &payload).unwrap();
        let from_event = Operation::decode_event(EventType::VariableDeleted, &payload).unwrap();
        assert_eq!(from_command, from_event);
        assert_eq!(from_event.command_type(), CommandType::VariableDelete);
    }

    #[test]
    fn blank_ids_are_not_present() {
        assert_eq!(present(&Some("  ".into())), None);
        assert_eq!(present(&Some("p".into())), Some("p"));
        assert_eq!(present(&None), None);
    }
}
