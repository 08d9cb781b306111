// Protocol constants and closed vocabularies for the project document.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Shape version of [`crate::domain::model::ProjectState`].
pub const MODEL_VERSION: u32 = 2;
/// Wire protocol spoken with the broker.
pub const PROTOCOL_VERSION: &str = "1.0";
/// Only envelope version accepted by the validator.
pub const COMMAND_VERSION: u32 = 1;

/// Command type emitted by the legacy bridge. Opaque to the typed engine.
pub const LEGACY_EVENT_COMMAND: &str = "legacy.event.apply";

/// Layout type that may parent other layouts.
pub const LAYOUT_FOLDER_TYPE: &str = "folder";

/// The fixed set of typed resource collections.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Images,
    Tweens,
    Videos,
    Sounds,
    Characters,
    Fonts,
    Transforms,
    Colors,
    Typography,
    Components,
}

impl ResourceType {
    pub const ALL: [ResourceType; 10] = [
        Self::Images,
        Self::Tweens,
        Self::Videos,
        Self::Sounds,
        Self::Characters,
        Self::Fonts,
        Self::Transforms,
        Self::Colors,
        Self::Typography,
        Self::Components,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Images => "images",
            Self::Tweens => "tweens",
            Self::Videos => "videos",
            Self::Sounds => "sounds",
            Self::Characters => "characters",
            Self::Fonts => "fonts",
            Self::Transforms => "transforms",
            Self::Colors => "colors",
            Self::Typography => "typography",
            Self::Components => "components",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level partition scopes under `project:<id>:`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Story,
    Resources,
    Layouts,
    Settings,
}

impl Scope {
    pub const ALL: [Scope; 4] = [Self::Story, Self::Resources, Self::Layouts, Self::Settings];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Story => "story",
            Self::Resources => "resources",
            Self::Layouts => "layouts",
            Self::Settings => "settings",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "story" => Ok(Self::Story),
            "resources" => Ok(Self::Resources),
            "layouts" => Ok(Self::Layouts),
            "settings" => Ok(Self::Settings),
            other => Err(format!("unknown partition scope: {other}")),
        }
    }
}

/// Generates a closed string-backed enum with `as_str`, `parse` and `ALL`.
macro_rules! string_kinds {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $wire:literal,)+ }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$(Self::$variant,)+];

            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire,)+
                }
            }

            pub fn parse(value: &str) -> Option<Self> {
                match value {
                    $($wire => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_kinds! {
    /// Every command type the engine accepts.
    CommandType {
        ProjectUpdate => "project.update",
        SceneCreate => "scene.create",
        SceneUpdate => "scene.update",
        SceneRename => "scene.rename",
        SceneDelete => "scene.delete",
        SceneSetInitial => "scene.set_initial",
        SceneReorder => "scene.reorder",
        SectionCreate => "section.create",
        SectionRename => "section.rename",
        SectionDelete => "section.delete",
        SectionReorder => "section.reorder",
        LineInsertAfter => "line.insert_after",
        LineUpdateActions => "line.update_actions",
        LineDelete => "line.delete",
        LineMove => "line.move",
        ResourceCreate => "resource.create",
        ResourceUpdate => "resource.update",
        ResourceRename => "resource.rename",
        ResourceMove => "resource.move",
        ResourceDelete => "resource.delete",
        ResourceDuplicate => "resource.duplicate",
        LayoutCreate => "layout.create",
        LayoutRename => "layout.rename",
        LayoutDelete => "layout.delete",
        LayoutReorder => "layout.reorder",
        LayoutElementCreate => "layout.element.create",
        LayoutElementUpdate => "layout.element.update",
        LayoutElementMove => "layout.element.move",
        LayoutElementDelete => "layout.element.delete",
        VariableCreate => "variable.create",
        VariableUpdate => "variable.update",
        VariableDelete => "variable.delete",
    }
}

string_kinds! {
    /// Every event type the reducer handles.
    EventType {
        ProjectUpdated => "project.updated",
        SceneCreated => "scene.created",
        SceneUpdated => "scene.updated",
        SceneRenamed => "scene.renamed",
        SceneDeleted => "scene.deleted",
        SceneInitialSet => "scene.initial_set",
        SceneReordered => "scene.reordered",
        SectionCreated => "section.created",
        SectionRenamed => "section.renamed",
        SectionDeleted => "section.deleted",
        SectionReordered => "section.reordered",
        LineInserted => "line.inserted",
        LineActionsUpdated => "line.actions_updated",
        LineDeleted => "line.deleted",
        LineMoved => "line.moved",
        ResourceCreated => "resource.created",
        ResourceUpdated => "resource.updated",
        ResourceRenamed => "resource.renamed",
        ResourceMoved => "resource.moved",
        ResourceDeleted => "resource.deleted",
        ResourceDuplicated => "resource.duplicated",
        LayoutCreated => "layout.created",
        LayoutRenamed => "layout.renamed",
        LayoutDeleted => "layout.deleted",
        LayoutReordered => "layout.reordered",
        LayoutElementCreated => "layout.element.created",
        LayoutElementUpdated => "layout.element.updated",
        LayoutElementMoved => "layout.element.moved",
        LayoutElementDeleted => "layout.element.deleted",
        VariableCreated => "variable.created",
        VariableUpdated => "variable.updated",
        VariableDeleted => "variable.deleted",
    }
}

impl CommandType {
    /// Payload fields that must be present for this command type.
    pub const fn required_fields(self) -> &'static [&'static str] {
        match self {
            Self::ProjectUpdate => &["patch"],
            Self::SceneCreate => &["sceneId", "name"],
            Self::SceneUpdate => &["sceneId", "patch"],
            Self::SceneRename => &["sceneId", "name"],
            Self::SceneDelete | Self::SceneSetInitial => &["sceneId"],
            Self::SceneReorder => &["sceneId", "index"],
            Self::SectionCreate => &["sectionId", "sceneId", "name"],
            Self::SectionRename => &["sectionId", "name"],
            Self::SectionDelete => &["sectionId"],
            Self::SectionReorder => &["sectionId", "index"],
            Self::LineInsertAfter => &["lineId", "sectionId", "line"],
            Self::LineUpdateActions => &["lineId", "patch"],
            Self::LineDelete => &["lineId"],
            Self::LineMove => &["lineId", "toSectionId", "index"],
            Self::ResourceCreate => &["resourceType", "resourceId", "data"],
            Self::ResourceUpdate => &["resourceType", "resourceId", "patch"],
            Self::ResourceRename => &["resourceType", "resourceId", "name"],
            Self::ResourceMove => &["resourceType", "resourceId", "index"],
            Self::ResourceDelete => &["resourceType", "resourceId"],
            Self::ResourceDuplicate => &["resourceType", "sourceId", "newId"],
            Self::LayoutCreate => &["layoutId", "name", "layoutType"],
            Self::LayoutRename => &["layoutId", "name"],
            Self::LayoutDelete => &["layoutId"],
            Self::LayoutReorder => &["layoutId", "index"],
            Self::LayoutElementCreate => &["layoutId", "elementId", "element"],
            Self::LayoutElementUpdate => &["layoutId", "elementId", "patch"],
            Self::LayoutElementMove => &["layoutId", "elementId", "index"],
            Self::LayoutElementDelete => &["layoutId", "elementId"],
            Self::VariableCreate => &["variableId", "name", "variableType", "initialValue"],
            Self::VariableUpdate => &["variableId", "patch"],
            Self::VariableDelete => &["variableId"],
        }
    }

    /// Partition scope a command of this type is routed under by default.
    pub const fn scope(self) -> Scope {
        match self {
            Self::ProjectUpdate
            | Self::VariableCreate
            | Self::VariableUpdate
            | Self::VariableDelete => Scope::Settings,
            Self::SceneCreate
            | Self::SceneUpdate
            | Self::SceneRename
            | Self::SceneDelete
            | Self::SceneSetInitial
            | Self::SceneReorder
            | Self::SectionCreate
            | Self::SectionRename
            | Self::SectionDelete
            | Self::SectionReorder
            | Self::LineInsertAfter
            | Self::LineUpdateActions
            | Self::LineDelete
            | Self::LineMove => Scope::Story,
            Self::ResourceCreate
            | Self::ResourceUpdate
            | Self::ResourceRename
            | Self::ResourceMove
            | Self::ResourceDelete
            | Self::ResourceDuplicate => Scope::Resources,
            Self::LayoutCreate
            | Self::LayoutRename
            | Self::LayoutDelete
            | Self::LayoutReorder
            | Self::LayoutElementCreate
            | Self::LayoutElementUpdate
            | Self::LayoutElementMove
            | Self::LayoutElementDelete => Scope::Layouts,
        }
    }
}
