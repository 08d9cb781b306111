use super::command::{Command, DomainEvent, EventMeta};

const SUFFIX_RULES: [(&str, &str); 6] = [
    (".create", ".created"),
    (".rename", ".renamed"),
    (".delete", ".deleted"),
    (".reorder", ".reordered"),
    (".move", ".moved"),
    (".update", ".updated"),
];

/// Event type produced by a command type. Unknown types map to themselves.
pub fn to_event_type(command_type: &str) -> String {
    for (suffix, replacement) in SUFFIX_RULES {
        if let Some(stem) = command_type.strip_suffix(suffix) {
            return format!("{stem}{replacement}");
        }
    }
    match command_type {
        "scene.set_initial" => "scene.initial_set".to_string(),
        "line.insert_after" => "line.inserted".to_string(),
        "line.update_actions" => "line.actions_updated".to_string(),
        "resource.duplicate" => "resource.duplicated".to_string(),
        other => other.to_string(),
    }
}

/// Pure translation; the command is assumed to be validated already.
pub fn command_to_event(command: &Command) -> DomainEvent {
    DomainEvent {
        event_type: to_event_type(&command.command_type),
        payload: command.payload.clone(),
        meta: EventMeta {
            command_id: command.id.clone(),
            project_id: command.project_id.clone(),
            actor: command.actor.clone(),
            ts: command.client_ts,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::command::Actor;
    use crate::domain::constants::CommandType;
    use serde_json::json;

    #[test]
    fn string_rules_agree_with_typed_mapping() {
        for kind in CommandType::ALL {
            assert_eq!(to_event_type(kind.as_str()), kind.event_type().as_str(), "{kind}");
        }
    }

    #[test]
    fn unknown_types_pass_through() {
        assert_eq!(to_event_type("legacy.event.apply"), "legacy.event.apply");
        assert_eq!(to_event_type("layout.element.move"), "layout.element.moved");
    }

    #[test]
    fn event_carries_command_metadata() {
        let command = Command {
            id: "c1".into(),
            project_id: "p1".into(),
            command_type: "scene.rename".into(),
            payload: json!({ "sceneId": "s1", "name": "New" }),
            actor: Actor::new("u1", "dev-1"),
            client_ts: 42,
            ..Command::default()
        };
        let event = command_to_event(&command);
        assert_eq!(event.event_type, "scene.renamed");
        assert_eq!(event.payload, command.payload);
        assert_eq!(event.meta.command_id, "c1");
        assert_eq!(event.meta.ts, 42);
        assert_eq!(event.meta.actor.client_id, "dev-1");
    }
}
