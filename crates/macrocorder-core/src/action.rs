//! Action log - the typed record exchanged between recorder, player and storage
//!
//! Actions serialize to flat JSON objects tagged by `"type"`; paths are arrays of `[x, y]`.

use serde::{Deserialize, Serialize};

/// Screen coordinate
pub type Point = (f64, f64);

/// Screen label used when the display could not be resolved
pub const UNKNOWN_SCREEN: &str = "Unknown";

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn unknown_screen() -> String {
    UNKNOWN_SCREEN.to_string()
}

/// One recorded unit of user input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Process-unique id, stable across edits
    #[serde(alias = "_uid", default = "new_id")]
    pub id: String,
    /// Free text owned by the editor
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comment: String,
    #[serde(flatten)]
    pub kind: ActionKind,
}

/// Action payload - tagged union
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ActionKind {
    /// Pointer motion along a path (>= 2 samples)
    Move {
        path: Vec<Point>,
        duration: f64,
        #[serde(default = "unknown_screen")]
        screen: String,
    },

    /// Pointer motion with a button held
    Drag {
        button: Button,
        path: Vec<Point>,
        duration: f64,
        #[serde(default = "unknown_screen")]
        screen: String,
    },

    /// Press and release without travelling
    Click {
        button: Button,
        x: f64,
        y: f64,
        duration: f64,
        #[serde(default = "unknown_screen")]
        screen: String,
    },

    /// Complete key-down/key-up gesture, normalized key name
    Key {
        key: String,
        #[serde(default)]
        duration: f64,
    },
}

impl Action {
    /// Wrap a payload with a fresh id
    pub fn new(kind: ActionKind) -> Self {
        Self {
            id: new_id(),
            comment: String::new(),
            kind,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            ActionKind::Move { .. } => "move",
            ActionKind::Drag { .. } => "drag",
            ActionKind::Click { .. } => "click",
            ActionKind::Key { .. } => "key",
        }
    }

    /// Recorded duration in seconds
    pub fn duration(&self) -> f64 {
        match &self.kind {
            ActionKind::Move { duration, .. }
            | ActionKind::Drag { duration, .. }
            | ActionKind::Click { duration, .. }
            | ActionKind::Key { duration, .. } => *duration,
        }
    }

    pub fn screen(&self) -> Option<&str> {
        match &self.kind {
            ActionKind::Move { screen, .. }
            | ActionKind::Drag { screen, .. }
            | ActionKind::Click { screen, .. } => Some(screen),
            ActionKind::Key { .. } => None,
        }
    }
}

/// Supported pointer buttons
///
/// Deserialization goes through [`Button::from_name`], so any spelling loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Button {
    #[default]
    Left,
    Right,
    Middle,
}

impl Button {
    /// Total mapping from a button name. `Button.right` style names use the
    /// suffix after the last dot; unknown names map to `Left`.
    pub fn from_name(name: &str) -> Self {
        let short = name.rsplit('.').next().unwrap_or(name).trim();
        match short.to_ascii_lowercase().as_str() {
            "right" => Button::Right,
            "middle" | "center" => Button::Middle,
            _ => Button::Left,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Button::Left => "left",
            Button::Right => "right",
            Button::Middle => "middle",
        }
    }
}

impl From<String> for Button {
    fn from(s: String) -> Self {
        Button::from_name(&s)
    }
}

impl std::fmt::Display for Button {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Editor hierarchy
// ============================================================================

/// Group metadata
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GroupInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comment: String,
}

/// Node of the editor tree: a single action or a named group of nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ActionNode {
    Action { data: Action },
    #[serde(alias = "__group__")]
    Group {
        #[serde(default)]
        data: GroupInfo,
        #[serde(default)]
        children: Vec<ActionNode>,
    },
}

impl ActionNode {
    pub fn group(name: impl Into<String>, children: Vec<ActionNode>) -> Self {
        ActionNode::Group {
            data: GroupInfo {
                name: name.into(),
                comment: String::new(),
            },
            children,
        }
    }

    pub fn count_actions(&self) -> usize {
        match self {
            ActionNode::Action { .. } => 1,
            ActionNode::Group { children, .. } => children.iter().map(Self::count_actions).sum(),
        }
    }
}

impl From<Action> for ActionNode {
    fn from(data: Action) -> Self {
        ActionNode::Action { data }
    }
}

/// Resolve the hierarchy into the depth-first order the player consumes
pub fn flatten(nodes: &[ActionNode]) -> Vec<Action> {
    let mut out = Vec::new();
    flatten_into(nodes, &mut out);
    out
}

fn flatten_into(nodes: &[ActionNode], out: &mut Vec<Action>) {
    for node in nodes {
        match node {
            ActionNode::Action { data } => out.push(data.clone()),
            ActionNode::Group { children, .. } => flatten_into(children, out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(k: &str) -> Action {
        Action::new(ActionKind::Key {
            key: k.to_string(),
            duration: 0.0,
        })
    }

    #[test]
    fn button_mapping_is_total() {
        assert_eq!(Button::from_name("Button.right"), Button::Right);
        assert_eq!(Button::from_name("MIDDLE"), Button::Middle);
        assert_eq!(Button::from_name("left"), Button::Left);
        assert_eq!(Button::from_name("x1"), Button::Left);
        assert_eq!(Button::from_name(""), Button::Left);
    }

    #[test]
    fn action_wire_shape() {
        let a = Action::new(ActionKind::Drag {
            button: Button::Right,
            path: vec![(1.0, 2.0), (3.0, 4.0)],
            duration: 0.25,
            screen: "HDMI-1".into(),
        });
        let v = serde_json::to_value(&a).unwrap();
        assert_eq!(v["type"], "drag");
        assert_eq!(v["button"], "right");
        assert_eq!(v["path"], json!([[1.0, 2.0], [3.0, 4.0]]));
        assert_eq!(v["id"], json!(a.id));
        assert!(v.get("comment").is_none());
    }

    #[test]
    fn legacy_fields_load() {
        let v = json!({
            "_uid": "abc",
            "type": "click",
            "button": "Button.middle",
            "x": 10, "y": 20,
            "duration": 0.1
        });
        let a: Action = serde_json::from_value(v).unwrap();
        assert_eq!(a.id, "abc");
        assert_eq!(a.screen(), Some(UNKNOWN_SCREEN));
        match a.kind {
            ActionKind::Click { button, x, y, .. } => {
                assert_eq!(button, Button::Middle);
                assert_eq!((x, y), (10.0, 20.0));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn flatten_is_depth_first() {
        let (a, b, c) = (key("a"), key("b"), key("c"));
        let tree = vec![
            a.clone().into(),
            ActionNode::group("inner", vec![b.clone().into(), ActionNode::group("empty", vec![])]),
            c.clone().into(),
        ];
        assert_eq!(flatten(&tree), vec![a, b, c]);
        assert_eq!(tree.iter().map(ActionNode::count_actions).sum::<usize>(), 3);
    }

    #[test]
    fn legacy_group_tag_loads() {
        let v = json!([{ "kind": "__group__", "data": { "name": "G" }, "children": [] }]);
        let nodes: Vec<ActionNode> = serde_json::from_value(v).unwrap();
        assert_eq!(nodes, vec![ActionNode::group("G", vec![])]);
    }
}
