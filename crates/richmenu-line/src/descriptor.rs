use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_WIDTH: u32 = 2500;
pub const DEFAULT_HEIGHT: u32 = 1686;

/// Canvas size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Default for Size {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }
}

/// Rectangle of a tappable area, in canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            width: 100,
            height: 100,
        }
    }
}

/// A tappable area as saved by the editor. Either half may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalArea {
    #[serde(default)]
    pub bounds: Option<Bounds>,
    /// LINE action object (`{"type": "uri", ...}`), passed through untouched.
    #[serde(default)]
    pub action: Option<Value>,
}

impl LocalArea {
    /// The action, unless it is missing, empty or `{"type": "none"}`.
    fn publishable_action(&self) -> Option<&Value> {
        let action = self.action.as_ref()?;
        match action {
            Value::Null => None,
            Value::Object(map) if map.is_empty() => None,
            Value::Object(map) if map.get("type").and_then(Value::as_str) == Some("none") => None,
            other => Some(other),
        }
    }
}

/// Layout half of a local menu definition.
#[derive(Debug, Clone, PartialEq)]
pub struct MenuLayout {
    pub size: Size,
    pub selected: bool,
    /// Empty means "use the menu name".
    pub chat_bar_text: String,
    pub areas: Vec<LocalArea>,
}

impl Default for MenuLayout {
    fn default() -> Self {
        Self {
            size: Size::default(),
            selected: true,
            chat_bar_text: String::new(),
            areas: Vec::new(),
        }
    }
}

/// Area in LINE's wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteArea {
    pub bounds: Bounds,
    pub action: Value,
}

/// Request body for `POST /v2/bot/richmenu`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RichMenuDescriptor {
    pub size: Size,
    pub selected: bool,
    pub name: String,
    pub chat_bar_text: String,
    pub areas: Vec<RemoteArea>,
}

/// Translate a local layout into the descriptor LINE expects.
///
/// Areas without a usable action are dropped. LINE rejects a menu with no
/// areas at all, so an empty result gets one full-canvas area that sends the
/// text "menu".
pub fn build_descriptor(name: &str, layout: &MenuLayout) -> RichMenuDescriptor {
    let mut areas: Vec<RemoteArea> = layout
        .areas
        .iter()
        .filter_map(|area| {
            let action = area.publishable_action()?;
            Some(RemoteArea {
                bounds: area.bounds.unwrap_or_default(),
                action: action.clone(),
            })
        })
        .collect();

    if areas.is_empty() {
        areas.push(RemoteArea {
            bounds: Bounds {
                x: 0,
                y: 0,
                width: layout.size.width,
                height: layout.size.height,
            },
            action: serde_json::json!({"type": "message", "text": "menu"}),
        });
    }

    let chat_bar_text = if layout.chat_bar_text.trim().is_empty() {
        name.to_string()
    } else {
        layout.chat_bar_text.clone()
    };

    RichMenuDescriptor {
        size: layout.size,
        selected: layout.selected,
        name: name.to_string(),
        chat_bar_text,
        areas,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn area(bounds: Option<Bounds>, action: Option<Value>) -> LocalArea {
        LocalArea { bounds, action }
    }

    #[test]
    fn none_and_missing_actions_are_dropped() {
        let layout = MenuLayout {
            areas: vec![
                area(None, None),
                area(None, Some(json!({"type": "none"}))),
                area(None, Some(json!({}))),
                area(
                    Some(Bounds { x: 10, y: 20, width: 30, height: 40 }),
                    Some(json!({"type": "uri", "uri": "https://example.com"})),
                ),
            ],
            ..Default::default()
        };

        let d = build_descriptor("Main", &layout);
        assert_eq!(d.areas.len(), 1);
        assert_eq!(d.areas[0].bounds, Bounds { x: 10, y: 20, width: 30, height: 40 });
        assert_eq!(d.areas[0].action["uri"], "https://example.com");
    }

    #[test]
    fn empty_area_list_gets_full_canvas_placeholder() {
        let layout = MenuLayout {
            areas: vec![area(None, Some(json!({"type": "none"})))],
            ..Default::default()
        };

        let d = build_descriptor("Main", &layout);
        assert_eq!(d.areas.len(), 1);
        assert_eq!(
            d.areas[0].bounds,
            Bounds { x: 0, y: 0, width: 2500, height: 1686 }
        );
        assert_eq!(d.areas[0].action, json!({"type": "message", "text": "menu"}));
    }

    #[test]
    fn missing_bounds_fall_back_to_small_square() {
        let layout = MenuLayout {
            areas: vec![area(None, Some(json!({"type": "message", "text": "hi"})))],
            ..Default::default()
        };

        let d = build_descriptor("Main", &layout);
        assert_eq!(d.areas[0].bounds, Bounds::default());
    }

    #[test]
    fn chat_bar_text_falls_back_to_name() {
        let d = build_descriptor("Spring Sale", &MenuLayout::default());
        assert_eq!(d.chat_bar_text, "Spring Sale");

        let layout = MenuLayout {
            chat_bar_text: "Tap me".to_string(),
            ..Default::default()
        };
        assert_eq!(build_descriptor("Spring Sale", &layout).chat_bar_text, "Tap me");
    }

    #[test]
    fn serializes_in_line_wire_format() {
        let d = build_descriptor("Main", &MenuLayout::default());
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v["size"], json!({"width": 2500, "height": 1686}));
        assert_eq!(v["chatBarText"], "Main");
        assert_eq!(v["selected"], true);
        assert!(v.get("chat_bar_text").is_none());
    }
}
