//! Drawable element model.
//!
//! Elements travel as loosely-shaped JSON objects. Only the identity, the type
//! tag and the anchor coordinates are required; every other attribute is kept
//! verbatim so a re-broadcast carries exactly what the sender produced.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Recognized element type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Rectangle,
    Ellipse,
    Diamond,
    Line,
    Arrow,
    Text,
    /// Freehand path.
    Freedraw,
    Image,
    Frame,
}

impl ElementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rectangle => "rectangle",
            Self::Ellipse => "ellipse",
            Self::Diamond => "diamond",
            Self::Line => "line",
            Self::Arrow => "arrow",
            Self::Text => "text",
            Self::Freedraw => "freedraw",
            Self::Image => "image",
            Self::Frame => "frame",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ElementType {
    type Err = ElementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rectangle" => Ok(Self::Rectangle),
            "ellipse" => Ok(Self::Ellipse),
            "diamond" => Ok(Self::Diamond),
            "line" => Ok(Self::Line),
            "arrow" => Ok(Self::Arrow),
            "text" => Ok(Self::Text),
            "freedraw" => Ok(Self::Freedraw),
            "image" => Ok(Self::Image),
            "frame" => Ok(Self::Frame),
            other => Err(ElementError::UnknownType(other.to_string())),
        }
    }
}

/// Reasons an incoming element is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ElementError {
    #[error("element is not a JSON object")]
    NotAnObject,
    #[error("element id is missing or empty")]
    MissingId,
    #[error("element type is missing")]
    MissingType,
    #[error("unknown element type '{0}'")]
    UnknownType(String),
    #[error("element coordinate '{0}' is missing or not a number")]
    BadCoordinate(&'static str),
}

/// A single validated primitive on the shared canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct DrawableElement {
    id: String,
    kind: ElementType,
    x: f64,
    y: f64,
    attributes: Map<String, Value>,
}

impl DrawableElement {
    /// Build a minimal element. Extra attributes can be added with [`with_attr`](Self::with_attr).
    pub fn new(id: impl Into<String>, kind: ElementType, x: f64, y: f64) -> Self {
        let id = id.into();
        let mut attributes = Map::new();
        attributes.insert("id".into(), Value::String(id.clone()));
        attributes.insert("type".into(), Value::String(kind.as_str().into()));
        attributes.insert("x".into(), Value::from(x));
        attributes.insert("y".into(), Value::from(y));
        Self {
            id,
            kind,
            x,
            y,
            attributes,
        }
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<Value>) -> Self {
        if !matches!(key, "id" | "type" | "x" | "y") {
            self.attributes.insert(key.to_string(), value.into());
        }
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> ElementType {
        self.kind
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    /// Validate a batch, dropping malformed entries and keeping survivors in order.
    pub fn filter_valid(values: impl IntoIterator<Item = Value>) -> Vec<Self> {
        values
            .into_iter()
            .filter_map(|v| match Self::try_from(v) {
                Ok(element) => Some(element),
                Err(e) => {
                    tracing::debug!(%e, "Dropping malformed element");
                    None
                }
            })
            .collect()
    }
}

impl TryFrom<Value> for DrawableElement {
    type Error = ElementError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(attributes) = value else {
            return Err(ElementError::NotAnObject);
        };

        let id = attributes
            .get("id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or(ElementError::MissingId)?
            .to_string();

        let kind = attributes
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ElementError::MissingType)?
            .parse::<ElementType>()?;

        let x = attributes
            .get("x")
            .and_then(Value::as_f64)
            .ok_or(ElementError::BadCoordinate("x"))?;
        let y = attributes
            .get("y")
            .and_then(Value::as_f64)
            .ok_or(ElementError::BadCoordinate("y"))?;

        Ok(Self {
            id,
            kind,
            x,
            y,
            attributes,
        })
    }
}

impl From<DrawableElement> for Value {
    fn from(element: DrawableElement) -> Self {
        Value::Object(element.attributes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_element_keeps_extra_attributes() {
        let raw = json!({
            "id": "e1",
            "type": "rectangle",
            "x": 10,
            "y": 20.5,
            "width": 100,
            "strokeColor": "#1e1e1e",
            "roughness": 1
        });
        let element = DrawableElement::try_from(raw.clone()).unwrap();
        assert_eq!(element.id(), "e1");
        assert_eq!(element.kind(), ElementType::Rectangle);
        assert_eq!(element.x(), 10.0);
        assert_eq!(element.y(), 20.5);
        assert_eq!(serde_json::to_value(&element).unwrap(), raw);
    }

    #[test]
    fn test_rejects_malformed() {
        let cases = [
            (json!("nope"), ElementError::NotAnObject),
            (json!({"type": "ellipse", "x": 0, "y": 0}), ElementError::MissingId),
            (json!({"id": "", "type": "ellipse", "x": 0, "y": 0}), ElementError::MissingId),
            (json!({"id": "a", "x": 0, "y": 0}), ElementError::MissingType),
            (
                json!({"id": "a", "type": "hexagon", "x": 0, "y": 0}),
                ElementError::UnknownType("hexagon".into()),
            ),
            (json!({"id": "a", "type": "line", "x": "1", "y": 0}), ElementError::BadCoordinate("x")),
            (json!({"id": "a", "type": "line", "x": 1}), ElementError::BadCoordinate("y")),
        ];
        for (raw, expected) in cases {
            assert_eq!(DrawableElement::try_from(raw).unwrap_err(), expected);
        }
    }

    #[test]
    fn test_deserialize_through_serde() {
        let element: DrawableElement =
            serde_json::from_str(r#"{"id":"t","type":"text","x":1,"y":2,"text":"hi"}"#).unwrap();
        assert_eq!(serde_json::to_value(&element).unwrap()["text"], "hi");
        assert!(serde_json::from_str::<DrawableElement>(r#"{"id":"t","type":"blob","x":1,"y":2}"#).is_err());
    }

    #[test]
    fn test_points_pass_through_untouched() {
        let raw = json!({
            "id": "p",
            "type": "freedraw",
            "x": 0,
            "y": 0,
            "points": [[0, 0], [5, 5.5], "bad", [1]]
        });
        let element = DrawableElement::try_from(raw.clone()).unwrap();
        assert_eq!(element.kind(), ElementType::Freedraw);
        assert_eq!(Value::from(element), raw);
    }

    #[test]
    fn test_filter_valid_preserves_order() {
        let batch = vec![
            json!({"id": "a", "type": "rectangle", "x": 0, "y": 0}),
            json!({"id": "b", "type": "rectangle"}),
            json!({"id": "c", "type": "arrow", "x": 1, "y": 1}),
        ];
        let ids: Vec<_> = DrawableElement::filter_valid(batch)
            .iter()
            .map(|e| e.id().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_new_and_with_attr() {
        let element = DrawableElement::new("n", ElementType::Diamond, 3.0, 4.0)
            .with_attr("backgroundColor", "#fff")
            .with_attr("id", "ignored");
        assert_eq!(element.id(), "n");
        let value = serde_json::to_value(&element).unwrap();
        assert_eq!(value["backgroundColor"], "#fff");
        assert_eq!(value["id"], "n");
        let round: DrawableElement = serde_json::from_value(serde_json::to_value(&element).unwrap()).unwrap();
        assert_eq!(round, element);
    }
}
