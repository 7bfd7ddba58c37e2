use serde::{Deserialize, Serialize};

/// Horizontal alignment of a paragraph.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    /// Flush left (service default).
    #[default]
    Left,
    /// Centered.
    Center,
    /// Flush right.
    Right,
    /// Justified.
    Justify,
}

/// Optional formatting attached to a text-adding operation.
///
/// Every key is optional and overrides the service default for that element
/// only. Keys this version does not know are ignored when decoding so newer
/// callers can talk to older services.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct Style {
    /// Font family name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,

    /// Font size in points.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size: Option<u32>,

    /// Bold weight.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,

    /// Italic slant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub italic: Option<bool>,

    /// Single underline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub underline: Option<bool>,

    /// Text color, e.g. `#0066CC`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    /// Paragraph alignment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alignment: Option<Alignment>,

    /// Render the paragraph as a list item: `true` numbered, `false` bulleted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ordered: Option<bool>,
}

impl Style {
    /// Whether no key is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_keys_are_ignored() {
        let style: Style = serde_json::from_str(
            r##"{"font_size": 14, "bold": true, "color": "#0066CC", "alignment": "center", "shadow": "soft"}"##,
        )
        .unwrap();

        assert_eq!(style.font_size, Some(14));
        assert_eq!(style.bold, Some(true));
        assert_eq!(style.alignment, Some(Alignment::Center));
        assert_eq!(style.italic, None);
    }

    #[test]
    fn test_empty_style() {
        let style: Style = serde_json::from_str("{}").unwrap();
        assert!(style.is_empty());
    }
}
