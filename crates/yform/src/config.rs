#![forbid(unsafe_code)]

//! Display and behaviour configuration for forms and fields.
//!
//! Both [`FormConfig`] and [`FieldConfig`] deserialize from the same JSON
//! shape the component props use (camelCase keys). [`FieldProps`] is the
//! programmatic counterpart of `FieldConfig` and can carry custom validators.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use yform_validation::{ConfigError, FormRules, OneOrMany, Rule, RuleDef, RuleSet};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Where labels sit relative to their controls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelPosition {
    Top,
    Left,
    #[default]
    Right,
}

impl LabelPosition {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Top => "top",
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

/// Control size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Size {
    Medium,
    Small,
    Mini,
}

impl Size {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Medium => "medium",
            Self::Small => "small",
            Self::Mini => "mini",
        }
    }
}

// ---------------------------------------------------------------------------
// LabelWidth
// ---------------------------------------------------------------------------

/// Label column width: measured from the labels, or a fixed pixel length.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LabelWidthRepr", into = "String")]
pub enum LabelWidth {
    Auto,
    Fixed(f32),
}

impl FromStr for LabelWidth {
    type Err = ConfigError;

    /// Accepts `auto`, `80px` and `80`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        if text.eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }
        let number = text.strip_suffix("px").unwrap_or(text).trim();
        match number.parse::<f32>() {
            Ok(px) if px.is_finite() && px >= 0.0 => Ok(Self::Fixed(px)),
            _ => Err(ConfigError::InvalidLabelWidth(s.to_string())),
        }
    }
}

impl fmt::Display for LabelWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Fixed(px) => write!(f, "{px}px"),
        }
    }
}

impl From<LabelWidth> for String {
    fn from(width: LabelWidth) -> Self {
        width.to_string()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LabelWidthRepr {
    Text(String),
    Px(f32),
}

impl TryFrom<LabelWidthRepr> for LabelWidth {
    type Error = ConfigError;

    fn try_from(repr: LabelWidthRepr) -> Result<Self, Self::Error> {
        match repr {
            LabelWidthRepr::Text(text) => text.parse(),
            LabelWidthRepr::Px(px) if px.is_finite() && px >= 0.0 => Ok(Self::Fixed(px)),
            LabelWidthRepr::Px(px) => Err(ConfigError::InvalidLabelWidth(px.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// FormConfig
// ---------------------------------------------------------------------------

fn yes() -> bool {
    true
}

/// Form-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FormConfig {
    /// Rule table keyed by property path.
    #[serde(default)]
    pub rules: FormRules,
    #[serde(default)]
    pub label_width: Option<LabelWidth>,
    #[serde(default)]
    pub label_position: LabelPosition,
    #[serde(default)]
    pub inline: bool,
    #[serde(default)]
    pub size: Option<Size>,
    /// Show error text under fields. Fields may opt out individually.
    #[serde(default = "yes")]
    pub show_message: bool,
    /// Re-validate when the rule table is replaced.
    #[serde(default = "yes")]
    pub validate_on_rule_change: bool,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            rules: FormRules::default(),
            label_width: None,
            label_position: LabelPosition::default(),
            inline: false,
            size: None,
            show_message: true,
            validate_on_rule_change: true,
        }
    }
}

impl FormConfig {
    /// Parse from JSON.
    ///
    /// # Errors
    ///
    /// Shape errors and rule errors as [`ConfigError`].
    pub fn from_json(value: serde_json::Value) -> Result<Self, ConfigError> {
        Ok(serde_json::from_value(value)?)
    }
}

// ---------------------------------------------------------------------------
// Field props
// ---------------------------------------------------------------------------

/// Everything a field is mounted with.
#[derive(Debug, Clone)]
pub struct FieldProps {
    /// Model path. Path-less fields only take part in layout.
    pub path: Option<String>,
    pub label: Option<String>,
    /// Field-local rules. When set, the form's rules for the same path are
    /// ignored.
    pub rules: Option<RuleSet>,
    /// Adds a presence rule and the required marker.
    pub required: bool,
    pub show_message: bool,
    /// External error that overrides the computed state.
    pub error: Option<String>,
    pub label_width: Option<LabelWidth>,
    pub size: Option<Size>,
    pub visible: bool,
    /// Re-validate with the change trigger when the model value at `path`
    /// changes between flushes.
    pub watch_model: bool,
}

impl Default for FieldProps {
    fn default() -> Self {
        Self {
            path: None,
            label: None,
            rules: None,
            required: false,
            show_message: true,
            error: None,
            label_width: None,
            size: None,
            visible: true,
            watch_model: true,
        }
    }
}

impl FieldProps {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Props for a field bound to `path`.
    #[must_use]
    pub fn at(path: impl Into<String>) -> Self {
        Self::default().path(path)
    }

    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[must_use]
    pub fn rules(mut self, rules: impl Into<RuleSet>) -> Self {
        self.rules = Some(rules.into());
        self
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn show_message(mut self, show: bool) -> Self {
        self.show_message = show;
        self
    }

    #[must_use]
    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    #[must_use]
    pub fn label_width(mut self, width: LabelWidth) -> Self {
        self.label_width = Some(width);
        self
    }

    #[must_use]
    pub fn size(mut self, size: Size) -> Self {
        self.size = Some(size);
        self
    }

    #[must_use]
    pub fn visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    #[must_use]
    pub fn watch_model(mut self, watch: bool) -> Self {
        self.watch_model = watch;
        self
    }
}

/// Serialized form of [`FieldProps`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FieldConfig {
    #[serde(default, alias = "prop")]
    pub path: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub rules: Option<OneOrMany<RuleDef>>,
    #[serde(default)]
    pub required: bool,
    #[serde(default = "yes")]
    pub show_message: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub label_width: Option<LabelWidth>,
    #[serde(default)]
    pub size: Option<Size>,
    #[serde(default = "yes")]
    pub visible: bool,
    #[serde(default = "yes")]
    pub watch_model: bool,
}

impl TryFrom<FieldConfig> for FieldProps {
    type Error = ConfigError;

    fn try_from(config: FieldConfig) -> Result<Self, Self::Error> {
        let path = config.path.clone().unwrap_or_default();
        let rules = config
            .rules
            .map(|defs| {
                defs.into_vec()
                    .into_iter()
                    .enumerate()
                    .map(|(index, def)| {
                        Rule::try_from(def).map_err(|source| ConfigError::InRule {
                            path: path.clone(),
                            index,
                            source: Box::new(source),
                        })
                    })
                    .collect::<Result<RuleSet, _>>()
            })
            .transpose()?;
        Ok(Self {
            path: config.path,
            label: config.label,
            rules,
            required: config.required,
            show_message: config.show_message,
            error: config.error,
            label_width: config.label_width,
            size: config.size,
            visible: config.visible,
            watch_model: config.watch_model,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn label_width_parses_all_spellings() {
        assert_eq!("auto".parse::<LabelWidth>().unwrap(), LabelWidth::Auto);
        assert_eq!("80px".parse::<LabelWidth>().unwrap(), LabelWidth::Fixed(80.0));
        assert_eq!(" 96 ".parse::<LabelWidth>().unwrap(), LabelWidth::Fixed(96.0));
        assert!(matches!(
            "wide".parse::<LabelWidth>(),
            Err(ConfigError::InvalidLabelWidth(_))
        ));
        assert!("-4px".parse::<LabelWidth>().is_err());
    }

    #[test]
    fn label_width_displays_as_css() {
        assert_eq!(LabelWidth::Fixed(80.0).to_string(), "80px");
        assert_eq!(LabelWidth::Auto.to_string(), "auto");
    }

    #[test]
    fn form_config_from_json() {
        let config = FormConfig::from_json(json!({
            "labelWidth": "auto",
            "labelPosition": "top",
            "inline": true,
            "size": "mini",
            "rules": {
                "name": { "required": true, "message": "name is required" }
            }
        }))
        .unwrap();
        assert_eq!(config.label_width, Some(LabelWidth::Auto));
        assert_eq!(config.label_position, LabelPosition::Top);
        assert!(config.inline);
        assert_eq!(config.size, Some(Size::Mini));
        assert!(config.show_message);
        assert!(config.validate_on_rule_change);
        assert!(config.rules.get("name").is_some());
    }

    #[test]
    fn numeric_label_width_in_json() {
        let config = FormConfig::from_json(json!({ "labelWidth": 120 })).unwrap();
        assert_eq!(config.label_width, Some(LabelWidth::Fixed(120.0)));
    }

    #[test]
    fn bad_label_width_in_json_is_rejected() {
        assert!(FormConfig::from_json(json!({ "labelWidth": "huge" })).is_err());
    }

    #[test]
    fn field_config_converts_to_props() {
        let config: FieldConfig = serde_json::from_value(json!({
            "prop": "name",
            "label": "Name",
            "showMessage": false,
            "rules": { "min": 3, "message": "too short", "trigger": "blur" }
        }))
        .unwrap();
        let props = FieldProps::try_from(config).unwrap();
        assert_eq!(props.path.as_deref(), Some("name"));
        assert!(!props.show_message);
        assert!(props.visible);
        assert!(props.watch_model);
        assert_eq!(props.rules.map(|r| r.len()), Some(1));
    }

    #[test]
    fn field_config_rule_errors_name_the_path() {
        let config: FieldConfig =
            serde_json::from_value(json!({ "path": "age", "rules": [{ "min": 1 }] })).unwrap();
        let err = FieldProps::try_from(config).unwrap_err();
        assert!(matches!(err, ConfigError::InRule { ref path, index: 0, .. } if path == "age"));
    }
}
