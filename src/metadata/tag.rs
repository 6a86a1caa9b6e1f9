use saphyr::{MarkedYaml, Scalar, YamlData};

use super::error::ExpectedType;
use super::error::ParseMetadataError;
use super::yaml::{
    EmitYaml, TryFromYaml, YamlEmitter, YamlObjectType, as_mapping, get_required_string_value,
    parse_condition,
};

/// Represents whether a Bash Tag suggestion is for addition or removal.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum TagSuggestion {
    #[default]
    Addition,
    Removal,
}

/// Represents a Bash Tag suggestion for a plugin.
#[derive(Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Tag {
    name: String,
    suggestion: TagSuggestion,
    condition: Option<String>,
}

impl Tag {
    /// Create a [Tag] suggestion for the given tag name.
    #[must_use]
    pub fn new(name: String, suggestion: TagSuggestion) -> Self {
        Self {
            name,
            suggestion,
            condition: None,
        }
    }

    /// Set the condition string.
    #[must_use]
    pub fn with_condition(mut self, condition: String) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Get the tag's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get if the tag should be added.
    pub fn is_addition(&self) -> bool {
        self.suggestion == TagSuggestion::Addition
    }

    /// Get the condition string.
    pub fn condition(&self) -> Option<&str> {
        self.condition.as_deref()
    }
}

impl TryFromYaml for Tag {
    fn try_from_yaml(value: &MarkedYaml) -> Result<Self, ParseMetadataError> {
        match &value.data {
            YamlData::Value(Scalar::String(s)) => {
                let (name, suggestion) = name_and_suggestion(s);
                Ok(Tag {
                    name,
                    suggestion,
                    condition: None,
                })
            }
            YamlData::Mapping(_) => {
                let mapping = as_mapping(value, YamlObjectType::Tag)?;

                let name =
                    get_required_string_value(value.span.start, mapping, "name", YamlObjectType::Tag)?;

                let condition = parse_condition(mapping, "condition", YamlObjectType::Tag)?;

                let (name, suggestion) = name_and_suggestion(name);
                Ok(Tag {
                    name,
                    suggestion,
                    condition,
                })
            }
            _ => Err(ParseMetadataError::unexpected_type(
                value.span.start,
                YamlObjectType::Tag,
                ExpectedType::MapOrString,
            )),
        }
    }
}

fn name_and_suggestion(value: &str) -> (String, TagSuggestion) {
    if let Some(name) = value.strip_prefix("-") {
        (name.to_string(), TagSuggestion::Removal)
    } else {
        (value.to_string(), TagSuggestion::Addition)
    }
}

impl EmitYaml for Tag {
    fn is_scalar(&self) -> bool {
        self.condition.is_none()
    }

    fn emit_yaml(&self, emitter: &mut YamlEmitter<'_>) {
        if self.is_scalar() {
            let name = self.full_name();
            emitter.write_unquoted_str(&name);
        } else {
            emitter.begin_map();

            emitter.write_map_key("name");
            emitter.write_unquoted_str(&self.full_name());

            if let Some(condition) = &self.condition {
                emitter.write_map_key("condition");
                emitter.write_condition(condition);
            }

            emitter.end_map();
        }
    }
}

impl Tag {
    fn full_name(&self) -> String {
        if self.suggestion == TagSuggestion::Removal {
            format!("-{}", self.name)
        } else {
            self.name.clone()
        }
    }
}
