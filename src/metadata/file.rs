use saphyr::{MarkedYaml, Scalar, YamlData};
use unicase::UniCase;

use crate::metadata::yaml::YamlAnchors;

use super::{
    error::{ExpectedType, MultilingualMessageContentsError, ParseMetadataError},
    message::{
        MessageContent, emit_message_contents, parse_message_contents_yaml,
        validate_message_contents,
    },
    yaml::{
        EmitYaml, TryFromYaml, YamlEmitter, YamlObjectType, get_required_string_value,
        get_string_value, get_value, parse_condition,
    },
};

/// Represents a file in a game's Data folder, including files in
/// subdirectories.
#[derive(Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct File {
    name: Filename,
    display_name: Option<Box<str>>,
    detail: Box<[MessageContent]>,
    condition: Option<Box<str>>,
    constraint: Option<Box<str>>,
}

impl File {
    /// Create a value with the given name. This can also be a relative path.
    #[must_use]
    pub fn new(name: String) -> Self {
        Self {
            name: Filename::new(name),
            ..Default::default()
        }
    }

    /// Set the name to be displayed for the file in messages, formatted using
    /// CommonMark.
    #[must_use]
    pub fn with_display_name(mut self, display_name: String) -> Self {
        self.display_name = Some(display_name.into_boxed_str());
        self
    }

    /// Set the condition string.
    #[must_use]
    pub fn with_condition(mut self, condition: String) -> Self {
        self.condition = Some(condition.into_boxed_str());
        self
    }

    /// Set the detail message content, which may be appended to any messages
    /// generated for this file. If multilingual, one language must be
    /// [`MessageContent::DEFAULT_LANGUAGE`].
    pub fn with_detail(
        mut self,
        detail: Vec<MessageContent>,
    ) -> Result<Self, MultilingualMessageContentsError> {
        validate_message_contents(&detail)?;
        self.detail = detail.into_boxed_slice();
        Ok(self)
    }

    /// Set the constraint string.
    #[must_use]
    pub fn with_constraint(mut self, constraint: String) -> Self {
        self.constraint = Some(constraint.into_boxed_str());
        self
    }

    /// Gets the name of the file (which may actually be a path).
    pub fn name(&self) -> &Filename {
        &self.name
    }

    /// Get the display name of the file.
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Get the detail message content of the file.
    ///
    /// If this file causes an error message to be displayed, the detail message
    /// content should be appended to that message, as it provides more detail
    /// about the error (e.g. suggestions for how to resolve it).
    pub fn detail(&self) -> &[MessageContent] {
        &self.detail
    }

    /// Get the condition string.
    pub fn condition(&self) -> Option<&str> {
        self.condition.as_deref()
    }

    /// Get the constraint string.
    pub fn constraint(&self) -> Option<&str> {
        self.constraint.as_deref()
    }
}

/// Represents a case-insensitive filename.
#[derive(Clone, Debug, Default)]
pub struct Filename(Box<str>);

impl Filename {
    /// Create a value using the given string.
    #[must_use]
    pub fn new(s: String) -> Self {
        Filename(s.into())
    }

    /// Get this Filename as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for Filename {
    fn eq(&self, other: &Self) -> bool {
        unicase::eq(&self.0, &other.0)
    }
}

impl Eq for Filename {}

impl PartialOrd for Filename {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Filename {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        UniCase::new(&self.0).cmp(&UniCase::new(&other.0))
    }
}

impl std::hash::Hash for Filename {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        UniCase::new(&self.0).hash(state);
    }
}

impl AsRef<str> for Filename {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Filename {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFromYaml for File {
    fn try_from_yaml(value: &MarkedYaml) -> Result<Self, ParseMetadataError> {
        match &value.data {
            YamlData::Value(Scalar::String(s)) => Ok(File {
                name: Filename::new(s.to_string()),
                display_name: None,
                detail: Box::default(),
                condition: None,
                constraint: None,
            }),
            YamlData::Mapping(h) => {
                let name =
                    get_required_string_value(value.span.start, h, "name", YamlObjectType::File)?;

                let display_name = get_string_value(h, "display", YamlObjectType::File)?;

                let detail = match get_value(h, "detail") {
                    Some(n) => parse_message_contents_yaml(
                        n,
                        "detail",
                        YamlObjectType::PluginCleaningData,
                    )?,
                    None => Box::default(),
                };

                let condition = parse_condition(h, "condition", YamlObjectType::File)?;

                let constraint = parse_condition(h, "constraint", YamlObjectType::File)?;

                Ok(File {
                    name: Filename::new(name.to_owned()),
                    display_name: display_name.map(|(_, s)| s.into()),
                    detail,
                    condition,
                    constraint,
                })
            }
            _ => Err(ParseMetadataError::unexpected_type(
                value.span.start,
                YamlObjectType::File,
                ExpectedType::MapOrString,
            )),
        }
    }
}

impl EmitYaml for &File {
    fn is_scalar(&self) -> bool {
        self.condition.is_none()
            && self.constraint.is_none()
            && self.detail.is_empty()
            && self.display_name.is_none()
    }

    fn has_written_anchor(&self, anchors: &YamlAnchors) -> bool {
        anchors
            .file_anchor(self)
            .is_some_and(|a| anchors.is_anchor_written(a))
    }

    fn emit_yaml(&self, emitter: &mut YamlEmitter) {
        emitter.write_anchored_value(
            |a| a.file_anchor(self).cloned(),
            |e| {
                if self.is_scalar() {
                    e.write_single_quoted_str(self.name.as_str());
                } else {
                    e.begin_map();

                    e.write_map_key("name");
                    e.write_single_quoted_str(self.name.as_str());

                    if let Some(display_name) = &self.display_name {
                        e.write_map_key("display");
                        e.write_single_quoted_str(display_name);
                    }

                    if !self.detail.is_empty() {
                        e.write_map_key("detail");
                        emit_message_contents(&self.detail, e);
                    }

                    if let Some(condition) = &self.condition {
                        e.write_map_key("condition");
                        e.write_condition(condition);
                    }

                    if let Some(constraint) = &self.constraint {
                        e.write_map_key("constraint");
                        e.write_condition(constraint);
                    }

                    e.end_map();
                }
            },
        );
    }
}

impl EmitYaml for File {
    fn is_scalar(&self) -> bool {
        (&self).is_scalar()
    }

    fn has_written_anchor(&self, anchors: &YamlAnchors) -> bool {
        (&self).has_written_anchor(anchors)
    }

    fn emit_yaml(&self, emitter: &mut YamlEmitter) {
        (&self).emit_yaml(emitter);
    }
}
