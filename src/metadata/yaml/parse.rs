use std::str::FromStr;

use loot_condition_interpreter::Expression;
use saphyr::{AnnotatedMapping, MarkedYaml, Marker, Yaml, YamlData};

use super::super::error::{ExpectedType, MetadataParsingErrorReason, ParseMetadataError};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum YamlObjectType {
    File,
    Group,
    Location,
    Message,
    MessageContent,
    PluginCleaningData,
    PluginMetadata,
    Tag,
    MetadataDocument,
    BashTagsElement,
}

impl std::fmt::Display for YamlObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            YamlObjectType::File => write!(f, "file"),
            YamlObjectType::Group => write!(f, "group"),
            YamlObjectType::Location => write!(f, "location"),
            YamlObjectType::Message => write!(f, "message"),
            YamlObjectType::MessageContent => write!(f, "message content"),
            YamlObjectType::PluginCleaningData => write!(f, "plugin cleaning data"),
            YamlObjectType::PluginMetadata => write!(f, "plugin metadata"),
            YamlObjectType::Tag => write!(f, "tag"),
            YamlObjectType::MetadataDocument => write!(f, "metadata document"),
            YamlObjectType::BashTagsElement => write!(f, "bash tags"),
        }
    }
}

/// A type that can be parsed from a YAML node loaded with marker
/// information preserved, so that parse errors can reference a location in
/// the source file.
pub trait TryFromYaml: Sized {
    fn try_from_yaml(value: &MarkedYaml) -> Result<Self, ParseMetadataError>;
}

/// Converts a [`MarkedYaml`] tree into a plain [`Yaml`] tree, discarding
/// location information. Used to render YAML nodes back to a string for
/// inclusion in error messages.
pub fn to_unmarked_yaml(yaml: &MarkedYaml) -> Yaml {
    match &yaml.data {
        YamlData::Value(scalar) => Yaml::Value(scalar.clone()),
        YamlData::Sequence(v) => Yaml::Sequence(v.iter().map(to_unmarked_yaml).collect()),
        YamlData::Mapping(v) => Yaml::Mapping(
            v.iter()
                .map(|(key, value)| (to_unmarked_yaml(key), to_unmarked_yaml(value)))
                .collect(),
        ),
        YamlData::Alias(v) => Yaml::Alias(*v),
        YamlData::BadValue => Yaml::BadValue,
    }
}

pub fn as_string_node(value: &str) -> MarkedYaml {
    MarkedYaml {
        span: saphyr_parser::Span::default(),
        data: YamlData::Value(saphyr::Scalar::String(value.into())),
    }
}

pub fn get_value<'a>(
    mapping: &'a AnnotatedMapping<MarkedYaml>,
    key: &'static str,
) -> Option<&'a MarkedYaml> {
    mapping.get(&as_string_node(key))
}

pub fn get_string_value<'a>(
    hash: &'a AnnotatedMapping<MarkedYaml>,
    key: &'static str,
    yaml_type: YamlObjectType,
) -> Result<Option<(Marker, &'a str)>, ParseMetadataError> {
    match get_value(hash, key) {
        Some(n) => match n.data.as_str() {
            Some(s) => Ok(Some((n.span.start, s))),
            None => Err(ParseMetadataError::unexpected_value_type(
                n.span.start,
                key,
                yaml_type,
                ExpectedType::String,
            )),
        },
        None => Ok(None),
    }
}

pub fn get_required_string_value<'a>(
    marker: Marker,
    hash: &'a AnnotatedMapping<MarkedYaml>,
    key: &'static str,
    yaml_type: YamlObjectType,
) -> Result<&'a str, ParseMetadataError> {
    match get_string_value(hash, key, yaml_type)? {
        Some(n) => Ok(n.1),
        None => Err(ParseMetadataError::missing_key(marker, key, yaml_type)),
    }
}

pub fn get_strings_vec_value<'a>(
    hash: &'a AnnotatedMapping<MarkedYaml>,
    key: &'static str,
    yaml_type: YamlObjectType,
) -> Result<Vec<&'a str>, ParseMetadataError> {
    match get_value(hash, key) {
        Some(n) => match n.data.as_sequence() {
            Some(n) => n
                .iter()
                .map(|e| match e.data.as_str() {
                    Some(s) => Ok(s),
                    None => Err(ParseMetadataError::unexpected_value_type(
                        e.span.start,
                        key,
                        yaml_type,
                        ExpectedType::String,
                    )),
                })
                .collect::<Result<Vec<_>, _>>(),
            None => Err(ParseMetadataError::unexpected_value_type(
                n.span.start,
                key,
                yaml_type,
                ExpectedType::Array,
            )),
        },
        None => Ok(Vec::new()),
    }
}

pub fn as_mapping(
    value: &MarkedYaml,
    yaml_type: YamlObjectType,
) -> Result<&AnnotatedMapping<MarkedYaml>, ParseMetadataError> {
    match value.data.as_mapping() {
        Some(h) => Ok(h),
        None => Err(ParseMetadataError::unexpected_type(
            value.span.start,
            yaml_type,
            ExpectedType::Map,
        )),
    }
}

pub fn get_u32_value(
    hash: &AnnotatedMapping<MarkedYaml>,
    key: &'static str,
    yaml_type: YamlObjectType,
) -> Result<Option<u32>, ParseMetadataError> {
    match get_value(hash, key) {
        Some(n) => match n.data.as_i64() {
            Some(i) => i.try_into().map(Some).map_err(|_| {
                ParseMetadataError::new(n.span.start, MetadataParsingErrorReason::NonU32Number(i))
            }),
            None => Err(ParseMetadataError::unexpected_value_type(
                n.span.start,
                key,
                yaml_type,
                ExpectedType::Number,
            )),
        },
        None => Ok(None),
    }
}

pub fn get_slice_value<'a>(
    hash: &'a AnnotatedMapping<MarkedYaml>,
    key: &'static str,
    yaml_type: YamlObjectType,
) -> Result<&'a [MarkedYaml], ParseMetadataError> {
    if let Some(value) = get_value(hash, key) {
        match value.data.as_sequence() {
            Some(n) => Ok(n.as_slice()),
            None => Err(ParseMetadataError::unexpected_value_type(
                value.span.start,
                key,
                yaml_type,
                ExpectedType::Array,
            )),
        }
    } else {
        Ok(&[])
    }
}

/// A convenience alias, kept for call sites that parse a list of nested
/// objects directly off a mapping (as opposed to going through
/// [`get_value`] and matching on the node manually).
pub fn get_as_slice<'a>(
    hash: &'a AnnotatedMapping<MarkedYaml>,
    key: &'static str,
    yaml_type: YamlObjectType,
) -> Result<&'a [MarkedYaml], ParseMetadataError> {
    get_slice_value(hash, key, yaml_type)
}

pub fn parse_condition(
    hash: &AnnotatedMapping<MarkedYaml>,
    key: &'static str,
    yaml_type: YamlObjectType,
) -> Result<Option<String>, ParseMetadataError> {
    match get_string_value(hash, key, yaml_type)? {
        Some((marker, s)) => {
            let s = s.to_string();
            if let Err(e) = Expression::from_str(&s) {
                return Err(ParseMetadataError::invalid_condition(marker, s, e));
            }
            Ok(Some(s))
        }
        None => Ok(None),
    }
}
