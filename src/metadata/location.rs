use saphyr::{MarkedYaml, Scalar, YamlData};

use super::{
    error::{ExpectedType, ParseMetadataError},
    yaml::{EmitYaml, TryFromYaml, YamlEmitter, YamlObjectType, get_required_string_value},
};

/// Represents a URL at which the parent plugin can be found.
#[derive(Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Location {
    url: Box<str>,
    name: Option<Box<str>>,
}

impl Location {
    /// Construct a [Location] with the given URL.
    #[must_use]
    pub fn new(url: String) -> Self {
        Location {
            url: url.into_boxed_str(),
            ..Default::default()
        }
    }

    /// Set a name for the URL, eg. the page or site name.
    #[must_use]
    pub fn with_name(mut self, name: String) -> Self {
        self.name = Some(name.into_boxed_str());
        self
    }

    /// Get the URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Get the descriptive name of this location.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl TryFromYaml for Location {
    fn try_from_yaml(value: &MarkedYaml) -> Result<Self, ParseMetadataError> {
        match &value.data {
            YamlData::Value(Scalar::String(s)) => Ok(Location {
                url: s.to_string().into_boxed_str(),
                name: None,
            }),
            YamlData::Mapping(h) => {
                let link = get_required_string_value(
                    value.span.start,
                    h,
                    "link",
                    YamlObjectType::Location,
                )?;
                let name = get_required_string_value(
                    value.span.start,
                    h,
                    "name",
                    YamlObjectType::Location,
                )?;

                Ok(Location {
                    url: link.into(),
                    name: Some(name.into()),
                })
            }
            _ => Err(ParseMetadataError::unexpected_type(
                value.span.start,
                YamlObjectType::Location,
                ExpectedType::MapOrString,
            )),
        }
    }
}

impl EmitYaml for Location {
    fn is_scalar(&self) -> bool {
        self.name.is_none()
    }

    fn emit_yaml(&self, emitter: &mut YamlEmitter<'_>) {
        if let Some(name) = &self.name {
            emitter.begin_map();

            emitter.write_map_key("link");
            emitter.write_single_quoted_str(&self.url);

            emitter.write_map_key("name");
            emitter.write_single_quoted_str(name);

            emitter.end_map();
        } else {
            emitter.write_single_quoted_str(&self.url);
        }
    }
}
