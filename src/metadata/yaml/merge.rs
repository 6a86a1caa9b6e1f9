use std::sync::LazyLock;

use saphyr::{MarkedYaml, YamlData};

use crate::metadata::error::YamlMergeKeyError;

use super::as_string_node;

static MERGE_KEY: LazyLock<MarkedYaml> = LazyLock::new(|| as_string_node("<<"));

pub fn process_merge_keys(mut yaml: MarkedYaml) -> Result<MarkedYaml, YamlMergeKeyError> {
    match yaml.data {
        YamlData::Sequence(a) => {
            yaml.data = merge_sequence_elements(a).map(YamlData::Sequence)?;
            Ok(yaml)
        }
        YamlData::Mapping(h) => {
            yaml.data = merge_mapping_keys(h).map(YamlData::Mapping)?;
            Ok(yaml)
        }
        _ => Ok(yaml),
    }
}

fn merge_sequence_elements(
    sequence: saphyr::AnnotatedSequence<MarkedYaml>,
) -> Result<saphyr::AnnotatedSequence<MarkedYaml>, YamlMergeKeyError> {
    sequence.into_iter().map(process_merge_keys).collect()
}

fn merge_mapping_keys(
    mapping: saphyr::AnnotatedMapping<MarkedYaml>,
) -> Result<saphyr::AnnotatedMapping<MarkedYaml>, YamlMergeKeyError> {
    let mut mapping: saphyr::AnnotatedMapping<MarkedYaml> = mapping
        .into_iter()
        .map(|(key, value)| {
            process_merge_keys(key)
                .and_then(|key| process_merge_keys(value).map(|value| (key, value)))
        })
        .collect::<Result<_, _>>()?;

    if let Some(value) = mapping.remove(&MERGE_KEY) {
        merge_into_mapping(mapping, value)
    } else {
        Ok(mapping)
    }
}

fn merge_into_mapping(
    mapping: saphyr::AnnotatedMapping<MarkedYaml>,
    value: MarkedYaml,
) -> Result<saphyr::AnnotatedMapping<MarkedYaml>, YamlMergeKeyError> {
    match value.data {
        YamlData::<MarkedYaml>::Sequence(a) => a.into_iter().try_fold(mapping, |acc, e| {
            if let YamlData::Mapping(h) = e.data {
                Ok(merge_mappings(acc, h))
            } else {
                Err(YamlMergeKeyError::new(e))
            }
        }),
        YamlData::<MarkedYaml>::Mapping(h) => Ok(merge_mappings(mapping, h)),
        _ => Err(YamlMergeKeyError::new(value)),
    }
}

fn merge_mappings(
    mut mapping1: saphyr::AnnotatedMapping<MarkedYaml>,
    mapping2: saphyr::AnnotatedMapping<MarkedYaml>,
) -> saphyr::AnnotatedMapping<MarkedYaml> {
    for (key, value) in mapping2 {
        mapping1.entry(key).or_insert(value);
    }
    mapping1
}
