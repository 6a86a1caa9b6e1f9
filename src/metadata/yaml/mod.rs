mod emit;
mod merge;
mod parse;

pub use emit::{EmitYaml, YamlAnchors, YamlEmitter};
pub use merge::process_merge_keys;
pub use parse::{
    TryFromYaml, YamlObjectType, as_mapping, as_string_node, get_as_slice,
    get_required_string_value, get_slice_value, get_string_value, get_strings_vec_value,
    get_u32_value, get_value, parse_condition, to_unmarked_yaml,
};
