//! Deserialization that reports the JSON path of the first bad value.
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Deserialize with JSON-path context in error messages.
pub fn from_str_with_path<T: DeserializeOwned>(src: &str) -> Result<T, String> {
    let de = &mut serde_json::Deserializer::from_str(src);
    serde_path_to_error::deserialize::<_, T>(de).map_err(describe)
}

/// Same as [`from_str_with_path`] for a document already parsed (and
/// possibly narrowed by a pointer or a jq filter).
pub fn from_value_with_path<T: DeserializeOwned>(value: Value) -> Result<T, String> {
    serde_path_to_error::deserialize::<_, T>(value).map_err(describe)
}

fn describe<E: std::fmt::Display>(err: serde_path_to_error::Error<E>) -> String {
    let path = err.path().to_string();
    format!("at JSON path {path} → {}", err.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::reflected::ReflectedModel;

    #[test]
    fn errors_name_the_offending_path() {
        let error = from_value_with_path::<ReflectedModel>(serde_json::json!({"types": [{"name": 7}]})).unwrap_err();
        assert!(error.starts_with("at JSON path types[0]"), "{error}");
    }
}
