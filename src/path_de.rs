use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::DecodeError;

fn with_path<T>(result: Result<T, serde_path_to_error::Error<serde_json::Error>>) -> Result<T, DecodeError> {
    result.map_err(|err| DecodeError {
        path: err.path().to_string(),
        source: err.into_inner(),
    })
}

/// Deserialize with JSON-path context in error messages.
pub fn from_str_with_path<T: DeserializeOwned>(src: &str) -> Result<T, DecodeError> {
    let de = &mut serde_json::Deserializer::from_str(src);
    with_path(serde_path_to_error::deserialize::<_, T>(de))
}

pub fn from_slice_with_path<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, DecodeError> {
    let de = &mut serde_json::Deserializer::from_slice(bytes);
    with_path(serde_path_to_error::deserialize::<_, T>(de))
}

pub fn from_value_with_path<T: DeserializeOwned>(value: Value) -> Result<T, DecodeError> {
    with_path(serde_path_to_error::deserialize::<_, T>(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    #[allow(dead_code)]
    struct Outer {
        items: Vec<Inner>,
    }

    #[derive(Debug, Deserialize)]
    #[allow(dead_code)]
    struct Inner {
        size: u32,
    }

    #[test]
    fn errors_name_the_failing_path() {
        let err = from_str_with_path::<Outer>(r#"{"items": [{"size": 1}, {"size": "big"}]}"#).unwrap_err();
        assert_eq!(err.path, "items[1].size");
        let err = from_value_with_path::<Outer>(serde_json::json!({"items": [{}]})).unwrap_err();
        assert!(err.path.starts_with("items[0]"), "{}", err.path);
    }
}
