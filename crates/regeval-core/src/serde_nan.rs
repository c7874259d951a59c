//! Serde adapters that store NaN as `null`.
//!
//! JSON has no NaN literal. Evaluation records use NaN as the "error
//! undefined" sentinel, so these adapters write NaN as `null` and read `null`
//! back as NaN. Use them with `#[serde(with = "...")]`.

/// Adapter for a single `f64` field.
pub mod scalar {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if value.is_nan() {
            serializer.serialize_none()
        } else {
            serializer.serialize_some(value)
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}

/// Adapter for fixed-size `[f64; N]` fields.
pub mod array {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S, const N: usize>(
        values: &[f64; N],
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let items: Vec<Option<f64>> = values
            .iter()
            .map(|v| if v.is_nan() { None } else { Some(*v) })
            .collect();
        items.serialize(serializer)
    }

    pub fn deserialize<'de, D, const N: usize>(deserializer: D) -> Result<[f64; N], D::Error>
    where
        D: Deserializer<'de>,
    {
        let items = Vec::<Option<f64>>::deserialize(deserializer)?;
        if items.len() != N {
            return Err(D::Error::invalid_length(
                items.len(),
                &format!("an array of {N} numbers").as_str(),
            ));
        }
        let mut out = [f64::NAN; N];
        for (slot, item) in out.iter_mut().zip(items) {
            *slot = item.unwrap_or(f64::NAN);
        }
        Ok(out)
    }
}

/// Adapter for variable-length `Vec<f64>` fields.
pub mod vec {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let items: Vec<Option<f64>> = values
            .iter()
            .map(|v| if v.is_nan() { None } else { Some(*v) })
            .collect();
        items.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let items = Vec::<Option<f64>>::deserialize(deserializer)?;
        Ok(items.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize)]
    struct Sample {
        #[serde(with = "super::scalar")]
        value: f64,
        #[serde(with = "super::array")]
        values: [f64; 3],
        #[serde(with = "super::vec", default)]
        extra: Vec<f64>,
    }

    #[test]
    fn nan_round_trips_through_null() {
        let sample = Sample {
            value: f64::NAN,
            values: [1.0, f64::NAN, 3.0],
            extra: vec![f64::NAN, 0.5],
        };
        let json = serde_json::to_string(&sample).unwrap();
        assert_eq!(json, r#"{"value":null,"values":[1.0,null,3.0],"extra":[null,0.5]}"#);

        let back: Sample = serde_json::from_str(&json).unwrap();
        assert!(back.value.is_nan());
        assert_eq!(back.values[0], 1.0);
        assert!(back.values[1].is_nan());
        assert_eq!(back.values[2], 3.0);
        assert!(back.extra[0].is_nan());
        assert_eq!(back.extra[1], 0.5);
    }

    #[test]
    fn finite_values_are_plain_numbers() {
        let json = r#"{"value":2.5,"values":[0.0,0.0,0.0]}"#;
        let sample: Sample = serde_json::from_str(json).unwrap();
        assert_eq!(sample.value, 2.5);
    }

    #[test]
    fn wrong_array_length_is_rejected() {
        let json = r#"{"value":1.0,"values":[1.0,2.0]}"#;
        assert!(serde_json::from_str::<Sample>(json).is_err());
    }
}
