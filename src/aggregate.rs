use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use tracing::info;

use crate::config::{TestType, TestTypeDefinition};
use crate::error::StatusError;
use crate::report::ParseResult;

/// Weighted score per test type, in the order the test types were aggregated.
///
/// A payload built with [`AggregatedPayload::for_definitions`] only accepts the
/// configured test types. Payloads read back from history accept any key.
#[derive(Debug, Clone, Default)]
pub struct AggregatedPayload {
    entries: Vec<(TestType, Decimal)>,
    configured: Option<Vec<TestType>>,
}

impl AggregatedPayload {
    /// Unchecked payload, for records loaded from storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty payload restricted to the test types in `definitions`.
    pub fn for_definitions(definitions: &[TestTypeDefinition]) -> Self {
        Self {
            entries: Vec::with_capacity(definitions.len()),
            configured: Some(definitions.iter().map(|d| d.test_type.clone()).collect()),
        }
    }

    /// Set the score for `test_type`, keeping its first position if already present.
    pub fn insert(&mut self, test_type: TestType, score: Decimal) -> Result<(), StatusError> {
        if let Some(configured) = &self.configured {
            if !configured.contains(&test_type) {
                return Err(StatusError::Config(format!(
                    "test type '{}' is not configured",
                    test_type
                )));
            }
        }
        self.upsert(test_type, score);
        Ok(())
    }

    fn upsert(&mut self, test_type: TestType, score: Decimal) {
        match self.entries.iter_mut().find(|(t, _)| *t == test_type) {
            Some(entry) => entry.1 = score,
            None => self.entries.push((test_type, score)),
        }
    }

    pub fn get(&self, test_type: &TestType) -> Option<Decimal> {
        self.entries
            .iter()
            .find(|(t, _)| t == test_type)
            .map(|(_, score)| *score)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TestType, Decimal)> {
        self.entries.iter().map(|(t, score)| (t, *score))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// Equality is over the scores only.
impl PartialEq for AggregatedPayload {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl FromIterator<(TestType, Decimal)> for AggregatedPayload {
    fn from_iter<I: IntoIterator<Item = (TestType, Decimal)>>(iter: I) -> Self {
        let mut payload = AggregatedPayload::new();
        for (test_type, score) in iter {
            payload.upsert(test_type, score);
        }
        payload
    }
}

impl Serialize for AggregatedPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (test_type, score) in &self.entries {
            map.serialize_entry(test_type, score)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for AggregatedPayload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PayloadVisitor;

        impl<'de> Visitor<'de> for PayloadVisitor {
            type Value = AggregatedPayload;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of test type to score")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut payload = AggregatedPayload::new();
                while let Some((test_type, score)) = access.next_entry::<TestType, Decimal>()? {
                    payload.upsert(test_type, score);
                }
                Ok(payload)
            }
        }

        deserializer.deserialize_map(PayloadVisitor)
    }
}

/// Convert a parsed score to a decimal through its shortest textual form,
/// so `0.875` becomes exactly `0.875` rather than its binary expansion.
pub fn score_to_decimal(score: f64) -> Decimal {
    Decimal::from_str(&score.to_string())
        .ok()
        .or_else(|| Decimal::from_f64(score))
        .unwrap_or(Decimal::ZERO)
}

/// Record `score * multiplier` for the definition's test type.
pub fn aggregate(
    result: &ParseResult,
    definition: &TestTypeDefinition,
    payload: &mut AggregatedPayload,
) -> Result<(), StatusError> {
    let weighted = (score_to_decimal(result.score()) * definition.multiplier).normalize();
    info!(
        "Aggregated {}: {} x {} = {}",
        definition.test_type,
        result.score(),
        definition.multiplier,
        weighted
    );
    payload.insert(definition.test_type.clone(), weighted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TestCategory, TestTypeDefinition};
    use crate::report::DynamicCounts;
    use std::path::PathBuf;

    fn definition(name: &str, multiplier: i64) -> TestTypeDefinition {
        TestTypeDefinition {
            test_type: TestType::new(name),
            category: TestCategory::Static,
            input_file: PathBuf::from("unused"),
            pattern: TestTypeDefinition::compile_pattern(name, "(.*)").unwrap(),
            message: "msg".to_string(),
            multiplier: Decimal::from(multiplier),
            is_percent: false,
        }
    }

    #[test]
    fn test_static_score_weighted_exactly() {
        let pylint = definition("pylint", 10);
        let mut payload = AggregatedPayload::for_definitions(std::slice::from_ref(&pylint));
        let result = ParseResult::Static {
            score: 8.5,
            matched: true,
        };
        aggregate(&result, &pylint, &mut payload).unwrap();
        assert_eq!(
            payload.get(&TestType::new("pylint")),
            Some(Decimal::from(85))
        );
    }

    #[test]
    fn test_dynamic_fraction_has_no_float_drift() {
        let pytest = definition("pytest", 100);
        let mut payload = AggregatedPayload::for_definitions(std::slice::from_ref(&pytest));
        let result = ParseResult::Dynamic {
            score: 0.875,
            passed: false,
            counts: DynamicCounts {
                errors: 0,
                failures: 1,
                skips: 0,
                tests: 8,
            },
        };
        aggregate(&result, &pytest, &mut payload).unwrap();
        assert_eq!(payload.get(&TestType::new("pytest")).unwrap().to_string(), "87.5");
    }

    #[test]
    fn test_insert_keeps_first_position() {
        let mut payload = AggregatedPayload::new();
        payload.insert(TestType::new("pytest"), Decimal::from(100)).unwrap();
        payload.insert(TestType::new("pylint"), Decimal::from(90)).unwrap();
        payload.insert(TestType::new("pytest"), Decimal::from(50)).unwrap();

        let order: Vec<_> = payload.iter().map(|(t, _)| t.as_str().to_string()).collect();
        assert_eq!(order, vec!["pytest", "pylint"]);
        assert_eq!(payload.get(&TestType::new("pytest")), Some(Decimal::from(50)));
        assert_eq!(payload.len(), 2);
    }

    #[test]
    fn test_serializes_as_ordered_map() {
        let payload: AggregatedPayload = vec![
            (TestType::new("pytest"), Decimal::from(100)),
            (TestType::new("coverage"), Decimal::new(925, 1)),
        ]
        .into_iter()
        .collect();

        let json = serde_json::to_string(&payload).unwrap();
        assert_eq!(json, r#"{"pytest":"100","coverage":"92.5"}"#);

        let back: AggregatedPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn test_unconfigured_test_type_is_rejected() {
        let definitions = vec![definition("pytest", 100), definition("pylint", 10)];
        let mut payload = AggregatedPayload::for_definitions(&definitions);

        let err = payload
            .insert(TestType::new("not_configured"), Decimal::ONE)
            .unwrap_err();
        assert!(matches!(err, StatusError::Config(_)));
        assert!(payload.is_empty());

        let result = ParseResult::Static {
            score: 50.0,
            matched: true,
        };
        let err = aggregate(&result, &definition("radon_cc", 1), &mut payload).unwrap_err();
        assert!(matches!(err, StatusError::Config(_)));

        payload.insert(TestType::new("pylint"), Decimal::from(90)).unwrap();
        assert_eq!(payload.len(), 1);
    }
}
