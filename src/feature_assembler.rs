//! Feature assembly for readmission model inference.
//!
//! Maps the step-gated wizard inputs onto the fixed feature layout the model
//! was trained with. The layout (a [`FeatureOrder`]) comes from the model
//! bundle; assembly never adds or removes positions, it only overwrites the
//! entries whose names the current step reveals.

use crate::error::InputError;
use crate::types::request::Step;
use anyhow::{bail, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Raw input field names accepted in `inputs`
pub mod fields {
    pub const AGE: &str = "age";
    pub const GENDER: &str = "gender";
    pub const ADMISSION_TYPE: &str = "admission_type";
    pub const TOTAL_DIAGNOSES: &str = "total_diagnoses";
    pub const NO_PREV_ADM: &str = "no_prev_adm";
    pub const LENGTH_OF_STAY: &str = "length_of_stay";
    pub const DAYS_SINCE_LAST_ADM: &str = "days_since_last_adm";
    pub const TOTAL_PROCEDURES: &str = "total_procedures";
    pub const TOTAL_LAB_TESTS: &str = "total_lab_tests";
    pub const UNIQUE_LAB_TESTS: &str = "unique_lab_tests";
    pub const DRG_MORTALITY: &str = "drg_mortality";
    pub const DRG_SEVERITY: &str = "drg_severity";
    pub const DISCHARGE_LOCATION: &str = "discharge_location";
    pub const INSURANCE: &str = "insurance";
}

/// Model feature names written by the assembler
pub mod features {
    pub const AGE_AT_ADMISSION: &str = "age_at_admission";
    pub const GENDER_M: &str = "gender_M";
    pub const TOTAL_DIAGNOSES: &str = "total_diagnoses";
    pub const CHRONICITY_INDEX: &str = "chronicity_index";
    pub const DAYS_SINCE_LAST_ADM: &str = "days_since_last_adm";
    pub const TOTAL_PROCEDURES: &str = "total_procedures";
    pub const TOTAL_LAB_TESTS: &str = "total_lab_tests";
    pub const UNIQUE_LAB_TESTS: &str = "unique_lab_tests";
    pub const DRG_MORTALITY: &str = "drg_mortality";
    pub const DRG_SEVERITY: &str = "drg_severity";
    pub const CRITICALITY_SCORE: &str = "criticality_score";

    // One-hot prefixes; the category value is appended after the underscore
    pub const ADMISSION_TYPE_PREFIX: &str = "admission_type";
    pub const DISCHARGE_LOCATION_PREFIX: &str = "discharge_location";
    pub const INSURANCE_PREFIX: &str = "insurance";
}

/// Reference layout of the readmission model.
///
/// Baseline categories (`admission_type_Elective`, `insurance_Government`,
/// `discharge_location_Disc-tran_Cancer`) were dropped at training time and
/// are intentionally absent.
pub const READMISSION_FEATURES: [&str; 21] = [
    "age_at_admission",
    "gender_M",
    "total_diagnoses",
    "chronicity_index",
    "days_since_last_adm",
    "total_procedures",
    "total_lab_tests",
    "unique_lab_tests",
    "drg_mortality",
    "drg_severity",
    "criticality_score",
    "admission_type_Emergency",
    "admission_type_Urgent",
    "discharge_location_Home",
    "discharge_location_Home Health Care",
    "discharge_location_Rehab",
    "discharge_location_Skilled Nursing Facility",
    "insurance_Medicaid",
    "insurance_Medicare",
    "insurance_Private",
    "insurance_Self pay",
];

/// Ordered feature names fixed by the trained model
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureOrder {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl FeatureOrder {
    /// Build an order from the bundle's feature list; names must be unique
    pub fn new(names: Vec<String>) -> Result<Self> {
        if names.is_empty() {
            bail!("feature order is empty");
        }

        let mut index = HashMap::with_capacity(names.len());
        for (position, name) in names.iter().enumerate() {
            if index.insert(name.clone(), position).is_some() {
                bail!("duplicate feature name `{}` in feature order", name);
            }
        }

        Ok(Self { names, index })
    }

    /// The reference readmission layout
    pub fn readmission() -> Self {
        let names: Vec<String> = READMISSION_FEATURES.iter().map(|s| s.to_string()).collect();
        let index = names
            .iter()
            .enumerate()
            .map(|(position, name)| (name.clone(), position))
            .collect();
        Self { names, index }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }
}

/// Zero-initialized values over a closed [`FeatureOrder`] key space.
///
/// Assignments to names outside the order are no-ops. The positional row
/// always has exactly `order.len()` entries.
#[derive(Debug, Clone)]
pub struct FeatureVector<'a> {
    order: &'a FeatureOrder,
    values: Vec<f64>,
}

impl<'a> FeatureVector<'a> {
    pub fn new(order: &'a FeatureOrder) -> Self {
        Self {
            order,
            values: vec![0.0; order.len()],
        }
    }

    /// Overwrite `name` if it is part of the order; returns whether it was
    pub fn set(&mut self, name: &str, value: f64) -> bool {
        match self.order.position(name) {
            Some(position) => {
                self.values[position] = value;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.order.position(name).map(|position| self.values[position])
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn into_row(self) -> Vec<f64> {
        self.values
    }

    /// Name of the first infinite or NaN entry, if any
    pub fn first_non_finite(&self) -> Option<&str> {
        self.order
            .names()
            .iter()
            .zip(&self.values)
            .find(|(_, v)| !v.is_finite())
            .map(|(name, _)| name.as_str())
    }

    /// Non-zero entries, for diagnostics
    pub fn non_zero(&self) -> Vec<(&str, f64)> {
        self.order
            .names()
            .iter()
            .zip(&self.values)
            .filter(|(_, &v)| v != 0.0)
            .map(|(name, &v)| (name.as_str(), v))
            .collect()
    }
}

/// Builds model rows from step-gated wizard inputs
#[derive(Debug, Clone)]
pub struct FeatureAssembler {
    order: Arc<FeatureOrder>,
}

impl FeatureAssembler {
    pub fn new(order: Arc<FeatureOrder>) -> Self {
        Self { order }
    }

    pub fn order(&self) -> &FeatureOrder {
        &self.order
    }

    /// Number of positions in every assembled row
    pub fn feature_count(&self) -> usize {
        self.order.len()
    }

    /// Assemble the feature vector for `step`.
    ///
    /// Each step adds its fields on top of all lower steps. Missing numeric
    /// inputs count as 0; non-numeric ones are rejected.
    pub fn assemble(
        &self,
        step: Step,
        inputs: &Map<String, Value>,
    ) -> Result<FeatureVector<'_>, InputError> {
        let raw = RawInputs(inputs);
        let mut vector = FeatureVector::new(&self.order);

        vector.set(features::AGE_AT_ADMISSION, raw.number(fields::AGE)?);
        let is_male = raw.text(fields::GENDER) == Some("M");
        vector.set(features::GENDER_M, if is_male { 1.0 } else { 0.0 });

        if step.includes(2) {
            self.set_one_hot(
                &mut vector,
                features::ADMISSION_TYPE_PREFIX,
                &raw.category(fields::ADMISSION_TYPE),
            );
            vector.set(
                features::TOTAL_DIAGNOSES,
                raw.number(fields::TOTAL_DIAGNOSES)?,
            );
            let chronicity =
                raw.number(fields::NO_PREV_ADM)? * raw.number(fields::LENGTH_OF_STAY)?;
            vector.set(features::CHRONICITY_INDEX, chronicity);
            vector.set(
                features::DAYS_SINCE_LAST_ADM,
                raw.number(fields::DAYS_SINCE_LAST_ADM)?,
            );
        }

        if step.includes(3) {
            vector.set(
                features::TOTAL_PROCEDURES,
                raw.number(fields::TOTAL_PROCEDURES)?,
            );
            vector.set(
                features::TOTAL_LAB_TESTS,
                raw.number(fields::TOTAL_LAB_TESTS)?,
            );
            vector.set(
                features::UNIQUE_LAB_TESTS,
                raw.number(fields::UNIQUE_LAB_TESTS)?,
            );
        }

        if step.includes(4) {
            // Product of the assigned values, independent of whether the
            // model layout carries the two DRG columns themselves
            let mortality = raw.number(fields::DRG_MORTALITY)?;
            let severity = raw.number(fields::DRG_SEVERITY)?;
            vector.set(features::DRG_MORTALITY, mortality);
            vector.set(features::DRG_SEVERITY, severity);
            vector.set(features::CRITICALITY_SCORE, mortality * severity);
        }

        if step.includes(5) {
            self.set_one_hot(
                &mut vector,
                features::DISCHARGE_LOCATION_PREFIX,
                &raw.category(fields::DISCHARGE_LOCATION),
            );
            self.set_one_hot(
                &mut vector,
                features::INSURANCE_PREFIX,
                &raw.category(fields::INSURANCE),
            );
        }

        if let Some(feature) = vector.first_non_finite() {
            return Err(InputError::NotFinite {
                feature: feature.to_string(),
            });
        }

        Ok(vector)
    }

    fn set_one_hot(&self, vector: &mut FeatureVector<'_>, prefix: &str, category: &str) {
        let name = one_hot_name(prefix, category);
        if !vector.set(&name, 1.0) {
            debug!(feature = %name, "Category not in feature order, ignored");
        }
    }
}

/// `{prefix}_{category}`
pub fn one_hot_name(prefix: &str, category: &str) -> String {
    format!("{}_{}", prefix, category)
}

/// Typed accessors over the untyped `inputs` map
struct RawInputs<'a>(&'a Map<String, Value>);

impl RawInputs<'_> {
    fn number(&self, field: &'static str) -> Result<f64, InputError> {
        match self.0.get(field) {
            None | Some(Value::Null) => Ok(0.0),
            Some(Value::Number(n)) => n.as_f64().ok_or_else(|| InputError::NotNumeric {
                field,
                found: n.to_string(),
            }),
            Some(other) => Err(InputError::NotNumeric {
                field,
                found: other.to_string(),
            }),
        }
    }

    fn text(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    /// Category suffix for one-hot names; empty when absent
    fn category(&self, field: &str) -> String {
        match self.0.get(field) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assembler() -> FeatureAssembler {
        FeatureAssembler::new(Arc::new(FeatureOrder::readmission()))
    }

    fn inputs(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn step(n: i64) -> Step {
        Step::try_from(n).unwrap()
    }

    fn full_inputs() -> Map<String, Value> {
        inputs(json!({
            "age": 65,
            "gender": "F",
            "admission_type": "Emergency",
            "total_diagnoses": 5,
            "no_prev_adm": 2,
            "length_of_stay": 7,
            "days_since_last_adm": 30,
            "total_procedures": 3,
            "total_lab_tests": 10,
            "unique_lab_tests": 5,
            "drg_mortality": 0.1,
            "drg_severity": 0.5,
            "discharge_location": "Home",
            "insurance": "Private"
        }))
    }

    #[test]
    fn test_feature_order_rejects_duplicates() {
        let names = vec!["a".to_string(), "b".to_string(), "a".to_string()];
        assert!(FeatureOrder::new(names).is_err());
        assert!(FeatureOrder::new(Vec::new()).is_err());
    }

    #[test]
    fn test_reference_layout_is_valid() {
        let names = READMISSION_FEATURES.iter().map(|s| s.to_string()).collect();
        let order = FeatureOrder::new(names).unwrap();

        assert_eq!(order, FeatureOrder::readmission());
        assert_eq!(order.len(), 21);
        assert_eq!(order.position("age_at_admission"), Some(0));
    }

    #[test]
    fn test_feature_vector_ignores_unknown_names() {
        let order = FeatureOrder::readmission();
        let mut vector = FeatureVector::new(&order);

        assert!(vector.set("gender_M", 1.0));
        assert!(!vector.set("admission_type_Elective", 1.0));
        assert_eq!(vector.get("admission_type_Elective"), None);
        assert_eq!(vector.as_slice().len(), order.len());
        assert_eq!(vector.non_zero(), vec![("gender_M", 1.0)]);
    }

    #[test]
    fn test_step_one_fields() {
        let assembler = assembler();
        let raw = inputs(json!({ "age": 50, "gender": "M", "total_diagnoses": 9 }));

        let vector = assembler.assemble(step(1), &raw).unwrap();

        assert_eq!(vector.get("age_at_admission"), Some(50.0));
        assert_eq!(vector.get("gender_M"), Some(1.0));
        // Not revealed until step 2
        assert_eq!(vector.get("total_diagnoses"), Some(0.0));
        assert_eq!(vector.as_slice().len(), assembler.feature_count());
    }

    #[test]
    fn test_gender_only_m_sets_flag() {
        let assembler = assembler();
        for gender in [json!("F"), json!("O"), json!("m"), json!(1), Value::Null] {
            let raw = inputs(json!({ "age": 40, "gender": gender }));
            let vector = assembler.assemble(step(1), &raw).unwrap();
            assert_eq!(vector.get("gender_M"), Some(0.0));
        }
    }

    #[test]
    fn test_chronicity_index() {
        let assembler = assembler();
        let raw = inputs(json!({ "no_prev_adm": 2, "length_of_stay": 7 }));
        let vector = assembler.assemble(step(2), &raw).unwrap();
        assert_eq!(vector.get("chronicity_index"), Some(14.0));
    }

    #[test]
    fn test_criticality_score() {
        let assembler = assembler();
        let raw = inputs(json!({ "drg_mortality": 0.1, "drg_severity": 0.5 }));
        let vector = assembler.assemble(step(4), &raw).unwrap();

        let criticality = vector.get("criticality_score").unwrap();
        assert!((criticality - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_criticality_defaults_missing_to_zero() {
        let assembler = assembler();
        let raw = inputs(json!({ "drg_severity": 3 }));
        let vector = assembler.assemble(step(4), &raw).unwrap();

        assert_eq!(vector.get("drg_severity"), Some(3.0));
        assert_eq!(vector.get("criticality_score"), Some(0.0));
    }

    #[test]
    fn test_full_step_sets_every_field() {
        let assembler = assembler();
        let vector = assembler.assemble(step(5), &full_inputs()).unwrap();

        assert_eq!(vector.get("age_at_admission"), Some(65.0));
        assert_eq!(vector.get("gender_M"), Some(0.0));
        assert_eq!(vector.get("admission_type_Emergency"), Some(1.0));
        assert_eq!(vector.get("admission_type_Urgent"), Some(0.0));
        assert_eq!(vector.get("total_diagnoses"), Some(5.0));
        assert_eq!(vector.get("chronicity_index"), Some(14.0));
        assert_eq!(vector.get("days_since_last_adm"), Some(30.0));
        assert_eq!(vector.get("total_procedures"), Some(3.0));
        assert_eq!(vector.get("total_lab_tests"), Some(10.0));
        assert_eq!(vector.get("unique_lab_tests"), Some(5.0));
        assert_eq!(vector.get("drg_mortality"), Some(0.1));
        assert_eq!(vector.get("drg_severity"), Some(0.5));
        assert_eq!(vector.get("discharge_location_Home"), Some(1.0));
        assert_eq!(vector.get("insurance_Private"), Some(1.0));
        assert_eq!(vector.get("insurance_Medicare"), Some(0.0));
    }

    #[test]
    fn test_lower_step_ignores_later_fields() {
        let assembler = assembler();
        let vector = assembler.assemble(step(3), &full_inputs()).unwrap();

        assert_eq!(vector.get("total_lab_tests"), Some(10.0));
        assert_eq!(vector.get("drg_mortality"), Some(0.0));
        assert_eq!(vector.get("criticality_score"), Some(0.0));
        assert_eq!(vector.get("insurance_Private"), Some(0.0));
    }

    #[test]
    fn test_unknown_category_is_ignored() {
        let assembler = assembler();
        let unknown = inputs(json!({ "age": 70, "admission_type": "Newborn" }));
        let absent = inputs(json!({ "age": 70 }));

        let with_unknown = assembler.assemble(step(2), &unknown).unwrap();
        let without = assembler.assemble(step(2), &absent).unwrap();

        assert_eq!(with_unknown.into_row(), without.into_row());
    }

    #[test]
    fn test_missing_numeric_defaults_to_zero() {
        let assembler = assembler();
        let raw = inputs(json!({ "age": null }));
        let vector = assembler.assemble(step(5), &raw).unwrap();
        assert!(vector.as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_non_numeric_arithmetic_field_rejected() {
        let raw = inputs(json!({ "no_prev_adm": 2, "length_of_stay": "" }));
        let err = assembler().assemble(step(2), &raw).unwrap_err();

        assert_eq!(
            err,
            InputError::NotNumeric {
                field: "length_of_stay",
                found: "\"\"".to_string(),
            }
        );
    }

    #[test]
    fn test_numeric_string_rejected() {
        let raw = inputs(json!({ "age": "65" }));
        assert!(assembler().assemble(step(1), &raw).is_err());
    }

    #[test]
    fn test_overflowing_product_rejected() {
        let raw = inputs(json!({ "no_prev_adm": 1e200, "length_of_stay": 1e200 }));
        let err = assembler().assemble(step(2), &raw).unwrap_err();

        assert_eq!(
            err,
            InputError::NotFinite {
                feature: "chronicity_index".to_string(),
            }
        );
    }

    #[test]
    fn test_large_finite_values_accepted() {
        let assembler = assembler();
        let raw = inputs(json!({ "no_prev_adm": 1e100, "length_of_stay": 1e100 }));
        let vector = assembler.assemble(step(2), &raw).unwrap();
        assert_eq!(vector.first_non_finite(), None);
    }

    #[test]
    fn test_custom_order_controls_layout() {
        let order = FeatureOrder::new(vec![
            "insurance_Private".to_string(),
            "age_at_admission".to_string(),
        ])
        .unwrap();
        let assembler = FeatureAssembler::new(Arc::new(order));

        let row = assembler
            .assemble(step(5), &full_inputs())
            .unwrap()
            .into_row();
        assert_eq!(row, vec![1.0, 65.0]);
    }
}
