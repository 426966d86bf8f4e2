use chrono::{DateTime, Local, Utc};

use crate::models::IntakeRecord;
use crate::params::{ParamMap, ParamValue};
use crate::repos::{IntakeRepository, StoreError};

pub const DEFAULT_PATIENT_NAME: &str = "Jane Doe";
pub const DEFAULT_CHIEF_COMPLAINT: &str = "Not provided";
pub const DEFAULT_SYMPTOM_DETAIL: &str = "N/A";
const APPOINTMENT_TIME_FORMAT: &str = "%H:%M";

const PATIENT_NAME_KEYS: &[&str] = &["patient_name", "name"];
const CHIEF_COMPLAINT_KEYS: &[&str] = &["symptom", "chief_complaint"];
const PAIN_LOCATION_KEYS: &[&str] = &["pain_location", "location"];
const PAIN_TYPE_KEYS: &[&str] = &["pain_type", "type"];
const APPOINTMENT_TIME_KEYS: &[&str] = &["appointment_time"];
const MEDICAL_HISTORY_KEY: &str = "medical_history";

/// Intake fields derived from a finished conversation, ready to persist.
/// Persisting one always yields a record in the `Complete` state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIntake {
    pub patient_name: String,
    pub appointment_time: String,
    pub chief_complaint: String,
    pub symptoms: Vec<String>,
    pub medical_history: Vec<String>,
}

impl NewIntake {
    pub fn from_params(params: &ParamMap, finalized_at: DateTime<Local>) -> Self {
        let pain_location = first_text(params, PAIN_LOCATION_KEYS)
            .unwrap_or_else(|| DEFAULT_SYMPTOM_DETAIL.to_string());
        let pain_type = first_text(params, PAIN_TYPE_KEYS)
            .unwrap_or_else(|| DEFAULT_SYMPTOM_DETAIL.to_string());

        Self {
            patient_name: first_text(params, PATIENT_NAME_KEYS)
                .unwrap_or_else(|| DEFAULT_PATIENT_NAME.to_string()),
            appointment_time: first_text(params, APPOINTMENT_TIME_KEYS)
                .unwrap_or_else(|| finalized_at.format(APPOINTMENT_TIME_FORMAT).to_string()),
            chief_complaint: first_text(params, CHIEF_COMPLAINT_KEYS)
                .unwrap_or_else(|| DEFAULT_CHIEF_COMPLAINT.to_string()),
            symptoms: vec![
                format!("Pain Location: {pain_location}"),
                format!("Pain Type: {pain_type}"),
            ],
            medical_history: medical_history(params.get(MEDICAL_HISTORY_KEY)),
        }
    }
}

/// Derives the intake from the accumulated session parameters and writes it.
/// The session accumulator is left to the caller.
pub async fn finalize_intake(
    repository: &dyn IntakeRepository,
    params: &ParamMap,
) -> Result<IntakeRecord, StoreError> {
    let intake = NewIntake::from_params(params, Local::now());
    repository.insert_intake(&intake, Utc::now()).await
}

fn first_text(params: &ParamMap, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| params.get(*key))
        .find_map(ParamValue::scalar_text)
}

fn medical_history(value: Option<&ParamValue>) -> Vec<String> {
    match value {
        Some(ParamValue::List(items)) => items
            .iter()
            .filter_map(|item| match item {
                ParamValue::Text(text) => Some(text.clone()),
                other => other.scalar_text(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn finalized_at() -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2026, 5, 4, 9, 7, 0)
            .single()
            .expect("fixed local time should be unambiguous")
    }

    fn params(pairs: Vec<(&str, ParamValue)>) -> ParamMap {
        pairs
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect()
    }

    #[test]
    fn derives_fields_from_collected_parameters() {
        let intake = NewIntake::from_params(
            &params(vec![
                ("patient_name", ParamValue::from("Jane")),
                ("pain_location", ParamValue::from("knee")),
                ("pain_type", ParamValue::from("sharp")),
            ]),
            finalized_at(),
        );

        assert_eq!(intake.patient_name, "Jane");
        assert_eq!(
            intake.symptoms,
            vec!["Pain Location: knee".to_string(), "Pain Type: sharp".to_string()]
        );
        assert_eq!(intake.chief_complaint, DEFAULT_CHIEF_COMPLAINT);
        assert_eq!(intake.appointment_time, "09:07");
        assert!(intake.medical_history.is_empty());
    }

    #[test]
    fn empty_parameters_fall_back_to_defaults() {
        let intake = NewIntake::from_params(&ParamMap::new(), finalized_at());

        assert_eq!(intake.patient_name, DEFAULT_PATIENT_NAME);
        assert_eq!(intake.chief_complaint, DEFAULT_CHIEF_COMPLAINT);
        assert_eq!(
            intake.symptoms,
            vec!["Pain Location: N/A".to_string(), "Pain Type: N/A".to_string()]
        );
    }

    #[test]
    fn alias_keys_are_used_when_primary_keys_are_blank() {
        let intake = NewIntake::from_params(
            &params(vec![
                ("patient_name", ParamValue::from("  ")),
                ("name", ParamValue::from("John")),
                ("symptom", ParamValue::Null),
                ("chief_complaint", ParamValue::from("Headache")),
                ("location", ParamValue::from("temple")),
                ("type", ParamValue::from("throbbing")),
                ("appointment_time", ParamValue::from("14:30")),
            ]),
            finalized_at(),
        );

        assert_eq!(intake.patient_name, "John");
        assert_eq!(intake.chief_complaint, "Headache");
        assert_eq!(
            intake.symptoms,
            vec![
                "Pain Location: temple".to_string(),
                "Pain Type: throbbing".to_string()
            ]
        );
        assert_eq!(intake.appointment_time, "14:30");
    }

    #[test]
    fn collected_text_is_kept_as_sent() {
        let intake = NewIntake::from_params(
            &params(vec![
                ("patient_name", ParamValue::from(" Mary Ann ")),
                ("symptom", ParamValue::from("sore throat ")),
                ("pain_location", ParamValue::from(" neck")),
            ]),
            finalized_at(),
        );

        assert_eq!(intake.patient_name, " Mary Ann ");
        assert_eq!(intake.chief_complaint, "sore throat ");
        assert_eq!(intake.symptoms[0], "Pain Location:  neck");
    }

    #[test]
    fn medical_history_is_taken_only_from_lists() {
        let from_list = NewIntake::from_params(
            &params(vec![(
                "medical_history",
                ParamValue::List(vec![
                    ParamValue::from(" asthma "),
                    ParamValue::from(""),
                    ParamValue::Null,
                    ParamValue::Number(2019.0),
                    ParamValue::Bool(true),
                    ParamValue::from("diabetes"),
                ]),
            )]),
            finalized_at(),
        );
        assert_eq!(
            from_list.medical_history,
            vec![
                " asthma ".to_string(),
                String::new(),
                "2019".to_string(),
                "true".to_string(),
                "diabetes".to_string()
            ]
        );

        let from_text = NewIntake::from_params(
            &params(vec![("medical_history", ParamValue::from("asthma"))]),
            finalized_at(),
        );
        assert!(from_text.medical_history.is_empty());
    }
}
