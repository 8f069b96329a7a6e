use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Placeholder returned when a reference id cannot be resolved to a name.
pub const UNKNOWN_NAME: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    pub id: i64,
    #[serde(rename = "english_name")]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: i64,
    pub country_id: i64,
    #[serde(rename = "long_name")]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grade {
    pub id: i64,
    pub country_id: i64,
    #[serde(rename = "long_name")]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    pub id: i64,
    #[serde(rename = "english_name")]
    pub name: String,
}

/// One (country, grade, subject) triple for which topics are generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Combination {
    pub country_id: i64,
    pub grade_id: i64,
    pub subject_id: i64,
}

/// A single generated topic, one row of the topic checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicRecord {
    pub country_id: i64,
    pub grade_id: i64,
    pub subject_id: i64,
    pub topic: String,
}

impl TopicRecord {
    pub fn new(combination: Combination, topic: impl Into<String>) -> Self {
        Self {
            country_id: combination.country_id,
            grade_id: combination.grade_id,
            subject_id: combination.subject_id,
            topic: topic.into(),
        }
    }

    pub fn combination(&self) -> Combination {
        Combination {
            country_id: self.country_id,
            grade_id: self.grade_id,
            subject_id: self.subject_id,
        }
    }
}

/// A suggested first message, the terminal artifact of the pipeline.
///
/// `uuid` is assigned once at creation and is the idempotency key of the
/// relational store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedMessage {
    pub uuid: Uuid,
    pub created_on: DateTime<Utc>,
    pub message: String,
    pub language_id: i64,
    pub country_id: i64,
    pub grade_id: i64,
    pub subject_id: i64,
}

impl SuggestedMessage {
    pub fn new(message: impl Into<String>, language_id: i64, combination: Combination) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            created_on: Utc::now(),
            message: message.into(),
            language_id,
            country_id: combination.country_id,
            grade_id: combination.grade_id,
            subject_id: combination.subject_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_record_round_trips_its_combination() {
        let combo = Combination {
            country_id: 1,
            grade_id: 5,
            subject_id: 10,
        };
        let record = TopicRecord::new(combo, "Photosynthesis");
        assert_eq!(record.combination(), combo);
        assert_eq!(record.topic, "Photosynthesis");
    }

    #[test]
    fn suggested_messages_get_distinct_uuids() {
        let combo = Combination {
            country_id: 1,
            grade_id: 5,
            subject_id: 10,
        };
        let a = SuggestedMessage::new("🌱 how do plants eat", 3, combo);
        let b = SuggestedMessage::new("🌱 how do plants eat", 3, combo);
        assert_ne!(a.uuid, b.uuid);
        assert_eq!(a.language_id, 3);
        assert_eq!(a.subject_id, 10);
    }

    #[test]
    fn entities_use_warehouse_column_names() {
        let country = Country {
            id: 1,
            name: "Germany".into(),
        };
        let json = serde_json::to_value(&country).unwrap();
        assert_eq!(json["english_name"], "Germany");

        let grade = Grade {
            id: 5,
            country_id: 1,
            name: "Klasse 5".into(),
        };
        let json = serde_json::to_value(&grade).unwrap();
        assert_eq!(json["long_name"], "Klasse 5");
    }
}
