//! The peer-to-peer class-export payload.
//!
//! An instance exports a whole class (metadata, subjects, students,
//! grades) as one JSON document; transport and discovery are external.
//! All ids in the payload are the *sender's* local ids and must be
//! remapped by the importer.

use crate::FieldMap;
use serde::{Deserialize, Serialize};

/// Class metadata, also the natural key used for collision detection:
/// (name, level, option, section, year).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassInfo {
    /// Class name.
    pub name: String,
    /// Level (e.g. "3").
    pub level: String,
    /// Option/track.
    pub option: String,
    /// Section.
    pub section: String,
    /// Academic year name.
    pub year: String,
}

/// A subject in the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadSubject {
    /// Sender-local id, referenced by grades.
    pub id: i64,
    /// Subject name (natural key, with `code`).
    pub name: String,
    /// Subject code (natural key, with `name`).
    pub code: String,
    /// Remaining mutable fields.
    #[serde(flatten)]
    pub fields: FieldMap,
}

/// A student in the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadStudent {
    /// Sender-local id, referenced by grades.
    pub id: i64,
    /// First name (natural key, with last and post names).
    pub first_name: String,
    /// Last name.
    pub last_name: String,
    /// Post name.
    pub post_name: String,
    /// Remaining mutable fields.
    #[serde(flatten)]
    pub fields: FieldMap,
}

/// A grade in the payload, keyed by (student, subject, period).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadGrade {
    /// Sender-local student id.
    pub student_id: i64,
    /// Sender-local subject id.
    pub subject_id: i64,
    /// Grading period (e.g. "P1").
    pub period: String,
    /// The grade value.
    pub value: f64,
}

/// A whole exported class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassPayload {
    /// Class metadata / natural key.
    pub class: ClassInfo,
    /// Subjects taught in the class.
    pub subjects: Vec<PayloadSubject>,
    /// Students enrolled.
    pub students: Vec<PayloadStudent>,
    /// Grades, referencing subjects and students by sender-local id.
    pub grades: Vec<PayloadGrade>,
}
