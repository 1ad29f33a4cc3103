//! # Cahier Testkit
//!
//! Shared fixtures for integration tests: a seeded school dataset with
//! known server ids, and builders for peer class payloads.
//!
//! Everything here panics on setup failure; it runs in tests only.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use cahier_protocol::{ClassInfo, ClassPayload, PayloadGrade, PayloadStudent, PayloadSubject};
use cahier_store::{Fields, IncomingRow, Store, SyncSettings, Table};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

/// Converts a `json!` object literal into a field map.
///
/// Panics when given anything but an object.
pub fn fields(value: serde_json::Value) -> Fields {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// The three students every fixture class starts with, as
/// (first, last, post) names.
pub const STUDENTS: [(&str, &str, &str); 3] = [
    ("Amani", "Kalume", "Trésor"),
    ("Neema", "Safi", "Grâce"),
    ("Josué", "Ilunga", "Fariala"),
];

/// A linked store seeded with one synced academic year, class, subject,
/// three students and their first-period grades.
///
/// Every row is clean and carries a known server id, as if a first full
/// sync already ran; tests dirty rows from there.
pub struct SchoolFixture {
    /// The seeded store.
    pub store: Arc<Store>,
    /// Local id of the academic year (server id 1).
    pub year_id: i64,
    /// Local id of the class (server id 10).
    pub class_id: i64,
    /// Local id of the MATH subject (server id 20).
    pub subject_id: i64,
    /// Local ids of the students, in [`STUDENTS`] order
    /// (server ids 30, 31, 32).
    pub student_ids: Vec<i64>,
    /// Local ids of the P1 grades, in student order
    /// (server ids 40, 41, 42).
    pub grade_ids: Vec<i64>,
}

impl SchoolFixture {
    /// Builds the fixture.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let store = Arc::new(Store::new());
        store.set_settings(SyncSettings {
            tenant_id: Some("school-1".into()),
            bearer_token: Some("test-token".into()),
            last_sync_time: Some(Utc::now()),
        });

        let now = Utc::now();
        let apply = |txn: &mut cahier_store::StoreTxn,
                     table: Table,
                     server_id: i64,
                     f: serde_json::Value| {
            txn.apply_if_clean(
                table,
                IncomingRow {
                    server_id,
                    last_modified_at: now,
                    fields: fields(f),
                },
            )
            .map(|_| ())
        };

        store
            .transaction(|txn| {
                apply(txn, Table::AcademicYear, 1, json!({ "name": "2025-2026" }))?;
                apply(
                    txn,
                    Table::Class,
                    10,
                    json!({
                        "name": "3A", "level": "3", "option": "Scientifique",
                        "section": "A", "academic_year_id": 1,
                    }),
                )?;
                apply(
                    txn,
                    Table::Subject,
                    20,
                    json!({ "name": "Mathématiques", "code": "MATH", "class_id": 10, "maxima": 50 }),
                )?;
                for (i, (first, last, post)) in STUDENTS.iter().enumerate() {
                    apply(
                        txn,
                        Table::Student,
                        30 + i as i64,
                        json!({
                            "first_name": first, "last_name": last, "post_name": post,
                            "class_id": 10, "birthplace": "Goma",
                        }),
                    )?;
                }
                for i in 0..STUDENTS.len() as i64 {
                    apply(
                        txn,
                        Table::Grade,
                        40 + i,
                        json!({
                            "student_id": 30 + i, "subject_id": 20,
                            "period": "P1", "value": 25.0 + i as f64,
                        }),
                    )?;
                }
                Ok(())
            })
            .unwrap();

        let by_server = |table, server_id| {
            store
                .find_by_server_id(table, server_id)
                .unwrap_or_else(|| panic!("fixture row {table}/{server_id} missing"))
                .local_id
        };

        Self {
            year_id: by_server(Table::AcademicYear, 1),
            class_id: by_server(Table::Class, 10),
            subject_id: by_server(Table::Subject, 20),
            student_ids: (30..33).map(|s| by_server(Table::Student, s)).collect(),
            grade_ids: (40..43).map(|s| by_server(Table::Grade, s)).collect(),
            store,
        }
    }

    /// A peer payload for the same class: the first two fixture students
    /// plus one the fixture does not have, each with a P1 grade.
    pub fn overlapping_payload(&self) -> ClassPayload {
        let mut students: Vec<PayloadStudent> = STUDENTS[..2]
            .iter()
            .enumerate()
            .map(|(i, (first, last, post))| PayloadStudent {
                id: i as i64 + 1,
                first_name: (*first).into(),
                last_name: (*last).into(),
                post_name: (*post).into(),
                fields: fields(json!({ "birthplace": "Goma" })),
            })
            .collect();
        students.push(PayloadStudent {
            id: 3,
            first_name: "Divine".into(),
            last_name: "Mwamba".into(),
            post_name: "Esther".into(),
            fields: Fields::new(),
        });

        ClassPayload {
            class: ClassInfo {
                name: "3A".into(),
                level: "3".into(),
                option: "Scientifique".into(),
                section: "A".into(),
                year: "2025-2026".into(),
            },
            subjects: vec![PayloadSubject {
                id: 1,
                name: "Mathématiques".into(),
                code: "MATH".into(),
                fields: fields(json!({ "maxima": 50 })),
            }],
            students,
            grades: (1..=3)
                .map(|id| PayloadGrade {
                    student_id: id,
                    subject_id: 1,
                    period: "P1".into(),
                    value: 30.0 + id as f64,
                })
                .collect(),
        }
    }
}
