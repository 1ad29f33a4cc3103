//! Peer class import: merging or overwriting an exported class.
//!
//! A colleague's instance exports a whole class as one payload; ids in it
//! are the sender's local ids and mean nothing here. The importer matches
//! rows by natural keys, translates sender ids as it goes, and writes
//! through the change tracker so the imported data pushes on the next
//! cycle.

use cahier_protocol::{ClassInfo, ClassPayload};
use cahier_store::{Fields, Row, Store, StoreResult, StoreTxn, Table};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// What to do when the payload's class already exists locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStrategy {
    /// Match rows by natural key; update matches, insert the rest.
    Merge,
    /// Delete the existing class and everything under it, then import
    /// fresh.
    Overwrite,
}

/// Inserted/updated/skipped counts for one entity kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportCounts {
    /// Rows newly inserted.
    pub inserted: u64,
    /// Existing rows whose fields changed.
    pub updated: u64,
    /// Rows left untouched (identical match) or dropped (unresolvable).
    pub skipped: u64,
}

/// Per-kind outcome of one import.
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    /// True when no local class matched the payload's natural key and the
    /// class row itself was created.
    pub class_created: bool,
    /// Subject counts.
    pub subjects: ImportCounts,
    /// Student counts.
    pub students: ImportCounts,
    /// Grade counts.
    pub grades: ImportCounts,
}

/// Imports peer class payloads into the local store.
///
/// Matching is a best-effort heuristic, not identity resolution: the
/// first row matching the natural key wins, so payload rows sharing a
/// key fold into the same local row.
pub struct ClassImporter {
    store: Arc<Store>,
}

impl ClassImporter {
    /// Creates an importer over a store.
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Looks up the local class colliding with the payload's natural key,
    /// if any. A `None` means [`import`](Self::import) needs no strategy
    /// choice from the user.
    pub fn find_collision(&self, class: &ClassInfo) -> Option<i64> {
        let year_id = self
            .store
            .rows(Table::AcademicYear)
            .into_iter()
            .find(|r| r.field_str("name") == Some(class.year.as_str()))?
            .local_id;
        self.store
            .rows(Table::Class)
            .into_iter()
            .find(|r| class_matches(r, class, year_id))
            .map(|r| r.local_id)
    }

    /// Imports one payload under the given strategy.
    ///
    /// Runs as a single transaction: a failure anywhere leaves the store
    /// exactly as it was. The strategy only matters when the payload's
    /// class already exists locally.
    pub fn import(
        &self,
        payload: &ClassPayload,
        strategy: ImportStrategy,
    ) -> StoreResult<ImportReport> {
        let report = self.store.transaction(|txn| {
            let year_id = ensure_year(txn, &payload.class.year)?;
            let existing = txn
                .rows(Table::Class)
                .into_iter()
                .find(|r| class_matches(r, &payload.class, year_id))
                .map(|r| r.local_id);

            let mut report = ImportReport::default();
            let class_id = match (existing, strategy) {
                (Some(class_id), ImportStrategy::Merge) => class_id,
                (Some(class_id), ImportStrategy::Overwrite) => {
                    delete_class_tree(txn, class_id)?;
                    report.class_created = true;
                    insert_class(txn, &payload.class, year_id)?
                }
                (None, _) => {
                    report.class_created = true;
                    insert_class(txn, &payload.class, year_id)?
                }
            };

            let subject_map = import_subjects(txn, payload, class_id, &mut report)?;
            let student_map = import_students(txn, payload, class_id, &mut report)?;
            import_grades(txn, payload, &subject_map, &student_map, &mut report)?;
            Ok(report)
        })?;

        info!(
            class = %payload.class.name,
            strategy = ?strategy,
            subjects_inserted = report.subjects.inserted,
            students_inserted = report.students.inserted,
            grades_skipped = report.grades.skipped,
            "class import complete"
        );
        Ok(report)
    }
}

fn class_matches(row: &Row, class: &ClassInfo, year_id: i64) -> bool {
    row.field_i64("academic_year_id") == Some(year_id)
        && row.field_str("name") == Some(class.name.as_str())
        && row.field_str("level") == Some(class.level.as_str())
        && row.field_str("option") == Some(class.option.as_str())
        && row.field_str("section") == Some(class.section.as_str())
}

fn ensure_year(txn: &mut StoreTxn, name: &str) -> StoreResult<i64> {
    if let Some(row) = txn
        .rows(Table::AcademicYear)
        .into_iter()
        .find(|r| r.field_str("name") == Some(name))
    {
        return Ok(row.local_id);
    }
    txn.insert(Table::AcademicYear, as_fields(json!({ "name": name })))
}

fn insert_class(txn: &mut StoreTxn, class: &ClassInfo, year_id: i64) -> StoreResult<i64> {
    txn.insert(
        Table::Class,
        as_fields(json!({
            "name": class.name,
            "level": class.level,
            "option": class.option,
            "section": class.section,
            "academic_year_id": year_id,
        })),
    )
}

/// Deletes a class and everything referencing it, children first, through
/// the tracked delete path (tombstones for rows the remote knows).
fn delete_class_tree(txn: &mut StoreTxn, class_id: i64) -> StoreResult<()> {
    let student_ids: Vec<i64> = txn
        .rows(Table::Student)
        .into_iter()
        .filter(|r| r.field_i64("class_id") == Some(class_id))
        .map(|r| r.local_id)
        .collect();
    let subject_ids: Vec<i64> = txn
        .rows(Table::Subject)
        .into_iter()
        .filter(|r| r.field_i64("class_id") == Some(class_id))
        .map(|r| r.local_id)
        .collect();

    for table in [Table::Grade, Table::Note] {
        let ids: Vec<i64> = txn
            .rows(table)
            .into_iter()
            .filter(|r| {
                r.field_i64("student_id")
                    .is_some_and(|id| student_ids.contains(&id))
            })
            .map(|r| r.local_id)
            .collect();
        for id in ids {
            txn.delete(table, id)?;
        }
    }
    for id in student_ids {
        txn.delete(Table::Student, id)?;
    }
    for id in subject_ids {
        txn.delete(Table::Subject, id)?;
    }
    txn.delete(Table::Class, class_id)
}

fn import_subjects(
    txn: &mut StoreTxn,
    payload: &ClassPayload,
    class_id: i64,
    report: &mut ImportReport,
) -> StoreResult<HashMap<i64, i64>> {
    let existing = txn
        .rows(Table::Subject)
        .into_iter()
        .filter(|r| r.field_i64("class_id") == Some(class_id))
        .collect::<Vec<_>>();

    let mut map = HashMap::new();
    for subject in &payload.subjects {
        let matched = existing.iter().find(|r| {
            r.field_str("name") == Some(subject.name.as_str())
                && r.field_str("code") == Some(subject.code.as_str())
        });
        let local_id = match matched {
            Some(row) => {
                upsert_fields(txn, Table::Subject, row, &subject.fields, &mut report.subjects)?;
                row.local_id
            }
            None => {
                let mut fields = as_fields(json!({
                    "name": subject.name,
                    "code": subject.code,
                    "class_id": class_id,
                }));
                fields.extend(subject.fields.clone());
                report.subjects.inserted += 1;
                txn.insert(Table::Subject, fields)?
            }
        };
        map.insert(subject.id, local_id);
    }
    Ok(map)
}

fn import_students(
    txn: &mut StoreTxn,
    payload: &ClassPayload,
    class_id: i64,
    report: &mut ImportReport,
) -> StoreResult<HashMap<i64, i64>> {
    let existing = txn
        .rows(Table::Student)
        .into_iter()
        .filter(|r| r.field_i64("class_id") == Some(class_id))
        .collect::<Vec<_>>();

    let mut map = HashMap::new();
    for student in &payload.students {
        let matched = existing.iter().find(|r| {
            r.field_str("first_name") == Some(student.first_name.as_str())
                && r.field_str("last_name") == Some(student.last_name.as_str())
                && r.field_str("post_name") == Some(student.post_name.as_str())
        });
        let local_id = match matched {
            Some(row) => {
                upsert_fields(txn, Table::Student, row, &student.fields, &mut report.students)?;
                row.local_id
            }
            None => {
                let mut fields = as_fields(json!({
                    "first_name": student.first_name,
                    "last_name": student.last_name,
                    "post_name": student.post_name,
                    "class_id": class_id,
                }));
                fields.extend(student.fields.clone());
                report.students.inserted += 1;
                txn.insert(Table::Student, fields)?
            }
        };
        map.insert(student.id, local_id);
    }
    Ok(map)
}

fn import_grades(
    txn: &mut StoreTxn,
    payload: &ClassPayload,
    subject_map: &HashMap<i64, i64>,
    student_map: &HashMap<i64, i64>,
    report: &mut ImportReport,
) -> StoreResult<()> {
    for grade in &payload.grades {
        // A grade referencing a student or subject the payload never
        // declared cannot be translated; skip it, keep the rest.
        let (Some(&student_id), Some(&subject_id)) = (
            student_map.get(&grade.student_id),
            subject_map.get(&grade.subject_id),
        ) else {
            warn!(
                student = grade.student_id,
                subject = grade.subject_id,
                period = %grade.period,
                "grade references ids missing from the payload, skipping"
            );
            report.grades.skipped += 1;
            continue;
        };

        let existing = txn.rows(Table::Grade).into_iter().find(|r| {
            r.field_i64("student_id") == Some(student_id)
                && r.field_i64("subject_id") == Some(subject_id)
                && r.field_str("period") == Some(grade.period.as_str())
        });
        match existing {
            Some(row) if row.fields.get("value") == Some(&json!(grade.value)) => {
                report.grades.skipped += 1;
            }
            Some(row) => {
                txn.set_field(Table::Grade, row.local_id, "value", json!(grade.value))?;
                report.grades.updated += 1;
            }
            None => {
                txn.insert(
                    Table::Grade,
                    as_fields(json!({
                        "student_id": student_id,
                        "subject_id": subject_id,
                        "period": grade.period,
                        "value": grade.value,
                    })),
                )?;
                report.grades.inserted += 1;
            }
        }
    }
    Ok(())
}

/// Overlays payload fields onto a matched row. Identical rows are left
/// alone so a re-import does not re-dirty them.
fn upsert_fields(
    txn: &mut StoreTxn,
    table: Table,
    row: &Row,
    incoming: &Fields,
    counts: &mut ImportCounts,
) -> StoreResult<()> {
    let mut merged = row.fields.clone();
    for (key, value) in incoming {
        merged.insert(key.clone(), value.clone());
    }
    if merged == row.fields {
        counts.skipped += 1;
    } else {
        txn.update(table, row.local_id, merged)?;
        counts.updated += 1;
    }
    Ok(())
}

fn as_fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        _ => Fields::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cahier_protocol::{PayloadGrade, PayloadStudent, PayloadSubject};

    fn payload() -> ClassPayload {
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
                fields: as_fields(json!({ "maxima": 50 })),
            }],
            students: vec![PayloadStudent {
                id: 7,
                first_name: "Amani".into(),
                last_name: "Kalume".into(),
                post_name: "Trésor".into(),
                fields: as_fields(json!({ "birthplace": "Goma" })),
            }],
            grades: vec![PayloadGrade {
                student_id: 7,
                subject_id: 1,
                period: "P1".into(),
                value: 42.0,
            }],
        }
    }

    #[test]
    fn fresh_import_creates_the_whole_tree_dirty() {
        let store = Arc::new(Store::new());
        let importer = ClassImporter::new(Arc::clone(&store));
        assert!(importer.find_collision(&payload().class).is_none());

        let report = importer.import(&payload(), ImportStrategy::Merge).unwrap();
        assert!(report.class_created);
        assert_eq!(report.subjects.inserted, 1);
        assert_eq!(report.students.inserted, 1);
        assert_eq!(report.grades.inserted, 1);

        // Everything imported is pending local data.
        for table in [Table::Class, Table::Subject, Table::Student, Table::Grade] {
            assert_eq!(store.dirty_rows(table).len(), 1, "{table}");
        }

        // The grade references translated local ids.
        let student = &store.rows(Table::Student)[0];
        let grade = &store.rows(Table::Grade)[0];
        assert_eq!(grade.field_i64("student_id"), Some(student.local_id));
    }

    #[test]
    fn reimport_under_merge_is_a_noop() {
        let store = Arc::new(Store::new());
        let importer = ClassImporter::new(Arc::clone(&store));
        importer.import(&payload(), ImportStrategy::Merge).unwrap();

        let report = importer.import(&payload(), ImportStrategy::Merge).unwrap();
        assert!(!report.class_created);
        assert_eq!(report.subjects.skipped, 1);
        assert_eq!(report.students.skipped, 1);
        assert_eq!(report.grades.skipped, 1);
        assert_eq!(store.row_count(Table::Student), 1);
    }

    #[test]
    fn merge_keeps_local_ids_and_adds_the_new() {
        let store = Arc::new(Store::new());
        let importer = ClassImporter::new(Arc::clone(&store));
        importer.import(&payload(), ImportStrategy::Merge).unwrap();
        let existing_id = store.rows(Table::Student)[0].local_id;

        let mut incoming = payload();
        // Same student with an updated field, plus a new one.
        incoming.students[0].fields = as_fields(json!({ "birthplace": "Bukavu" }));
        incoming.students.push(PayloadStudent {
            id: 8,
            first_name: "Neema".into(),
            last_name: "Safi".into(),
            post_name: "Grâce".into(),
            fields: Fields::new(),
        });

        let report = importer.import(&incoming, ImportStrategy::Merge).unwrap();
        assert_eq!(report.students.updated, 1);
        assert_eq!(report.students.inserted, 1);
        assert_eq!(store.row_count(Table::Student), 2);

        let kept = store.get(Table::Student, existing_id).unwrap();
        assert_eq!(kept.field_str("birthplace"), Some("Bukavu"));
    }

    #[test]
    fn overwrite_replaces_the_tree_with_fresh_rows() {
        let store = Arc::new(Store::new());
        let importer = ClassImporter::new(Arc::clone(&store));
        importer.import(&payload(), ImportStrategy::Merge).unwrap();
        let old_id = store.rows(Table::Student)[0].local_id;

        let mut incoming = payload();
        incoming.students[0].first_name = "Josué".into();
        let report = importer
            .import(&incoming, ImportStrategy::Overwrite)
            .unwrap();
        assert!(report.class_created);

        let students = store.rows(Table::Student);
        assert_eq!(students.len(), 1);
        assert_ne!(students[0].local_id, old_id);
        assert_eq!(students[0].field_str("first_name"), Some("Josué"));
        // Never-pushed rows vanish without tombstones.
        assert!(store.tombstones().is_empty());
    }

    #[test]
    fn unresolvable_grade_is_skipped_not_fatal() {
        let store = Arc::new(Store::new());
        let importer = ClassImporter::new(Arc::clone(&store));

        let mut incoming = payload();
        incoming.grades.push(PayloadGrade {
            student_id: 99,
            subject_id: 1,
            period: "P2".into(),
            value: 30.0,
        });

        let report = importer.import(&incoming, ImportStrategy::Merge).unwrap();
        assert_eq!(report.grades.inserted, 1);
        assert_eq!(report.grades.skipped, 1);
        assert_eq!(store.row_count(Table::Grade), 1);
    }
}
