//! The fixed set of synchronized entity tables.

use std::fmt;

/// A synchronized entity table.
///
/// The table set is closed: every table the engine tracks, pushes and
/// pulls is listed here, together with its wire name, its position in the
/// pull apply order and its declared foreign keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Table {
    /// Subject domains (groupings of subjects).
    Domain,
    /// Academic years.
    AcademicYear,
    /// School classes.
    Class,
    /// Students, each belonging to a class.
    Student,
    /// Subjects taught in a class.
    Subject,
    /// Grades, one per (student, subject, period).
    Grade,
    /// Free-form notes attached to a student.
    Note,
}

impl Table {
    /// All tables in pull apply order: parents before children, so that
    /// foreign keys can be remapped as rows arrive.
    pub const APPLY_ORDER: [Table; 7] = [
        Table::Domain,
        Table::AcademicYear,
        Table::Class,
        Table::Student,
        Table::Subject,
        Table::Grade,
        Table::Note,
    ];

    /// The table name used on the wire and in the tombstone ledger.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Table::Domain => "domains",
            Table::AcademicYear => "academic_years",
            Table::Class => "classes",
            Table::Student => "students",
            Table::Subject => "subjects",
            Table::Grade => "grades",
            Table::Note => "notes",
        }
    }

    /// Resolves a wire name back to a table.
    pub fn from_wire(name: &str) -> Option<Table> {
        Table::APPLY_ORDER
            .iter()
            .copied()
            .find(|t| t.wire_name() == name)
    }

    /// Declared foreign keys: (field name, referenced table).
    ///
    /// A `null` or absent field is always accepted; a present integer must
    /// reference an existing parent row.
    pub fn foreign_keys(&self) -> &'static [(&'static str, Table)] {
        match self {
            Table::Domain | Table::AcademicYear => &[],
            Table::Class => &[
                ("academic_year_id", Table::AcademicYear),
                ("domain_id", Table::Domain),
            ],
            Table::Student => &[("class_id", Table::Class)],
            Table::Subject => &[("class_id", Table::Class), ("domain_id", Table::Domain)],
            Table::Grade => &[
                ("student_id", Table::Student),
                ("subject_id", Table::Subject),
            ],
            Table::Note => &[("student_id", Table::Student)],
        }
    }

    /// Fields used to build a human-readable label for a row.
    pub fn label_fields(&self) -> &'static [&'static str] {
        match self {
            Table::Domain | Table::AcademicYear => &["name"],
            Table::Class => &["name", "level", "section"],
            Table::Student => &["first_name", "last_name", "post_name"],
            Table::Subject => &["name", "code"],
            Table::Grade => &["period"],
            Table::Note => &["period"],
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_name_roundtrip() {
        for table in Table::APPLY_ORDER {
            assert_eq!(Table::from_wire(table.wire_name()), Some(table));
        }
        assert_eq!(Table::from_wire("licenses"), None);
    }

    #[test]
    fn apply_order_lists_parents_first() {
        let position = |t: Table| {
            Table::APPLY_ORDER
                .iter()
                .position(|x| *x == t)
                .unwrap()
        };

        for table in Table::APPLY_ORDER {
            for (_, parent) in table.foreign_keys() {
                assert!(
                    position(*parent) < position(table),
                    "{parent} must apply before {table}"
                );
            }
        }
    }

    #[test]
    fn display_uses_wire_name() {
        assert_eq!(Table::AcademicYear.to_string(), "academic_years");
    }
}
