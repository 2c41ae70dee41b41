use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

/// Seeded into every new workspace, highest band first.
pub const DEFAULT_GRADE_BANDS: [(f64, f64, f64, &str); 7] = [
    (90.0, 100.0, 10.0, "A+"),
    (80.0, 89.99, 9.0, "A"),
    (70.0, 79.99, 8.0, "B+"),
    (60.0, 69.99, 7.0, "B"),
    (50.0, 59.99, 6.0, "C"),
    (40.0, 49.99, 5.0, "D"),
    (0.0, 39.99, 0.0, "F"),
];

#[derive(Debug, Error)]
pub enum CalcError {
    #[error("course offering not found: {0}")]
    OfferingNotFound(String),
    #[error(transparent)]
    Query(#[from] rusqlite::Error),
}

impl CalcError {
    /// Wire code used when the error is surfaced over IPC.
    pub fn code(&self) -> &'static str {
        match self {
            CalcError::OfferingNotFound(_) => "not_found",
            CalcError::Query(_) => "db_query_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeBand {
    pub min_percent: f64,
    pub max_percent: f64,
    pub grade_point: f64,
    pub grade_letter: String,
}

impl GradeBand {
    pub fn contains(&self, percent: f64) -> bool {
        self.min_percent <= percent && percent <= self.max_percent
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Grade {
    pub point: f64,
    pub letter: String,
}

impl Grade {
    pub fn failing() -> Self {
        Self {
            point: 0.0,
            letter: "F".to_string(),
        }
    }
}

/// Ordered percentage bands. The first band containing a percentage wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GradeScale {
    bands: Vec<GradeBand>,
}

impl GradeScale {
    pub fn new(bands: Vec<GradeBand>) -> Self {
        Self { bands }
    }

    pub fn bands(&self) -> &[GradeBand] {
        &self.bands
    }

    /// Never fails: a percentage outside every band (gaps, < 0, > 100, NaN)
    /// resolves to the failing grade.
    pub fn resolve(&self, percent: f64) -> Grade {
        self.bands
            .iter()
            .find(|b| b.contains(percent))
            .map(|b| Grade {
                point: b.grade_point,
                letter: b.grade_letter.clone(),
            })
            .unwrap_or_else(Grade::failing)
    }
}

pub fn default_grade_scale() -> GradeScale {
    GradeScale::new(
        DEFAULT_GRADE_BANDS
            .iter()
            .map(|&(min_percent, max_percent, grade_point, letter)| GradeBand {
                min_percent,
                max_percent,
                grade_point,
                grade_letter: letter.to_string(),
            })
            .collect(),
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentWeight {
    pub id: String,
    pub max_marks: f64,
    pub weight_percent: f64,
}

impl AssessmentWeight {
    pub fn has_positive_max(&self) -> bool {
        self.max_marks > 0.0
    }

    /// `obtained / max_marks * weight_percent`, unclamped. Zero when the
    /// assessment has no positive maximum.
    pub fn contribution(&self, obtained: f64) -> f64 {
        if self.has_positive_max() {
            (obtained / self.max_marks) * self.weight_percent
        } else {
            0.0
        }
    }
}

/// Sums raw weighted contributions. Weights are not normalized and marks
/// above the maximum are not clamped; a missing mark contributes 0.
pub fn course_percent(assessments: &[AssessmentWeight], marks: &HashMap<String, f64>) -> f64 {
    let mut total = 0.0_f64;
    for a in assessments {
        if !a.has_positive_max() {
            warn!(
                assessment_id = %a.id,
                max_marks = a.max_marks,
                "assessment has no positive max marks, counting it as 0"
            );
        }
        let obtained = marks.get(&a.id).copied().unwrap_or(0.0);
        total += a.contribution(obtained);
    }
    total
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpaEntry {
    pub grade_point: f64,
    pub credits: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GpaSummary {
    pub gpa: f64,
    pub total_credits: f64,
}

pub fn aggregate_gpa(entries: &[GpaEntry]) -> GpaSummary {
    let mut num = 0.0_f64;
    let mut den = 0.0_f64;
    for e in entries {
        num += e.grade_point * e.credits;
        den += e.credits;
    }
    let gpa = if den != 0.0 { num / den } else { 0.0 };
    GpaSummary {
        gpa,
        total_credits: den,
    }
}

/// Which offerings count toward a GPA. `AllTime` counts every offering that
/// has at least one assessment, whether or not the student has marks in it:
/// there is no enrollment model, so an unmarked offering grades as F.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GpaScope {
    Semester(String),
    AllTime,
}

impl GpaScope {
    fn semester_id(&self) -> Option<&str> {
        match self {
            GpaScope::Semester(id) => Some(id.as_str()),
            GpaScope::AllTime => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OfferingCredits {
    pub id: String,
    pub credits: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseSummary {
    pub course_percent: f64,
    pub grade_point: f64,
    pub grade_letter: String,
    pub credits: f64,
}

/// Read-only data access needed by the grade computations.
pub trait GradeSource {
    fn assessments_for_offering(&self, offering_id: &str)
        -> Result<Vec<AssessmentWeight>, CalcError>;

    /// Marks keyed by assessment id, restricted to `assessment_ids`.
    fn marks_for_student(
        &self,
        student_id: &str,
        assessment_ids: &[String],
    ) -> Result<HashMap<String, f64>, CalcError>;

    fn offerings(&self, semester_id: Option<&str>) -> Result<Vec<OfferingCredits>, CalcError>;

    fn offering(&self, offering_id: &str) -> Result<Option<OfferingCredits>, CalcError>;

    fn grade_scale(&self) -> Result<GradeScale, CalcError>;
}

fn percent_for<S: GradeSource + ?Sized>(
    source: &S,
    assessments: &[AssessmentWeight],
    student_id: &str,
) -> Result<f64, CalcError> {
    let ids: Vec<String> = assessments.iter().map(|a| a.id.clone()).collect();
    let marks = source.marks_for_student(student_id, &ids)?;
    Ok(course_percent(assessments, &marks))
}

pub fn compute_course_percent<S: GradeSource + ?Sized>(
    source: &S,
    offering_id: &str,
    student_id: &str,
) -> Result<f64, CalcError> {
    let assessments = source.assessments_for_offering(offering_id)?;
    percent_for(source, &assessments, student_id)
}

pub fn compute_course_summary<S: GradeSource + ?Sized>(
    source: &S,
    offering_id: &str,
    student_id: &str,
) -> Result<CourseSummary, CalcError> {
    let Some(offering) = source.offering(offering_id)? else {
        return Err(CalcError::OfferingNotFound(offering_id.to_string()));
    };
    let course_percent = compute_course_percent(source, offering_id, student_id)?;
    let grade = source.grade_scale()?.resolve(course_percent);
    Ok(CourseSummary {
        course_percent,
        grade_point: grade.point,
        grade_letter: grade.letter,
        credits: offering.credits,
    })
}

pub fn compute_gpa<S: GradeSource + ?Sized>(
    source: &S,
    student_id: &str,
    scope: &GpaScope,
) -> Result<GpaSummary, CalcError> {
    let scale = source.grade_scale()?;
    let mut entries: Vec<GpaEntry> = Vec::new();
    for offering in source.offerings(scope.semester_id())? {
        let assessments = source.assessments_for_offering(&offering.id)?;
        if assessments.is_empty() {
            continue;
        }
        let percent = percent_for(source, &assessments, student_id)?;
        entries.push(GpaEntry {
            grade_point: scale.resolve(percent).point,
            credits: offering.credits,
        });
    }

    let summary = aggregate_gpa(&entries);
    debug!(
        student_id,
        ?scope,
        offerings = entries.len(),
        gpa = summary.gpa,
        "computed gpa"
    );
    Ok(summary)
}

fn offering_credits_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<OfferingCredits> {
    Ok(OfferingCredits {
        id: r.get(0)?,
        credits: r.get(1)?,
    })
}

/// `GradeSource` over a workspace database.
#[derive(Debug, Clone, Copy)]
pub struct CalcContext<'a> {
    pub conn: &'a Connection,
}

impl GradeSource for CalcContext<'_> {
    fn assessments_for_offering(
        &self,
        offering_id: &str,
    ) -> Result<Vec<AssessmentWeight>, CalcError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, max_marks, weight_percent
             FROM assessments
             WHERE course_offering_id = ?
             ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map([offering_id], |r| {
                Ok(AssessmentWeight {
                    id: r.get(0)?,
                    max_marks: r.get(1)?,
                    weight_percent: r.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn marks_for_student(
        &self,
        student_id: &str,
        assessment_ids: &[String],
    ) -> Result<HashMap<String, f64>, CalcError> {
        let mut out = HashMap::new();
        if assessment_ids.is_empty() {
            return Ok(out);
        }

        let placeholders = std::iter::repeat_n("?", assessment_ids.len())
            .collect::<Vec<_>>()
            .join(",");
        let sql = format!(
            "SELECT assessment_id, marks_obtained
             FROM marks
             WHERE student_id = ? AND assessment_id IN ({})",
            placeholders
        );
        let mut bind_values: Vec<Value> = Vec::with_capacity(assessment_ids.len() + 1);
        bind_values.push(Value::Text(student_id.to_string()));
        for id in assessment_ids {
            bind_values.push(Value::Text(id.clone()));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(bind_values), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, f64>(1)?))
        })?;
        for row in rows {
            let (assessment_id, obtained) = row?;
            out.insert(assessment_id, obtained);
        }
        Ok(out)
    }

    fn offerings(&self, semester_id: Option<&str>) -> Result<Vec<OfferingCredits>, CalcError> {
        let rows = match semester_id {
            Some(sem) => {
                let mut stmt = self.conn.prepare(
                    "SELECT co.id, s.credits
                     FROM course_offerings co
                     JOIN subjects s ON s.id = co.subject_id
                     WHERE co.semester_id = ?
                     ORDER BY co.rowid",
                )?;
                let rows = stmt
                    .query_map([sem], offering_credits_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = self.conn.prepare(
                    "SELECT co.id, s.credits
                     FROM course_offerings co
                     JOIN subjects s ON s.id = co.subject_id
                     ORDER BY co.rowid",
                )?;
                let rows = stmt
                    .query_map([], offering_credits_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };
        Ok(rows)
    }

    fn offering(&self, offering_id: &str) -> Result<Option<OfferingCredits>, CalcError> {
        let row = self
            .conn
            .query_row(
                "SELECT co.id, s.credits
                 FROM course_offerings co
                 JOIN subjects s ON s.id = co.subject_id
                 WHERE co.id = ?",
                [offering_id],
                offering_credits_row,
            )
            .optional()?;
        Ok(row)
    }

    fn grade_scale(&self) -> Result<GradeScale, CalcError> {
        let mut stmt = self.conn.prepare(
            "SELECT min_percent, max_percent, grade_point, grade_letter
             FROM grade_scale
             ORDER BY sort_order",
        )?;
        let bands = stmt
            .query_map([], |r| {
                Ok(GradeBand {
                    min_percent: r.get(0)?,
                    max_percent: r.get(1)?,
                    grade_point: r.get(2)?,
                    grade_letter: r.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(GradeScale::new(bands))
    }
}
