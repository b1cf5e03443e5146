use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashSet;

use crate::grading::{self, CoarseGrade, Division};
use crate::model::{self, Mark, Snapshot, Student};

/// Default length of the most-improved list.
pub const MOST_IMPROVED_LIMIT: usize = 10;

/// Which exams of a reporting period feed a form-level computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExamSelector {
    All,
    Single(String),
}

impl ExamSelector {
    /// `None`, `"all"` (any case) and `""` select every exam of the period.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => ExamSelector::All,
            Some(s) if s.eq_ignore_ascii_case("all") => ExamSelector::All,
            Some(s) => ExamSelector::Single(s.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportScope {
    pub form: i64,
    pub year: i64,
    pub term: i64,
    pub exam: ExamSelector,
}

impl ReportScope {
    pub fn period(form: i64, year: i64, term: i64) -> Self {
        Self {
            form,
            year,
            term,
            exam: ExamSelector::All,
        }
    }
}

/// Term 2 steps back to term 1 of the same year; term 1 wraps to term 2 of
/// the year before. Saturates at the smallest representable year.
pub fn previous_period(year: i64, term: i64) -> (i64, i64) {
    if term == 2 {
        (year, 1)
    } else {
        (year.saturating_sub(1), 2)
    }
}

pub fn relevant_exam_ids(data: &Snapshot, form: i64, year: i64, term: i64) -> Vec<String> {
    data.exams
        .iter()
        .filter(|e| e.form == form && e.year == year && e.term == term)
        .map(|e| e.id.clone())
        .collect()
}

/// A single selected exam is taken as-is, matching by id only.
pub fn scope_exam_ids(data: &Snapshot, scope: &ReportScope) -> Vec<String> {
    match &scope.exam {
        ExamSelector::All => relevant_exam_ids(data, scope.form, scope.year, scope.term),
        ExamSelector::Single(id) => vec![id.clone()],
    }
}

/// Students of an active form, ordered by last name. The sort is stable, so
/// equal surnames keep their collection order; this order is the ranking
/// tie-break.
pub fn form_cohort(data: &Snapshot, form: i64) -> Vec<&Student> {
    if !model::is_active_form(form) {
        return Vec::new();
    }
    let mut cohort: Vec<&Student> = data.students.iter().filter(|s| s.form == form).collect();
    cohort.sort_by_key(|s| s.last_name.to_lowercase());
    cohort
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn marks_in_scope<'a>(
    marks: &'a [Mark],
    student_id: &'a str,
    exam_ids: &'a [String],
) -> impl Iterator<Item = &'a Mark> + 'a {
    marks
        .iter()
        .filter(move |m| m.student_id == student_id && exam_ids.iter().any(|e| *e == m.exam_id))
}

/// Mean of every matching mark, rounded half-up. Duplicate marks for the same
/// (student, subject, exam) are all averaged in.
pub fn subject_average(
    data: &Snapshot,
    student_id: &str,
    subject_id: &str,
    exam_ids: &[String],
) -> Option<i64> {
    let scores: Vec<f64> = marks_in_scope(&data.marks, student_id, exam_ids)
        .filter(|m| m.subject_id == subject_id)
        .map(|m| m.score)
        .collect();
    mean(&scores).map(grading::round_half_up)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectScore {
    pub subject_id: String,
    pub average: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentAggregate {
    pub total_score: i64,
    pub average: i64,
    pub total_points: i64,
    pub division: Division,
    pub subject_count: usize,
    pub subject_scores: Vec<SubjectScore>,
}

impl StudentAggregate {
    pub fn has_data(&self) -> bool {
        self.subject_count > 0
    }
}

/// Subject averages in subject-list order, skipping subjects without marks.
fn subject_scores(data: &Snapshot, student_id: &str, exam_ids: &[String]) -> Vec<SubjectScore> {
    let scoped: Vec<&Mark> = marks_in_scope(&data.marks, student_id, exam_ids).collect();
    if scoped.is_empty() {
        return Vec::new();
    }
    data.subjects
        .iter()
        .filter_map(|subject| {
            let scores: Vec<f64> = scoped
                .iter()
                .filter(|m| m.subject_id == subject.id)
                .map(|m| m.score)
                .collect();
            mean(&scores).map(|avg| SubjectScore {
                subject_id: subject.id.clone(),
                average: grading::round_half_up(avg),
            })
        })
        .collect()
}

pub fn student_aggregate(
    data: &Snapshot,
    student_id: &str,
    exam_ids: &[String],
) -> StudentAggregate {
    let scores = subject_scores(data, student_id, exam_ids);
    let total_score: i64 = scores.iter().map(|s| s.average).sum();
    let total_points: i64 = scores
        .iter()
        .map(|s| grading::coarse_grade(s.average as f64).points())
        .sum();
    let average = if scores.is_empty() {
        0
    } else {
        grading::round_half_up(total_score as f64 / scores.len() as f64)
    };
    StudentAggregate {
        total_score,
        average,
        total_points,
        division: grading::division_for_points(total_points),
        subject_count: scores.len(),
        subject_scores: scores,
    }
}

/// Unrounded mean of subject averages, 0.0 without data. Used for report-card
/// class positions.
pub fn unrounded_average(data: &Snapshot, student_id: &str, exam_ids: &[String]) -> f64 {
    let scores = subject_scores(data, student_id, exam_ids);
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().map(|s| s.average as f64).sum::<f64>() / scores.len() as f64
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedStudent {
    pub rank: usize,
    pub student_id: String,
    pub name: String,
    pub admission_number: String,
    pub stream: model::Stream,
    pub aggregate: StudentAggregate,
}

/// Students with data, ordered by descending average. Equal averages keep
/// cohort order.
pub fn rank_form(data: &Snapshot, scope: &ReportScope) -> Vec<RankedStudent> {
    let exam_ids = scope_exam_ids(data, scope);
    let mut rows: Vec<(&Student, StudentAggregate)> = form_cohort(data, scope.form)
        .into_iter()
        .map(|s| (s, student_aggregate(data, &s.id, &exam_ids)))
        .filter(|(_, agg)| agg.has_data())
        .collect();
    rows.sort_by(|a, b| b.1.average.cmp(&a.1.average));
    rows.into_iter()
        .enumerate()
        .map(|(i, (s, aggregate))| RankedStudent {
            rank: i + 1,
            student_id: s.id.clone(),
            name: s.display_name(),
            admission_number: s.admission_number.clone(),
            stream: s.stream,
            aggregate,
        })
        .collect()
}

/// Σ total score ÷ Σ subject count over ranked students, rounded.
pub fn form_average(ranked: &[RankedStudent]) -> i64 {
    let total: i64 = ranked.iter().map(|r| r.aggregate.total_score).sum();
    let count: usize = ranked.iter().map(|r| r.aggregate.subject_count).sum();
    if count == 0 {
        return 0;
    }
    grading::round_half_up(total as f64 / count as f64)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Improvement {
    pub student_id: String,
    pub name: String,
    pub improvement: i64,
    pub previous: i64,
    pub current: i64,
}

/// Change in average against the previous period for ranked students. The
/// previous period always uses all of its exams for the same form.
pub fn most_improved(data: &Snapshot, scope: &ReportScope, limit: usize) -> Vec<Improvement> {
    let ranked = rank_form(data, scope);
    improvements_for(data, scope, &ranked, limit)
}

pub fn improvements_for(
    data: &Snapshot,
    scope: &ReportScope,
    ranked: &[RankedStudent],
    limit: usize,
) -> Vec<Improvement> {
    let (prev_year, prev_term) = previous_period(scope.year, scope.term);
    let prev_exam_ids = relevant_exam_ids(data, scope.form, prev_year, prev_term);

    let mut rows: Vec<Improvement> = ranked
        .iter()
        .map(|r| {
            let previous = student_aggregate(data, &r.student_id, &prev_exam_ids).average;
            let current = r.aggregate.average;
            Improvement {
                student_id: r.student_id.clone(),
                name: r.name.clone(),
                improvement: current - previous,
                previous,
                current,
            }
        })
        .filter(|r| r.previous > 0 || r.current > 0)
        .collect();
    rows.sort_by(|a, b| b.improvement.cmp(&a.improvement));
    rows.truncate(limit);
    rows
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GradeDistribution {
    #[serde(rename = "A")]
    pub a: usize,
    #[serde(rename = "B")]
    pub b: usize,
    #[serde(rename = "C")]
    pub c: usize,
    #[serde(rename = "D")]
    pub d: usize,
    #[serde(rename = "F")]
    pub f: usize,
}

impl GradeDistribution {
    fn add(&mut self, grade: CoarseGrade) {
        match grade {
            CoarseGrade::A => self.a += 1,
            CoarseGrade::B => self.b += 1,
            CoarseGrade::C => self.c += 1,
            CoarseGrade::D => self.d += 1,
            CoarseGrade::F => self.f += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectSummary {
    pub subject_id: String,
    pub name: String,
    pub code: String,
    pub total_students: usize,
    pub average: f64,
    pub distribution: GradeDistribution,
    pub absent: usize,
    pub gpa: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectSummaryReport {
    pub cohort_size: usize,
    pub subjects: Vec<SubjectSummary>,
    pub overall_gpa: f64,
}

/// Marks of the form cohort that fall inside the scope.
pub fn cohort_marks<'a>(data: &'a Snapshot, scope: &ReportScope) -> Vec<&'a Mark> {
    let cohort_ids: HashSet<&str> = form_cohort(data, scope.form)
        .into_iter()
        .map(|s| s.id.as_str())
        .collect();
    let exam_ids = scope_exam_ids(data, scope);
    data.marks
        .iter()
        .filter(|m| {
            cohort_ids.contains(m.student_id.as_str()) && exam_ids.iter().any(|e| *e == m.exam_id)
        })
        .collect()
}

pub fn subject_summary(data: &Snapshot, scope: &ReportScope) -> SubjectSummaryReport {
    let cohort_size = form_cohort(data, scope.form).len();
    let scoped = cohort_marks(data, scope);

    let subjects: Vec<SubjectSummary> = data
        .subjects
        .iter()
        .map(|subject| {
            let marks: Vec<&&Mark> = scoped.iter().filter(|m| m.subject_id == subject.id).collect();
            let students_with_marks: HashSet<&str> =
                marks.iter().map(|m| m.student_id.as_str()).collect();

            let mut distribution = GradeDistribution::default();
            let mut total_score = 0.0_f64;
            let mut total_points = 0_i64;
            for m in &marks {
                let grade = grading::coarse_grade(m.score);
                distribution.add(grade);
                total_score += m.score;
                total_points += grade.points();
            }

            let (average, gpa) = if marks.is_empty() {
                (0.0, 0.0)
            } else {
                let n = marks.len() as f64;
                (
                    grading::round_2_decimals(total_score / n),
                    grading::round_2_decimals(grading::points_to_gpa(total_points as f64 / n)),
                )
            };

            SubjectSummary {
                subject_id: subject.id.clone(),
                name: subject.name.clone(),
                code: subject.code.clone(),
                total_students: students_with_marks.len(),
                average,
                distribution,
                absent: cohort_size.saturating_sub(students_with_marks.len()),
                gpa,
            }
        })
        .collect();

    let graded: Vec<f64> = subjects
        .iter()
        .filter(|s| s.total_students > 0)
        .map(|s| s.gpa)
        .collect();
    let overall_gpa = mean(&graded).map(grading::round_2_decimals).unwrap_or(0.0);

    SubjectSummaryReport {
        cohort_size,
        subjects,
        overall_gpa,
    }
}

/// Class position among every student of the same form, by unrounded average,
/// stable descending. Returns (position, class size).
pub fn class_position(data: &Snapshot, student: &Student, exam_ids: &[String]) -> (usize, usize) {
    let mut classmates: Vec<(&str, f64)> = data
        .students
        .iter()
        .filter(|s| s.form == student.form)
        .map(|s| (s.id.as_str(), unrounded_average(data, &s.id, exam_ids)))
        .collect();
    classmates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    let position = classmates
        .iter()
        .position(|(id, _)| *id == student.id)
        .map(|i| i + 1)
        .unwrap_or(0);
    (position, classmates.len())
}
