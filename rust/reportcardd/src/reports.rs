use serde::Serialize;
use std::collections::HashMap;

use crate::calc::{self, ReportScope};
use crate::grading;
use crate::model::{self, Role, Snapshot, Student, Teacher};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamColumn {
    pub exam_id: String,
    pub label: String,
    pub date: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCardRow {
    pub subject_id: String,
    pub subject_name: String,
    pub subject_code: String,
    /// One entry per exam column; `None` renders as "-".
    pub scores: Vec<Option<f64>>,
    pub average: i64,
    pub grade: Option<String>,
    pub remarks: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCard {
    pub student: Student,
    pub year: i64,
    pub term: i64,
    pub exams: Vec<ExamColumn>,
    pub rows: Vec<ReportCardRow>,
    pub total_marks: i64,
    pub average_mark: i64,
    pub overall_grade: String,
    pub position: usize,
    pub class_size: usize,
    pub class_position: String,
}

pub fn student_report_card(
    data: &Snapshot,
    student_id: &str,
    year: i64,
    term: i64,
) -> Option<ReportCard> {
    let student = data.student(student_id)?;

    let mut exams: Vec<&model::Exam> = data
        .exams
        .iter()
        .filter(|e| e.year == year && e.term == term && e.form == student.form)
        .collect();
    exams.sort_by_key(|e| e.exam_type.sort_key());
    let exam_ids: Vec<String> = exams.iter().map(|e| e.id.clone()).collect();

    let rows: Vec<ReportCardRow> = data
        .subjects
        .iter()
        .map(|subject| {
            let scores = exams
                .iter()
                .map(|exam| {
                    data.marks
                        .iter()
                        .find(|m| {
                            m.student_id == student.id
                                && m.exam_id == exam.id
                                && m.subject_id == subject.id
                        })
                        .map(|m| m.score)
                })
                .collect();
            let average = calc::subject_average(data, &student.id, &subject.id, &exam_ids)
                .unwrap_or(0);
            ReportCardRow {
                subject_id: subject.id.clone(),
                subject_name: subject.name.clone(),
                subject_code: subject.code.clone(),
                scores,
                average,
                grade: (average > 0).then(|| grading::fine_grade(average as f64).to_string()),
                remarks: grading::report_card_remark(average).to_string(),
            }
        })
        .collect();

    let aggregate = calc::student_aggregate(data, &student.id, &exam_ids);
    let (position, class_size) = calc::class_position(data, student, &exam_ids);

    Some(ReportCard {
        student: student.clone(),
        year,
        term,
        exams: exams
            .iter()
            .map(|e| ExamColumn {
                exam_id: e.id.clone(),
                label: e.column_label(),
                date: e.date.clone(),
            })
            .collect(),
        rows,
        total_marks: aggregate.total_score,
        average_mark: aggregate.average,
        overall_grade: grading::fine_grade(aggregate.average as f64).to_string(),
        position,
        class_size,
        class_position: format!("{} out of {}", position, class_size),
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectMean {
    pub subject_id: String,
    pub subject: String,
    pub average: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormReport {
    pub form: i64,
    pub year: i64,
    pub term: i64,
    pub exam_id: Option<String>,
    pub total_students: usize,
    pub exams: Vec<ExamColumn>,
    pub form_average: i64,
    pub form_grade: String,
    pub form_remark: String,
    pub rankings: Vec<calc::RankedStudent>,
    pub subject_averages: Vec<SubjectMean>,
    pub subject_summary: calc::SubjectSummaryReport,
    pub most_improved: Vec<calc::Improvement>,
}

pub fn form_report(data: &Snapshot, scope: &ReportScope) -> FormReport {
    let ranked = calc::rank_form(data, scope);
    let form_average = calc::form_average(&ranked);
    let form_grade = grading::coarse_grade(form_average as f64);
    let most_improved = calc::improvements_for(data, scope, &ranked, calc::MOST_IMPROVED_LIMIT);

    let scoped = calc::cohort_marks(data, scope);
    let subject_averages: Vec<SubjectMean> = data
        .subjects
        .iter()
        .filter_map(|subject| {
            let scores: Vec<f64> = scoped
                .iter()
                .filter(|m| m.subject_id == subject.id)
                .map(|m| m.score)
                .collect();
            if scores.is_empty() {
                return None;
            }
            let average =
                grading::round_half_up(scores.iter().sum::<f64>() / scores.len() as f64);
            (average > 0).then(|| SubjectMean {
                subject_id: subject.id.clone(),
                subject: subject.name.clone(),
                average,
            })
        })
        .collect();

    let exams = if model::is_active_form(scope.form) {
        data.exams
            .iter()
            .filter(|e| e.form == scope.form && e.year == scope.year && e.term == scope.term)
            .map(|e| ExamColumn {
                exam_id: e.id.clone(),
                label: e.column_label(),
                date: e.date.clone(),
            })
            .collect()
    } else {
        Vec::new()
    };

    FormReport {
        form: scope.form,
        year: scope.year,
        term: scope.term,
        exam_id: match &scope.exam {
            calc::ExamSelector::All => None,
            calc::ExamSelector::Single(id) => Some(id.clone()),
        },
        total_students: calc::form_cohort(data, scope.form).len(),
        exams,
        form_average,
        form_grade: form_grade.as_str().to_string(),
        form_remark: form_grade.remark().to_string(),
        rankings: ranked,
        subject_averages,
        subject_summary: calc::subject_summary(data, scope),
        most_improved,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormCount {
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormMean {
    pub form: i64,
    pub label: String,
    pub average: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub total_students: usize,
    pub total_subjects: usize,
    pub total_exams: usize,
    pub total_marks: usize,
    pub overall_average: i64,
    pub students_by_form: Vec<FormCount>,
    pub subject_averages: Vec<SubjectMean>,
    pub form_averages: Vec<FormMean>,
}

fn form_label(form: i64) -> String {
    if form == model::ALUMNI_FORM {
        "Alumni".to_string()
    } else {
        format!("Form {}", form)
    }
}

fn rounded_mean(total: f64, count: usize) -> i64 {
    if count == 0 {
        0
    } else {
        grading::round_half_up(total / count as f64)
    }
}

/// School-wide overview. A viewer with the teacher role only sees the
/// subjects they teach in the subject averages.
pub fn dashboard(data: &Snapshot, viewer: Option<&Teacher>) -> Dashboard {
    let mut students_by_form: Vec<FormCount> = Vec::new();
    for s in &data.students {
        let label = form_label(s.form);
        match students_by_form.iter_mut().find(|f| f.label == label) {
            Some(entry) => entry.count += 1,
            None => students_by_form.push(FormCount { label, count: 1 }),
        }
    }

    let mut subject_totals: HashMap<&str, (f64, usize)> = HashMap::new();
    let mut form_totals: HashMap<i64, (f64, usize)> = HashMap::new();
    let student_form: HashMap<&str, i64> = data
        .students
        .iter()
        .map(|s| (s.id.as_str(), s.form))
        .collect();
    for m in &data.marks {
        let entry = subject_totals.entry(m.subject_id.as_str()).or_insert((0.0, 0));
        entry.0 += m.score;
        entry.1 += 1;
        if let Some(form) = student_form.get(m.student_id.as_str()) {
            let entry = form_totals.entry(*form).or_insert((0.0, 0));
            entry.0 += m.score;
            entry.1 += 1;
        }
    }

    let teaching_only = viewer.filter(|t| t.role == Role::Teacher);
    let subject_averages = data
        .subjects
        .iter()
        .filter(|subject| {
            teaching_only
                .map(|t| t.subject_ids.iter().any(|id| *id == subject.id))
                .unwrap_or(true)
        })
        .map(|subject| {
            let (total, count) = subject_totals
                .get(subject.id.as_str())
                .copied()
                .unwrap_or((0.0, 0));
            SubjectMean {
                subject_id: subject.id.clone(),
                subject: subject.name.clone(),
                average: rounded_mean(total, count),
            }
        })
        .collect();

    let form_averages = (1..model::ALUMNI_FORM)
        .map(|form| {
            let (total, count) = form_totals.get(&form).copied().unwrap_or((0.0, 0));
            FormMean {
                form,
                label: form_label(form),
                average: rounded_mean(total, count),
            }
        })
        .collect();

    let all_total: f64 = data.marks.iter().map(|m| m.score).sum();

    Dashboard {
        total_students: data.students.len(),
        total_subjects: data.subjects.len(),
        total_exams: data.exams.len(),
        total_marks: data.marks.len(),
        overall_average: rounded_mean(all_total, data.marks.len()),
        students_by_form,
        subject_averages,
        form_averages,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: String,
    pub teacher_id: String,
    pub teacher_name: String,
    pub action: String,
    pub details: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLogView {
    pub entries: Vec<LogEntry>,
    /// Distinct action tags present in the log, sorted.
    pub actions: Vec<String>,
}

/// Newest first. `search` matches details or the acting teacher's first or
/// last name, ignoring case; `action` of `"all"` means no filter.
pub fn activity_logs(
    data: &Snapshot,
    search: Option<&str>,
    action: Option<&str>,
) -> ActivityLogView {
    let needle = search
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());
    let action = action.filter(|a| !a.is_empty() && !a.eq_ignore_ascii_case("all"));

    let mut entries: Vec<LogEntry> = data
        .activity_logs
        .iter()
        .filter(|log| action.map(|a| log.action == a).unwrap_or(true))
        .filter(|log| {
            let Some(needle) = needle.as_deref() else {
                return true;
            };
            if log.details.to_lowercase().contains(needle) {
                return true;
            }
            data.teacher(&log.teacher_id)
                .map(|t| {
                    t.first_name.to_lowercase().contains(needle)
                        || t.last_name.to_lowercase().contains(needle)
                })
                .unwrap_or(false)
        })
        .map(|log| LogEntry {
            id: log.id.clone(),
            teacher_id: log.teacher_id.clone(),
            teacher_name: data
                .teacher(&log.teacher_id)
                .map(Teacher::display_name)
                .unwrap_or_else(|| "Unknown".to_string()),
            action: log.action.clone(),
            details: log.details.clone(),
            timestamp: log.timestamp.clone(),
        })
        .collect();
    // RFC 3339 UTC timestamps order lexically.
    entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let mut actions: Vec<String> = data
        .activity_logs
        .iter()
        .map(|l| l.action.clone())
        .collect();
    actions.sort();
    actions.dedup();

    ActivityLogView { entries, actions }
}
