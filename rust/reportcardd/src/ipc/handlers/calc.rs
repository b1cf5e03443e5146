use crate::calc::{self, ExamSelector, ReportScope};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    optional_i64, optional_str, report_scope, required_i64, required_str, string_list, ws,
};
use crate::ipc::types::{AppState, Request};
use crate::model::Snapshot;
use serde_json::json;

/// Exam ids for one student: an explicit `examIds` list when present,
/// otherwise the student's form in (year, term), narrowed to `examId` when
/// given.
fn student_exam_ids(
    data: &Snapshot,
    req: &Request,
    student_id: &str,
) -> Result<Vec<String>, serde_json::Value> {
    let Some(student) = data.student(student_id) else {
        return Err(err(
            &req.id,
            "not_found",
            "student not found",
            Some(json!({ "studentId": student_id })),
        ));
    };
    if req.params.get("examIds").is_some_and(|v| !v.is_null()) {
        return string_list(req, "examIds");
    }
    let scope = ReportScope {
        form: student.form,
        year: required_i64(req, "year")?,
        term: required_i64(req, "term")?,
        exam: ExamSelector::parse(optional_str(req, "examId").as_deref()),
    };
    Ok(calc::scope_exam_ids(data, &scope))
}

fn handle_subject_average(state: &mut AppState, req: &Request) -> serde_json::Value {
    let data = match ws(state, req) {
        Ok(v) => v.data(),
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let subject_id = match required_str(req, "subjectId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let exam_ids = match student_exam_ids(data, req, &student_id) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let average = calc::subject_average(data, &student_id, &subject_id, &exam_ids);
    ok(&req.id, json!({ "average": average }))
}

fn handle_student_aggregate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let data = match ws(state, req) {
        Ok(v) => v.data(),
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let exam_ids = match student_exam_ids(data, req, &student_id) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let aggregate = calc::student_aggregate(data, &student_id, &exam_ids);
    ok(&req.id, json!(aggregate))
}

fn handle_rank_form(state: &mut AppState, req: &Request) -> serde_json::Value {
    let data = match ws(state, req) {
        Ok(v) => v.data(),
        Err(e) => return e,
    };
    let scope = match report_scope(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let rankings = calc::rank_form(data, &scope);
    let form_average = calc::form_average(&rankings);
    ok(
        &req.id,
        json!({
            "rankings": rankings,
            "formAverage": form_average,
        }),
    )
}

fn handle_most_improved(state: &mut AppState, req: &Request) -> serde_json::Value {
    let data = match ws(state, req) {
        Ok(v) => v.data(),
        Err(e) => return e,
    };
    let scope = match report_scope(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let limit = match optional_i64(req, "limit") {
        Ok(Some(n)) if n > 0 => n as usize,
        Ok(Some(n)) => {
            return err(
                &req.id,
                "bad_params",
                "limit must be positive",
                Some(json!({ "limit": n })),
            )
        }
        Ok(None) => calc::MOST_IMPROVED_LIMIT,
        Err(e) => return e,
    };
    let (previous_year, previous_term) = calc::previous_period(scope.year, scope.term);
    let students = calc::most_improved(data, &scope, limit);
    ok(
        &req.id,
        json!({
            "previousYear": previous_year,
            "previousTerm": previous_term,
            "students": students,
        }),
    )
}

fn handle_subject_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let data = match ws(state, req) {
        Ok(v) => v.data(),
        Err(e) => return e,
    };
    let scope = match report_scope(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    ok(&req.id, json!(calc::subject_summary(data, &scope)))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "calc.subjectAverage" => Some(handle_subject_average(state, req)),
        "calc.studentAggregate" => Some(handle_student_aggregate(state, req)),
        "calc.rankForm" => Some(handle_rank_form(state, req)),
        "calc.mostImproved" => Some(handle_most_improved(state, req)),
        "calc.subjectSummary" => Some(handle_subject_summary(state, req)),
        _ => None,
    }
}
