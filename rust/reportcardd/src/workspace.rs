use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{self, AuthContext};
use crate::db::{SettingsMap, SnapshotStore};
use crate::grading;
use crate::model::{
    self, ActivityLog, Exam, ExamType, Mark, Role, Snapshot, Stream, Student, Subject, Teacher,
    SNAPSHOT_VERSION,
};

#[derive(Debug, Clone, Serialize)]
pub struct OpError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl OpError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    fn not_found(what: &str, id: &str) -> Self {
        Self::new("not_found", format!("{} not found", what)).with_details(json!({ "id": id }))
    }

    fn forbidden(message: impl Into<String>) -> Self {
        Self::new("forbidden", message)
    }

    fn conflict(message: impl Into<String>) -> Self {
        Self::new("conflict", message)
    }
}

pub type OpResult<T> = Result<T, OpError>;

#[derive(Debug, Clone)]
pub struct StudentInput {
    pub first_name: String,
    pub last_name: String,
    pub admission_number: String,
    pub form: i64,
    pub stream: Stream,
    pub guardian_name: String,
    pub guardian_phone: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TeacherInput {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    /// Required on create; `None` keeps the stored password on update.
    pub password: Option<String>,
    pub subject_ids: Vec<String>,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct SubjectInput {
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone)]
pub struct ExamInput {
    pub name: String,
    pub exam_type: ExamType,
    pub term: i64,
    pub year: i64,
    pub form: i64,
    pub date: String,
}

#[derive(Debug, Clone)]
pub struct MarkInput {
    pub student_id: String,
    pub subject_id: String,
    pub exam_id: String,
    pub score: f64,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedEntry {
    pub student_id: String,
    pub score: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkEntrySummary {
    pub added: usize,
    pub updated: usize,
    pub rejected: Vec<RejectedEntry>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionSummary {
    pub promoted: usize,
    pub graduated: usize,
    pub unchanged: usize,
}

pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn required_text(field: &str, value: &str) -> OpResult<String> {
    let t = value.trim();
    if t.is_empty() {
        return Err(OpError::bad_params(format!("{} must not be empty", field)));
    }
    Ok(t.to_string())
}

fn check_form(form: i64) -> OpResult<()> {
    if !model::is_valid_form(form) {
        return Err(OpError::bad_params("form must be between 1 and 5"));
    }
    Ok(())
}

fn score_in_range(score: f64) -> bool {
    score.is_finite() && (0.0..=100.0).contains(&score)
}

fn check_score(score: f64) -> OpResult<()> {
    if !score_in_range(score) {
        return Err(OpError::new("invalid_score", "score must be between 0 and 100")
            .with_details(json!({ "score": score })));
    }
    Ok(())
}

fn require_admin(ctx: &AuthContext, action: &str) -> OpResult<()> {
    if !ctx.is_admin() {
        return Err(OpError::forbidden(format!(
            "only administrators can {}",
            action
        )));
    }
    Ok(())
}

fn require_subject_access(ctx: &AuthContext, subject_id: &str) -> OpResult<()> {
    if ctx.is_admin() || ctx.teaches(subject_id) {
        return Ok(());
    }
    Err(OpError::forbidden("teachers can only record marks for subjects they teach")
        .with_details(json!({ "subjectId": subject_id })))
}

fn push_log(next: &mut Snapshot, teacher_id: &str, action: &str, details: String) {
    next.activity_logs.push(ActivityLog {
        id: new_id(),
        teacher_id: teacher_id.to_string(),
        action: action.to_string(),
        details,
        timestamp: now_timestamp(),
    });
}

/// Default roster for a brand-new workspace.
pub fn seed_snapshot() -> Snapshot {
    let subjects = [
        ("Mathematics", "MATH"),
        ("English Language", "ENG"),
        ("Physics", "PHY"),
        ("Chemistry", "CHEM"),
        ("Biology", "BIO"),
        ("History", "HIST"),
        ("Geography", "GEO"),
        ("Computer Studies", "COMP"),
    ];
    Snapshot {
        version: SNAPSHOT_VERSION,
        subjects: subjects
            .iter()
            .map(|(name, code)| Subject {
                id: new_id(),
                name: name.to_string(),
                code: code.to_string(),
            })
            .collect(),
        teachers: vec![Teacher {
            id: new_id(),
            first_name: "Principal".to_string(),
            last_name: "Smith".to_string(),
            email: "principal@school.edu".to_string(),
            password: "admin123".to_string(),
            subject_ids: Vec::new(),
            role: Role::Admin,
        }],
        ..Snapshot::default()
    }
}

/// The in-memory collection plus its store. Every mutation works on a copy,
/// saves the whole copy, and only then replaces the in-memory state.
pub struct Workspace<S: SnapshotStore> {
    store: S,
    data: Snapshot,
}

impl<S: SnapshotStore> Workspace<S> {
    pub fn open(mut store: S) -> anyhow::Result<Self> {
        let data = match store.load()? {
            Some(data) => data,
            None => {
                let seeded = seed_snapshot();
                store.save(&seeded)?;
                info!(
                    subjects = seeded.subjects.len(),
                    "seeded empty workspace with default roster"
                );
                seeded
            }
        };
        Ok(Self { store, data })
    }

    pub fn data(&self) -> &Snapshot {
        &self.data
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn commit(&mut self, next: Snapshot, action: &str) -> OpResult<()> {
        if let Err(e) = self.store.save(&next) {
            warn!(action, error = %e, "snapshot save failed; change discarded");
            return Err(OpError::new("db_save_failed", format!("{e:#}")));
        }
        self.data = next;
        info!(action, "committed");
        Ok(())
    }

    /// Replaces everything, e.g. after a bundle import. `settings` is written
    /// in the same store transaction when present.
    pub fn replace_snapshot(
        &mut self,
        snapshot: Snapshot,
        settings: Option<&SettingsMap>,
    ) -> OpResult<()> {
        if let Err(e) = self.store.restore(&snapshot, settings) {
            warn!(error = %e, "restore failed; workspace unchanged");
            return Err(OpError::new("db_save_failed", format!("{e:#}")));
        }
        self.data = snapshot;
        info!(action = "SNAPSHOT_REPLACE", "committed");
        Ok(())
    }

    pub fn login(&mut self, email: &str, password: &str) -> OpResult<Teacher> {
        let Some(teacher) = auth::verify_credentials(&self.data, email.trim(), password).cloned()
        else {
            warn!("login rejected");
            return Err(OpError::new("unauthorized", "invalid email or password"));
        };
        let mut next = self.data.clone();
        push_log(&mut next, &teacher.id, "LOGIN", "Teacher logged in".to_string());
        self.commit(next, "LOGIN")?;
        Ok(teacher)
    }

    pub fn logout(&mut self, ctx: &AuthContext) -> OpResult<()> {
        let mut next = self.data.clone();
        push_log(&mut next, &ctx.teacher_id, "LOGOUT", "Teacher logged out".to_string());
        self.commit(next, "LOGOUT")
    }

    fn check_mark_refs(&self, student_id: &str, subject_id: &str, exam_id: &str) -> OpResult<()> {
        if self.data.student(student_id).is_none() {
            return Err(OpError::not_found("student", student_id));
        }
        if self.data.subject(subject_id).is_none() {
            return Err(OpError::not_found("subject", subject_id));
        }
        if self.data.exam(exam_id).is_none() {
            return Err(OpError::not_found("exam", exam_id));
        }
        Ok(())
    }

    pub fn add_mark(&mut self, ctx: &AuthContext, input: MarkInput) -> OpResult<Mark> {
        check_score(input.score)?;
        self.check_mark_refs(&input.student_id, &input.subject_id, &input.exam_id)?;
        require_subject_access(ctx, &input.subject_id)?;

        let mark = Mark {
            id: new_id(),
            grade: grading::fine_grade(input.score).to_string(),
            student_id: input.student_id,
            subject_id: input.subject_id,
            exam_id: input.exam_id,
            score: input.score,
            remarks: input.remarks,
        };
        let mut next = self.data.clone();
        next.marks.push(mark.clone());
        push_log(
            &mut next,
            &ctx.teacher_id,
            "MARK_ENTRY",
            format!(
                "Added mark for student {}, subject {}",
                mark.student_id, mark.subject_id
            ),
        );
        self.commit(next, "MARK_ENTRY")?;
        Ok(mark)
    }

    pub fn update_mark(
        &mut self,
        ctx: &AuthContext,
        mark_id: &str,
        score: f64,
        remarks: Option<String>,
    ) -> OpResult<Mark> {
        check_score(score)?;
        let mut next = self.data.clone();
        let Some(mark) = next.marks.iter_mut().find(|m| m.id == mark_id) else {
            return Err(OpError::not_found("mark", mark_id));
        };
        require_subject_access(ctx, &mark.subject_id)?;
        mark.score = score;
        mark.grade = grading::fine_grade(score).to_string();
        if remarks.is_some() {
            mark.remarks = remarks;
        }
        let updated = mark.clone();
        push_log(
            &mut next,
            &ctx.teacher_id,
            "MARK_UPDATE",
            format!(
                "Updated mark for student {}, subject {}",
                updated.student_id, updated.subject_id
            ),
        );
        self.commit(next, "MARK_UPDATE")?;
        Ok(updated)
    }

    pub fn delete_mark(&mut self, ctx: &AuthContext, mark_id: &str) -> OpResult<()> {
        let Some(existing) = self.data.marks.iter().find(|m| m.id == mark_id).cloned() else {
            return Err(OpError::not_found("mark", mark_id));
        };
        let mut next = self.data.clone();
        next.marks.retain(|m| m.id != mark_id);
        push_log(
            &mut next,
            &ctx.teacher_id,
            "MARK_DELETE",
            format!(
                "Deleted mark for student {}, subject {}",
                existing.student_id, existing.subject_id
            ),
        );
        self.commit(next, "MARK_DELETE")
    }

    /// Bulk entry for one exam and subject, keyed by student. Existing marks
    /// for the same (student, exam, subject) are updated in place.
    pub fn enter_marks(
        &mut self,
        ctx: &AuthContext,
        exam_id: &str,
        subject_id: &str,
        scores: &[(String, f64)],
    ) -> OpResult<MarkEntrySummary> {
        if self.data.exam(exam_id).is_none() {
            return Err(OpError::not_found("exam", exam_id));
        }
        if self.data.subject(subject_id).is_none() {
            return Err(OpError::not_found("subject", subject_id));
        }
        require_subject_access(ctx, subject_id)?;

        let mut next = self.data.clone();
        let mut summary = MarkEntrySummary::default();
        for (student_id, score) in scores {
            let reject = |reason: &str| RejectedEntry {
                student_id: student_id.clone(),
                score: *score,
                reason: reason.to_string(),
            };
            if !score_in_range(*score) {
                summary.rejected.push(reject("score must be between 0 and 100"));
                continue;
            }
            if next.student(student_id).is_none() {
                summary.rejected.push(reject("student not found"));
                continue;
            }

            let existing = next.marks.iter_mut().find(|m| {
                m.student_id == *student_id && m.exam_id == exam_id && m.subject_id == subject_id
            });
            match existing {
                Some(mark) => {
                    mark.score = *score;
                    mark.grade = grading::fine_grade(*score).to_string();
                    summary.updated += 1;
                    push_log(
                        &mut next,
                        &ctx.teacher_id,
                        "MARK_UPDATE",
                        format!(
                            "Updated mark for student {}, subject {}",
                            student_id, subject_id
                        ),
                    );
                }
                None => {
                    next.marks.push(Mark {
                        id: new_id(),
                        student_id: student_id.clone(),
                        subject_id: subject_id.to_string(),
                        exam_id: exam_id.to_string(),
                        score: *score,
                        grade: grading::fine_grade(*score).to_string(),
                        remarks: None,
                    });
                    summary.added += 1;
                    push_log(
                        &mut next,
                        &ctx.teacher_id,
                        "MARK_ENTRY",
                        format!(
                            "Added mark for student {}, subject {}",
                            student_id, subject_id
                        ),
                    );
                }
            }
        }

        if summary.added + summary.updated > 0 {
            self.commit(next, "MARK_BULK_ENTRY")?;
        }
        Ok(summary)
    }

    pub fn add_exam(&mut self, ctx: &AuthContext, input: ExamInput) -> OpResult<Exam> {
        let name = required_text("name", &input.name)?;
        check_form(input.form)?;
        if !model::is_valid_term(input.term) {
            return Err(OpError::bad_params("term must be 1 or 2"));
        }
        let exam = Exam {
            id: new_id(),
            name,
            exam_type: input.exam_type,
            term: input.term,
            year: input.year,
            form: input.form,
            date: input.date.trim().to_string(),
        };
        let mut next = self.data.clone();
        next.exams.push(exam.clone());
        push_log(
            &mut next,
            &ctx.teacher_id,
            "EXAM_ADD",
            format!("Added new exam: {}", exam.name),
        );
        self.commit(next, "EXAM_ADD")?;
        Ok(exam)
    }

    fn build_student(id: String, input: StudentInput) -> OpResult<Student> {
        check_form(input.form)?;
        Ok(Student {
            id,
            first_name: required_text("firstName", &input.first_name)?,
            last_name: required_text("lastName", &input.last_name)?,
            admission_number: input.admission_number.trim().to_string(),
            form: input.form,
            stream: input.stream,
            guardian_name: input.guardian_name.trim().to_string(),
            guardian_phone: input.guardian_phone.trim().to_string(),
            image_url: input.image_url,
        })
    }

    pub fn add_student(&mut self, ctx: &AuthContext, input: StudentInput) -> OpResult<Student> {
        require_admin(ctx, "add students")?;
        let student = Self::build_student(new_id(), input)?;
        let mut next = self.data.clone();
        next.students.push(student.clone());
        push_log(
            &mut next,
            &ctx.teacher_id,
            "STUDENT_ADD",
            format!("Added new student: {}", student.display_name()),
        );
        self.commit(next, "STUDENT_ADD")?;
        Ok(student)
    }

    pub fn update_student(
        &mut self,
        ctx: &AuthContext,
        student_id: &str,
        input: StudentInput,
    ) -> OpResult<Student> {
        require_admin(ctx, "update students")?;
        let updated = Self::build_student(student_id.to_string(), input)?;
        let mut next = self.data.clone();
        let Some(slot) = next.students.iter_mut().find(|s| s.id == student_id) else {
            return Err(OpError::not_found("student", student_id));
        };
        *slot = updated.clone();
        push_log(
            &mut next,
            &ctx.teacher_id,
            "STUDENT_UPDATE",
            format!("Updated student: {}", updated.display_name()),
        );
        self.commit(next, "STUDENT_UPDATE")?;
        Ok(updated)
    }

    /// Removes the student and every mark they have. Returns the number of
    /// marks removed.
    pub fn delete_student(&mut self, ctx: &AuthContext, student_id: &str) -> OpResult<usize> {
        require_admin(ctx, "delete students")?;
        let Some(existing) = self.data.student(student_id).cloned() else {
            return Err(OpError::not_found("student", student_id));
        };
        let mut next = self.data.clone();
        next.students.retain(|s| s.id != student_id);
        let before = next.marks.len();
        next.marks.retain(|m| m.student_id != student_id);
        let removed = before - next.marks.len();
        push_log(
            &mut next,
            &ctx.teacher_id,
            "STUDENT_DELETE",
            format!("Deleted student: {}", existing.display_name()),
        );
        self.commit(next, "STUDENT_DELETE")?;
        Ok(removed)
    }

    /// Forms 1-3 move up one form, form 4 graduates to alumni, alumni stay.
    pub fn promote_students(
        &mut self,
        ctx: &AuthContext,
        student_ids: &[String],
    ) -> OpResult<PromotionSummary> {
        require_admin(ctx, "update students")?;
        if student_ids.is_empty() {
            return Err(OpError::bad_params("no students selected"));
        }
        let mut next = self.data.clone();
        let mut summary = PromotionSummary::default();
        let mut changed: Vec<String> = Vec::new();
        for id in student_ids {
            let Some(student) = next.students.iter_mut().find(|s| s.id == *id) else {
                summary.unchanged += 1;
                continue;
            };
            if student.form < 4 {
                student.form += 1;
                summary.promoted += 1;
            } else if student.form == 4 {
                student.form = model::ALUMNI_FORM;
                summary.graduated += 1;
            } else {
                summary.unchanged += 1;
                continue;
            }
            changed.push(student.display_name());
        }
        for name in changed.iter() {
            push_log(
                &mut next,
                &ctx.teacher_id,
                "STUDENT_UPDATE",
                format!("Updated student: {}", name),
            );
        }
        if !changed.is_empty() {
            self.commit(next, "STUDENT_PROMOTE")?;
        }
        Ok(summary)
    }

    fn check_subject_ids(&self, subject_ids: &[String]) -> OpResult<()> {
        for id in subject_ids {
            if self.data.subject(id).is_none() {
                return Err(OpError::not_found("subject", id));
            }
        }
        Ok(())
    }

    fn check_email_free(&self, email: &str, except_id: Option<&str>) -> OpResult<()> {
        let taken = self
            .data
            .teachers
            .iter()
            .any(|t| t.email.eq_ignore_ascii_case(email) && Some(t.id.as_str()) != except_id);
        if taken {
            return Err(OpError::conflict("email is already in use")
                .with_details(json!({ "email": email })));
        }
        Ok(())
    }

    pub fn add_teacher(&mut self, ctx: &AuthContext, input: TeacherInput) -> OpResult<Teacher> {
        require_admin(ctx, "add teachers")?;
        let email = required_text("email", &input.email)?;
        let password = required_text("password", input.password.as_deref().unwrap_or(""))?;
        self.check_email_free(&email, None)?;
        self.check_subject_ids(&input.subject_ids)?;
        let teacher = Teacher {
            id: new_id(),
            first_name: required_text("firstName", &input.first_name)?,
            last_name: required_text("lastName", &input.last_name)?,
            email,
            password,
            subject_ids: input.subject_ids,
            role: input.role,
        };
        let mut next = self.data.clone();
        next.teachers.push(teacher.clone());
        push_log(
            &mut next,
            &ctx.teacher_id,
            "TEACHER_ADD",
            format!("Added new teacher: {}", teacher.display_name()),
        );
        self.commit(next, "TEACHER_ADD")?;
        Ok(teacher)
    }

    pub fn update_teacher(
        &mut self,
        ctx: &AuthContext,
        teacher_id: &str,
        input: TeacherInput,
    ) -> OpResult<Teacher> {
        require_admin(ctx, "update teachers")?;
        let email = required_text("email", &input.email)?;
        let first_name = required_text("firstName", &input.first_name)?;
        let last_name = required_text("lastName", &input.last_name)?;
        self.check_email_free(&email, Some(teacher_id))?;
        self.check_subject_ids(&input.subject_ids)?;

        let mut next = self.data.clone();
        let Some(slot) = next.teachers.iter_mut().find(|t| t.id == teacher_id) else {
            return Err(OpError::not_found("teacher", teacher_id));
        };
        slot.first_name = first_name;
        slot.last_name = last_name;
        slot.email = email;
        if let Some(pw) = input.password.as_deref() {
            slot.password = required_text("password", pw)?;
        }
        slot.subject_ids = input.subject_ids;
        slot.role = input.role;
        let updated = slot.clone();
        push_log(
            &mut next,
            &ctx.teacher_id,
            "TEACHER_UPDATE",
            format!("Updated teacher: {}", updated.display_name()),
        );
        self.commit(next, "TEACHER_UPDATE")?;
        Ok(updated)
    }

    pub fn delete_teacher(&mut self, ctx: &AuthContext, teacher_id: &str) -> OpResult<()> {
        require_admin(ctx, "delete teachers")?;
        if ctx.teacher_id == teacher_id {
            return Err(OpError::conflict("you cannot delete your own account"));
        }
        let Some(existing) = self.data.teacher(teacher_id).cloned() else {
            return Err(OpError::not_found("teacher", teacher_id));
        };
        let mut next = self.data.clone();
        next.teachers.retain(|t| t.id != teacher_id);
        push_log(
            &mut next,
            &ctx.teacher_id,
            "TEACHER_DELETE",
            format!("Deleted teacher: {}", existing.display_name()),
        );
        self.commit(next, "TEACHER_DELETE")
    }

    pub fn add_subject(&mut self, ctx: &AuthContext, input: SubjectInput) -> OpResult<Subject> {
        require_admin(ctx, "add subjects")?;
        let subject = Subject {
            id: new_id(),
            name: required_text("name", &input.name)?,
            code: required_text("code", &input.code)?,
        };
        let mut next = self.data.clone();
        next.subjects.push(subject.clone());
        push_log(
            &mut next,
            &ctx.teacher_id,
            "SUBJECT_ADD",
            format!("Added new subject: {}", subject.name),
        );
        self.commit(next, "SUBJECT_ADD")?;
        Ok(subject)
    }

    pub fn update_subject(
        &mut self,
        ctx: &AuthContext,
        subject_id: &str,
        input: SubjectInput,
    ) -> OpResult<Subject> {
        require_admin(ctx, "update subjects")?;
        let name = required_text("name", &input.name)?;
        let code = required_text("code", &input.code)?;
        let mut next = self.data.clone();
        let Some(slot) = next.subjects.iter_mut().find(|s| s.id == subject_id) else {
            return Err(OpError::not_found("subject", subject_id));
        };
        slot.name = name;
        slot.code = code;
        let updated = slot.clone();
        push_log(
            &mut next,
            &ctx.teacher_id,
            "SUBJECT_UPDATE",
            format!("Updated subject: {}", updated.name),
        );
        self.commit(next, "SUBJECT_UPDATE")?;
        Ok(updated)
    }

    /// Refused while marks reference the subject or a teacher is assigned it.
    pub fn delete_subject(&mut self, ctx: &AuthContext, subject_id: &str) -> OpResult<()> {
        require_admin(ctx, "delete subjects")?;
        let Some(existing) = self.data.subject(subject_id).cloned() else {
            return Err(OpError::not_found("subject", subject_id));
        };
        if self.data.marks.iter().any(|m| m.subject_id == subject_id) {
            return Err(OpError::conflict(
                "cannot delete a subject that has marks associated with it",
            ));
        }
        if self
            .data
            .teachers
            .iter()
            .any(|t| t.subject_ids.iter().any(|s| s == subject_id))
        {
            return Err(OpError::conflict(
                "cannot delete a subject that is assigned to teachers",
            ));
        }
        let mut next = self.data.clone();
        next.subjects.retain(|s| s.id != subject_id);
        push_log(
            &mut next,
            &ctx.teacher_id,
            "SUBJECT_DELETE",
            format!("Deleted subject: {}", existing.name),
        );
        self.commit(next, "SUBJECT_DELETE")
    }
}
