use serde::{Deserialize, Serialize};

use crate::grading;

/// Snapshot document version written by this build.
pub const SNAPSHOT_VERSION: i64 = 1;

/// Form value used for graduated students.
pub const ALUMNI_FORM: i64 = 5;

pub fn is_valid_form(form: i64) -> bool {
    (1..=ALUMNI_FORM).contains(&form)
}

/// Forms 1-4 take part in term aggregation; alumni do not.
pub fn is_active_form(form: i64) -> bool {
    (1..ALUMNI_FORM).contains(&form)
}

pub fn is_valid_term(term: i64) -> bool {
    term == 1 || term == 2
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stream {
    A,
    B,
    C,
}

impl Stream {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "A" => Some(Stream::A),
            "B" => Some(Stream::B),
            "C" => Some(Stream::C),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub admission_number: String,
    pub form: i64,
    pub stream: Stream,
    pub guardian_name: String,
    pub guardian_phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl Student {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExamType {
    TermStart,
    MidTerm,
    EndTerm,
    Custom,
}

impl ExamType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "TermStart" => Some(ExamType::TermStart),
            "MidTerm" => Some(ExamType::MidTerm),
            "EndTerm" => Some(ExamType::EndTerm),
            "Custom" => Some(ExamType::Custom),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExamType::TermStart => "TermStart",
            ExamType::MidTerm => "MidTerm",
            ExamType::EndTerm => "EndTerm",
            ExamType::Custom => "Custom",
        }
    }

    /// Column order on the report card.
    pub fn sort_key(self) -> u8 {
        match self {
            ExamType::TermStart => 1,
            ExamType::MidTerm => 2,
            ExamType::EndTerm => 3,
            ExamType::Custom => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exam {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub exam_type: ExamType,
    pub term: i64,
    pub year: i64,
    pub form: i64,
    pub date: String,
}

impl Exam {
    pub fn column_label(&self) -> String {
        match self.exam_type {
            ExamType::Custom => self.name.clone(),
            other => other.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mark {
    pub id: String,
    pub student_id: String,
    pub subject_id: String,
    pub exam_id: String,
    pub score: f64,
    #[serde(default)]
    pub grade: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Teacher,
    Admin,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "teacher" => Some(Role::Teacher),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub subject_ids: Vec<String>,
    pub role: Role,
}

impl Teacher {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Listing view; the password never leaves the daemon.
    pub fn public_view(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "firstName": self.first_name,
            "lastName": self.last_name,
            "email": self.email,
            "subjectIds": self.subject_ids,
            "role": self.role,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLog {
    pub id: String,
    pub teacher_id: String,
    pub action: String,
    pub details: String,
    pub timestamp: String,
}

/// The whole persisted state. Saved and loaded as one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub version: i64,
    #[serde(default)]
    pub students: Vec<Student>,
    #[serde(default)]
    pub subjects: Vec<Subject>,
    #[serde(default)]
    pub exams: Vec<Exam>,
    #[serde(default)]
    pub marks: Vec<Mark>,
    #[serde(default)]
    pub teachers: Vec<Teacher>,
    #[serde(default)]
    pub activity_logs: Vec<ActivityLog>,
}

impl Snapshot {
    pub fn student(&self, id: &str) -> Option<&Student> {
        self.students.iter().find(|s| s.id == id)
    }

    pub fn subject(&self, id: &str) -> Option<&Subject> {
        self.subjects.iter().find(|s| s.id == id)
    }

    pub fn exam(&self, id: &str) -> Option<&Exam> {
        self.exams.iter().find(|e| e.id == id)
    }

    pub fn teacher(&self, id: &str) -> Option<&Teacher> {
        self.teachers.iter().find(|t| t.id == id)
    }

    /// Brings an older document up to `SNAPSHOT_VERSION`.
    ///
    /// Version 0 is the raw browser blob: same collections, no `version` key,
    /// and marks may carry an empty grade.
    pub fn upgrade(mut self) -> anyhow::Result<Self> {
        if self.version > SNAPSHOT_VERSION {
            anyhow::bail!(
                "snapshot version {} is newer than supported version {}",
                self.version,
                SNAPSHOT_VERSION
            );
        }
        if self.version < 1 {
            for mark in &mut self.marks {
                if mark.grade.trim().is_empty() {
                    mark.grade = grading::fine_grade(mark.score).to_string();
                }
            }
        }
        self.version = SNAPSHOT_VERSION;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn browser_blob_loads_as_version_zero_and_upgrades() {
        let blob = serde_json::json!({
            "students": [{
                "id": "std1", "firstName": "John", "lastName": "Smith",
                "admissionNumber": "F1-001", "form": 1, "stream": "A",
                "guardianName": "Mary Smith", "guardianPhone": "+2547123456789",
                "imageUrl": "/placeholder.svg"
            }],
            "subjects": [{ "id": "subj1", "name": "Mathematics", "code": "MATH" }],
            "exams": [{
                "id": "exam1", "name": "Opener", "type": "TermStart", "term": 1,
                "year": 2024, "form": 1, "date": "2024-01-15"
            }],
            "marks": [{
                "id": "mark1", "studentId": "std1", "subjectId": "subj1",
                "examId": "exam1", "score": 76, "grade": ""
            }],
            "teachers": [],
            "activityLogs": []
        });
        let snap: Snapshot = serde_json::from_value(blob).expect("parse blob");
        assert_eq!(snap.version, 0);
        let snap = snap.upgrade().expect("upgrade");
        assert_eq!(snap.version, SNAPSHOT_VERSION);
        assert_eq!(snap.marks[0].grade, "A-");
        assert_eq!(snap.exams[0].exam_type, ExamType::TermStart);
    }

    #[test]
    fn newer_snapshot_is_refused() {
        let snap = Snapshot {
            version: SNAPSHOT_VERSION + 1,
            ..Snapshot::default()
        };
        assert!(snap.upgrade().is_err());
    }

    #[test]
    fn public_view_omits_password() {
        let t = Teacher {
            id: "t1".into(),
            first_name: "Jane".into(),
            last_name: "Doe".into(),
            email: "j.doe@school.edu".into(),
            password: "secret".into(),
            subject_ids: vec!["subj2".into()],
            role: Role::Teacher,
        };
        let v = t.public_view();
        assert!(v.get("password").is_none());
        assert_eq!(v["role"], "teacher");
    }

    #[test]
    fn form_ranges() {
        assert!(is_active_form(4));
        assert!(!is_active_form(ALUMNI_FORM));
        assert!(is_valid_form(ALUMNI_FORM));
        assert!(!is_valid_form(0));
        assert!(!is_valid_term(3));
    }
}
