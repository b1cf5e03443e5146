use std::collections::HashMap;
use uuid::Uuid;

use crate::model::{Role, Snapshot, Teacher};

/// The acting teacher for a mutation. Resolved per request and passed
/// explicitly; nothing in the workspace remembers who is logged in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub teacher_id: String,
    pub role: Role,
    pub subject_ids: Vec<String>,
}

impl AuthContext {
    pub fn for_teacher(teacher: &Teacher) -> Self {
        Self {
            teacher_id: teacher.id.clone(),
            role: teacher.role,
            subject_ids: teacher.subject_ids.clone(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn teaches(&self, subject_id: &str) -> bool {
        self.subject_ids.iter().any(|s| s == subject_id)
    }
}

/// Plaintext comparison, exactly as stored.
pub fn verify_credentials<'a>(
    data: &'a Snapshot,
    email: &str,
    password: &str,
) -> Option<&'a Teacher> {
    data.teachers
        .iter()
        .find(|t| t.email == email && t.password == password)
}

/// Session tokens issued by `auth.login`, mapped to teacher ids.
#[derive(Debug, Default)]
pub struct Sessions {
    by_token: HashMap<String, String>,
}

impl Sessions {
    pub fn issue(&mut self, teacher_id: &str) -> String {
        let token = Uuid::new_v4().to_string();
        self.by_token.insert(token.clone(), teacher_id.to_string());
        token
    }

    pub fn revoke(&mut self, token: &str) -> Option<String> {
        self.by_token.remove(token)
    }

    pub fn clear(&mut self) {
        self.by_token.clear();
    }

    /// Looks the teacher up in the current data so role and subject changes
    /// apply immediately. A token whose teacher was deleted resolves to `None`.
    pub fn resolve(&self, token: &str, data: &Snapshot) -> Option<AuthContext> {
        let teacher_id = self.by_token.get(token)?;
        data.teacher(teacher_id).map(AuthContext::for_teacher)
    }
}
