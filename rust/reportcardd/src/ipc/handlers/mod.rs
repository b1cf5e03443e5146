pub mod auth;
pub mod backup_exchange;
pub mod calc;
pub mod core;
pub mod exams;
pub mod logs;
pub mod marks;
pub mod reports;
pub mod settings;
pub mod students;
pub mod subjects;
pub mod teachers;
