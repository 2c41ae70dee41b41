pub mod assessments;
pub mod catalog;
pub mod core;
pub mod grades;
pub mod marks;
pub mod users;
