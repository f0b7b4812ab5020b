pub mod completion;
pub mod habit;
pub mod mood;
pub mod user;
