pub mod chat;
pub mod run;
pub mod sessions;
