pub mod chat;
pub mod doctor;
pub mod init;
pub mod robots;
pub mod route;
