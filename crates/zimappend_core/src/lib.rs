pub mod attachments;
pub mod backend;
pub mod clipboard;
pub mod config;
pub mod content;
pub mod dispatch;
pub mod host;
pub mod notebook;
pub mod page;
pub mod runtime;
pub mod text;
