pub mod connection;
pub mod event;
pub mod ipc;
pub mod settings;
