// Library root: exposes the server modules so tests and the binary share them.

pub mod app;
pub mod protocol;
pub mod ws_server;
