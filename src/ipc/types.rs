use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::reset::{CommandRunner, SystemRunner};

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub runner: Box<dyn CommandRunner>,
}

impl AppState {
    pub fn new() -> Self {
        AppState {
            workspace: None,
            db: None,
            runner: Box::new(SystemRunner),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
