//! Board connection settings, resolved from the environment.
//!
//! `bwk` talks to exactly one board per invocation. The token and board id
//! have no sensible defaults and must be set; the API base only needs
//! overriding for mock servers in tests.

use std::time::Duration;

use crate::remote::HttpTransport;
use crate::{Error, Result};

pub const TOKEN_ENV: &str = "BWK_TOKEN";
pub const BOARD_ID_ENV: &str = "BWK_BOARD_ID";
pub const API_BASE_ENV: &str = "BWK_API_BASE";

const DEFAULT_API_BASE: &str = "https://api.miro.com/v2";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything needed to reach one board.
#[derive(Debug, Clone)]
pub struct BoardConfig {
    pub token: String,
    pub board_id: String,
    pub api_base: String,
}

impl BoardConfig {
    /// Resolve from the environment. Empty values count as unset.
    pub fn from_env() -> Result<Self> {
        let token = require(TOKEN_ENV)?;
        let board_id = require(BOARD_ID_ENV)?;
        let api_base = std::env::var(API_BASE_ENV)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        Ok(Self {
            token,
            board_id,
            api_base,
        })
    }

    /// HTTP transport pointed at this board's API.
    pub fn transport(&self) -> HttpTransport {
        HttpTransport::new(&self.api_base, &self.token, REQUEST_TIMEOUT)
    }
}

fn require(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(Error::Config(format!("set {name} in the environment"))),
    }
}
