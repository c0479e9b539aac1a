//! Control surface: request/response types mapped 1:1 onto scheduler
//! transitions, plus the HTTP-style route table.
//!
//! Every call returns as soon as the transition is applied; the outcome of
//! a validation run only shows up in logs.

use std::time::Duration;

use migrator_core::{Entity, MigratorError, MigratorErrorCode, MigratorResult, Pattern};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::scheduler::Scheduler;

pub const CODE_OK: i32 = 0;
/// The request was understood but rejected (bad pattern, bad body, unknown op).
pub const CODE_BAD_REQUEST: i32 = 4;
/// The transition could not be applied.
pub const CODE_INTERNAL: i32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ControlRequest {
    SrcOnly,
    SrcFirst,
    DstFirst,
    DstOnly,
    /// Pattern by wire name; unknown names are rejected.
    SetPattern { pattern: String },
    FullStart,
    FullStop,
    /// `interval` is the re-poll interval in milliseconds.
    IncrStart { utime: i64, interval: i64 },
    IncrStop,
    Status,
}

#[derive(Debug, Deserialize)]
struct StartIncrBody {
    utime: i64,
    interval: i64,
}

#[derive(Debug, Deserialize)]
struct SetPatternBody {
    pattern: String,
}

impl ControlRequest {
    /// Map a route and its (possibly empty) JSON body to a request.
    pub fn from_route(path: &str, body: &[u8]) -> MigratorResult<Self> {
        let route = path.trim_end_matches('/');
        let request = match route {
            "/src_only" => Self::SrcOnly,
            "/src_first" => Self::SrcFirst,
            "/dst_first" => Self::DstFirst,
            "/dst_only" => Self::DstOnly,
            "/pattern" => {
                let body: SetPatternBody = parse_body(route, body)?;
                Self::SetPattern {
                    pattern: body.pattern,
                }
            }
            "/full/start" => Self::FullStart,
            "/full/stop" => Self::FullStop,
            "/incr/start" => {
                let body: StartIncrBody = parse_body(route, body)?;
                Self::IncrStart {
                    utime: body.utime,
                    interval: body.interval,
                }
            }
            "/incr/stop" => Self::IncrStop,
            "/status" => Self::Status,
            _ => {
                return Err(MigratorError::invalid_request(format!(
                    "unknown route {path}"
                )))
            }
        };
        Ok(request)
    }
}

fn parse_body<B: for<'de> Deserialize<'de>>(route: &str, body: &[u8]) -> MigratorResult<B> {
    serde_json::from_slice(body)
        .map_err(|e| MigratorError::invalid_request(format!("{route}: bad body: {e}")))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub code: i32,
    pub msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ControlResponse {
    pub fn ok(msg: impl Into<String>) -> Self {
        Self {
            code: CODE_OK,
            msg: msg.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn from_error(err: &MigratorError) -> Self {
        let code = if err.is_rejection() {
            CODE_BAD_REQUEST
        } else {
            CODE_INTERNAL
        };
        Self {
            code,
            msg: format!("{}: {err}", err.error_code()),
            data: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == CODE_OK
    }
}

impl<T: Entity> Scheduler<T> {
    /// Apply one control request.
    pub fn handle(&self, request: ControlRequest) -> ControlResponse {
        match self.apply(request) {
            Ok(response) => response,
            Err(e) => {
                warn!(code = e.error_code(), error = %e, "control request rejected");
                ControlResponse::from_error(&e)
            }
        }
    }

    /// Route + body in, response out.
    pub fn handle_route(&self, path: &str, body: &[u8]) -> ControlResponse {
        match ControlRequest::from_route(path, body) {
            Ok(request) => self.handle(request),
            Err(e) => ControlResponse::from_error(&e),
        }
    }

    /// JSON request (`{"op": "..."}`) in, JSON response out.
    pub fn handle_json(&self, body: &str) -> String {
        let response = match serde_json::from_str::<ControlRequest>(body) {
            Ok(request) => self.handle(request),
            Err(e) => ControlResponse::from_error(&MigratorError::invalid_request(e.to_string())),
        };
        serde_json::to_string(&response).unwrap_or_else(|e| {
            format!(r#"{{"code":{CODE_INTERNAL},"msg":"encode response: {e}"}}"#)
        })
    }

    fn apply(&self, request: ControlRequest) -> MigratorResult<ControlResponse> {
        let response = match request {
            ControlRequest::SrcOnly => self.switch(Pattern::SrcOnly)?,
            ControlRequest::SrcFirst => self.switch(Pattern::SrcFirst)?,
            ControlRequest::DstFirst => self.switch(Pattern::DstFirst)?,
            ControlRequest::DstOnly => self.switch(Pattern::DstOnly)?,
            ControlRequest::SetPattern { pattern } => self.switch(pattern.parse()?)?,
            ControlRequest::FullStart => {
                let ticket = self.start_full()?;
                ControlResponse::ok("full validation started").with_data(json!({
                    "generation": ticket.generation,
                    "direction": ticket.direction,
                }))
            }
            ControlRequest::FullStop => stopped("full", self.stop_full()?),
            ControlRequest::IncrStart { utime, interval } => {
                let interval = u64::try_from(interval).map_err(|_| {
                    MigratorError::invalid_request(format!("negative interval {interval}"))
                })?;
                let ticket = self.start_incremental(utime, Duration::from_millis(interval))?;
                ControlResponse::ok("incremental validation started").with_data(json!({
                    "generation": ticket.generation,
                    "direction": ticket.direction,
                }))
            }
            ControlRequest::IncrStop => stopped("incremental", self.stop_incremental()?),
            ControlRequest::Status => {
                let status = self.status()?;
                ControlResponse::ok("OK").with_data(serde_json::to_value(status)?)
            }
        };
        Ok(response)
    }

    fn switch(&self, pattern: Pattern) -> MigratorResult<ControlResponse> {
        let previous = self.set_pattern(pattern)?;
        Ok(ControlResponse::ok("OK").with_data(json!({
            "pattern": pattern,
            "previous": previous,
        })))
    }
}

fn stopped(kind: &str, was_running: bool) -> ControlResponse {
    let msg = if was_running {
        format!("{kind} validation stopped")
    } else {
        format!("no {kind} validation running")
    };
    ControlResponse::ok(msg)
}
