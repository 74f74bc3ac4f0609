//! Response planning.
//!
//! Fault directives arrive as query parameters. They are turned into an
//! ordered list of [`Step`]s that the [`writer`](crate::http::writer)
//! executes against the socket.

use std::time::Duration;

use bytes::Bytes;

use crate::http::request::FieldMap;

pub const DEFAULT_STATUS: &str = "200";
pub const DEFAULT_STATUS_TEXT: &str = "OK";
pub const CONTENT_TYPE: &str = "text/plain";

/// Named points in the exchange where a delay or a hang-up can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    /// Before the status line (`sleep_status`)
    BeforeStatus,
    /// After the status line and `Connection` header (`sleep_headers`, `close_headers`)
    AfterStatus,
    /// After the remaining headers, before the blank line (`sleep`)
    BeforeBlankLine,
    /// Between the two body halves (`sleep_body`, `close_body`)
    MidBody,
    /// After the last body byte (`sleep_close`)
    BeforeClose,
    /// Instead of reading the request body (`close_client_body`)
    BeforeRequestBody,
}

/// One unit of work in a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Block the whole server for the given time
    Pause(Checkpoint, Duration),
    /// Write these bytes
    Send(Bytes),
    /// Close the socket and write nothing more
    Abort(Checkpoint),
}

/// Fault directives read from a request's query string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Directives {
    pub respond_status: Option<String>,
    pub respond_status_text: Option<String>,
    pub sleep_status: Option<Duration>,
    pub sleep_headers: Option<Duration>,
    pub close_headers: bool,
    pub sleep: Option<Duration>,
    pub sleep_body: Option<Duration>,
    pub close_body: bool,
    pub sleep_close: Option<Duration>,
    pub close_client_body: bool,
}

impl Directives {
    /// Reads every recognised directive. Flags count as set when present,
    /// whatever their value.
    pub fn from_params(params: &FieldMap) -> Self {
        Self {
            respond_status: params.get_lower("respond_status").map(str::to_string),
            respond_status_text: params.get_lower("respond_status_text").map(str::to_string),
            sleep_status: delay(params, "sleep_status"),
            sleep_headers: delay(params, "sleep_headers"),
            close_headers: params.contains_lower("close_headers"),
            sleep: delay(params, "sleep"),
            sleep_body: delay(params, "sleep_body"),
            close_body: params.contains_lower("close_body"),
            sleep_close: delay(params, "sleep_close"),
            close_client_body: params.contains_lower("close_client_body"),
        }
    }

    pub fn status(&self) -> &str {
        self.respond_status.as_deref().unwrap_or(DEFAULT_STATUS)
    }

    pub fn status_text(&self) -> &str {
        self.respond_status_text.as_deref().unwrap_or(DEFAULT_STATUS_TEXT)
    }
}

fn delay(params: &FieldMap, name: &str) -> Option<Duration> {
    let raw = params.get_lower(name)?;

    match raw.trim().parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs >= 0.0 => Some(Duration::from_secs_f64(secs)),
        _ => {
            tracing::warn!(directive = name, value = raw, "Ignoring invalid delay");
            None
        }
    }
}

/// Body for a request path: the part after the echo prefix and an optional
/// `/`, or nothing when the path is not under the prefix.
///
/// # Example
///
/// ```
/// # use faultline::http::response::echo_body;
/// assert_eq!(echo_body("/echo/hello", "/echo"), b"hello".as_slice());
/// assert_eq!(echo_body("/other", "/echo"), b"".as_slice());
/// ```
pub fn echo_body<'a>(path: &'a str, echo_prefix: &str) -> &'a [u8] {
    match path.strip_prefix(echo_prefix) {
        Some(rest) => rest.strip_prefix('/').unwrap_or(rest).as_bytes(),
        None => &[],
    }
}

/// The ordered steps of one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsePlan {
    steps: Vec<Step>,
}

impl ResponsePlan {
    /// Lays out a response in checkpoint order: status line, optional
    /// header hang-up, entity headers, blank line, first body half,
    /// optional body hang-up, second body half.
    pub fn build(directives: &Directives, path: &str, echo_prefix: &str) -> Self {
        let mut plan = PlanBuilder::default();

        plan.pause(Checkpoint::BeforeStatus, directives.sleep_status);
        plan.send(format!(
            "HTTP/1.1 {} {}\r\nConnection: close\r\n",
            directives.status(),
            directives.status_text()
        ));

        plan.pause(Checkpoint::AfterStatus, directives.sleep_headers);
        if directives.close_headers {
            return plan.abort(Checkpoint::AfterStatus);
        }

        let body = Bytes::copy_from_slice(echo_body(path, echo_prefix));
        plan.send(format!(
            "Content-Length: {}\r\nContent-Type: {}\r\n",
            body.len(),
            CONTENT_TYPE
        ));
        plan.pause(Checkpoint::BeforeBlankLine, directives.sleep);
        plan.send("\r\n");

        let half = body.len() / 2;
        plan.send(body.slice(..half));

        plan.pause(Checkpoint::MidBody, directives.sleep_body);
        if directives.close_body {
            return plan.abort(Checkpoint::MidBody);
        }

        plan.send(body.slice(half..));
        plan.pause(Checkpoint::BeforeClose, directives.sleep_close);

        plan.finish()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn into_steps(self) -> Vec<Step> {
        self.steps
    }

    /// Every byte the plan writes, in order, ignoring pauses.
    pub fn wire_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for step in &self.steps {
            if let Step::Send(bytes) = step {
                out.extend_from_slice(bytes);
            }
        }
        out
    }

    pub fn aborts(&self) -> bool {
        matches!(self.steps.last(), Some(Step::Abort(_)))
    }
}

#[derive(Default)]
struct PlanBuilder {
    steps: Vec<Step>,
}

impl PlanBuilder {
    fn pause(&mut self, checkpoint: Checkpoint, delay: Option<Duration>) {
        if let Some(delay) = delay.filter(|d| !d.is_zero()) {
            self.steps.push(Step::Pause(checkpoint, delay));
        }
    }

    fn send(&mut self, bytes: impl Into<Bytes>) {
        let bytes = bytes.into();
        if !bytes.is_empty() {
            self.steps.push(Step::Send(bytes));
        }
    }

    fn abort(mut self, checkpoint: Checkpoint) -> ResponsePlan {
        self.steps.push(Step::Abort(checkpoint));
        self.finish()
    }

    fn finish(self) -> ResponsePlan {
        ResponsePlan { steps: self.steps }
    }
}
