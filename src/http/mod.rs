//! HTTP protocol implementation.
//!
//! Just enough HTTP/1.x to assemble one request per connection and answer
//! it with a response that can be stalled or cut short on command. No
//! keep-alive, no chunked encoding, no pipelining.
//!
//! # Architecture
//!
//! - **`request`**: request line, methods and the two-view [`FieldMap`](request::FieldMap)
//! - **`parser`**: incremental request assembly over a growing byte buffer
//! - **`response`**: fault directives and the ordered response plan
//! - **`writer`**: executes a plan against a socket, sleeping and hanging up as told
//! - **`connection`**: one socket plus its request state, driven by the event loop
//!
//! # Request Phases
//!
//! ```text
//!        ┌─────────────────────┐
//!        │ AwaitingRequestLine │ ← Wait for the first line terminator
//!        └──────────┬──────────┘
//!                   │ Request line parsed, query params decoded
//!                   ▼
//!        ┌─────────────────────┐
//!        │   AwaitingHeaders   │ ← Consume header lines until a blank line
//!        └──────────┬──────────┘
//!                   ├─ no Content-Length ──────────────┐
//!                   ▼                                  │
//!        ┌─────────────────────┐                       │
//!        │    AwaitingBody     │ ← close_client_body → hang up
//!        └──────────┬──────────┘                       │
//!                   │ Content-Length bytes buffered    │
//!                   ▼                                  ▼
//!        ┌──────────────────────────────────────────────┐
//!        │                  Finished                    │ ← Respond once
//!        └──────────────────────────────────────────────┘
//! ```
//!
//! # Response Checkpoints
//!
//! ```text
//! sleep_status → status line + Connection: close
//!              → sleep_headers → close_headers?
//!              → Content-Length, Content-Type → sleep → blank line
//!              → first body half → sleep_body → close_body?
//!              → second body half → sleep_close → FIN
//! ```

pub mod connection;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
