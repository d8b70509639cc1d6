/// Link state and failure classification for remote calls.
pub mod connectivity;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Match lifecycle operations exposed over HTTP.
pub mod match_service;
/// Durable queue of remote operations.
pub mod offline_queue;
/// Per-match orchestration of rules, local persistence and queueing.
pub mod scoreboard;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Queue inspection and manual drains.
pub mod sync_service;
/// Remote gateway supervisor driving the connectivity flag.
pub mod sync_supervisor;
/// Background task draining the queue.
pub mod sync_worker;
