//! End-to-end tests against an in-memory forum and a recording channel.

mod mock_forum;
mod pipeline;
mod scheduler;
