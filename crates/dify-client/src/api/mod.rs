//! Endpoint methods on [`DifyClient`](crate::DifyClient), grouped by API area.

mod app;
mod audio;
mod chat;
mod completion;
mod conversations;
mod files;
mod messages;
mod workflow;
