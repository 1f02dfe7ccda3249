//! Session listing, creation, history and deletion.

pub mod handlers;
