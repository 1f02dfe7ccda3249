// These modules are shared by the integration tests
#![allow(dead_code)]

pub mod failing_storage;
pub mod mock_openai_server;
pub mod test_app;
