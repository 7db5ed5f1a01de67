mod archive_rpc_tests;
mod channel_tests;
mod health_tests;
