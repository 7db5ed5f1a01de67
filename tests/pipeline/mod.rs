mod bot_tests;
mod broadcast_tests;
mod channel_update_tests;
mod history_tests;
mod postgres_tests;
mod storage_tests;
mod websocket_tests;
