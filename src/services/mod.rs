pub mod conversation_service;
pub mod message_service;
pub mod retention_service;
pub mod session_service;
