pub mod config;
pub mod logging;

pub mod auth;
pub mod checksum;
pub mod control;
pub mod http;
pub mod provider;
pub mod raft;
pub mod retry;
pub mod secret;
pub mod storage;
pub mod transfer;
