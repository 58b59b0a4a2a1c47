pub mod connection;
pub mod constants;
pub mod logged;
pub mod observable;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod types;
