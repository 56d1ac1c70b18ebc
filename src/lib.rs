pub mod clients;
pub mod controller;
pub mod crd;
pub mod server;
pub mod version;
