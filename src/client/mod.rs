pub mod bullets;
pub mod controller;
pub mod transport;
