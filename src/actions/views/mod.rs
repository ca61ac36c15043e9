pub mod admin;
pub mod consultation;

pub use admin::*;
pub use consultation::*;
