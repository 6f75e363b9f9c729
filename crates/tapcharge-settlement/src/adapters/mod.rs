pub mod internal;
pub mod regular;
