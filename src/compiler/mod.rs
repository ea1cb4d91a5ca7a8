pub mod core;
pub mod loader;
pub mod pairing;
pub mod serializer;
