pub mod lookup_key;

pub use lookup_key::LookupKey;
