pub mod address;

pub use address::{addresses_equal, normalize_private_key, validate_evm_address};
