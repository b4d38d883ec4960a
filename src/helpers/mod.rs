//! Higher-level chain operations shared by test bodies and the CLI

pub mod address;
pub mod assets;
pub mod blocks;
pub mod eth;
pub mod fees;
pub mod signer;

pub use address::{parse_address, Address};
pub use blocks::{block_details, explore_block_range, BlockDetails};
pub use fees::{fee_portions, FeePortions};
pub use signer::{Signer, SignerOrigin};
