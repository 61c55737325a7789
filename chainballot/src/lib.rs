#[macro_use]
extern crate serde;

mod codec;
mod config;
mod definition;
mod error;
mod identity;
mod ledger;
mod matcher;
mod parser;
mod reader;
mod roll;
mod serde_hex;
mod tally;
mod util;
mod validation;
mod writer;

pub use codec::*;
pub use config::*;
pub use definition::*;
pub use error::*;
pub use identity::*;
pub use ledger::*;
pub use matcher::*;
pub use parser::*;
pub use reader::*;
pub use roll::*;
pub use serde_hex::*;
pub use tally::*;
pub use util::*;
pub use validation::*;
pub use writer::*;

#[cfg(test)]
mod tests;
