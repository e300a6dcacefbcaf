//! A library holding a [Metamath](http://us.metamath.org/#faq) proof
//! database in memory.  Loading, the analysis passes and insertions are in
//! the `database` module, as is a discussion of the data representation;
//! front ends talk to a [`Workbench`], in the `service` module.

pub use filetime;
pub use fnv;
pub use regex;

mod bit_set;
mod util;

pub mod axiom_use;
pub mod database;
pub mod diag;
pub mod formula;
pub mod grammar;
pub mod lexer;
pub mod line_cache;
pub mod mmp;
pub mod mmpck;
pub mod nameck;
pub mod outline;
pub mod parser;
pub mod progress;
pub mod proof;
pub mod scopeck;
pub mod search;
pub mod service;
pub mod statement;
pub mod typesetting;
pub mod verify;

pub use database::Database;
pub use service::Workbench;

#[cfg(test)]
mod grammar_tests;

#[cfg(test)]
mod lexer_tests;

#[cfg(test)]
mod mmp_tests;

#[cfg(test)]
mod mmpck_tests;



#[cfg(test)]
mod service_tests;
