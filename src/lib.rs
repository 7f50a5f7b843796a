//! LTL model checking for timed automata over the zone-graph abstraction.
//!
//! A model is a network of timed automata (processes with locations, edges,
//! synchronizations, clocks and bounded integers). Its infinite behaviors
//! are abstracted into a finite zone graph, wrapped as a Kripke structure
//! whose states are labeled with atomic propositions over locations and
//! integer variables. An LTL property is checked by translating its
//! negation to a Büchi automaton and searching the product for an accepting
//! run, which doubles as a counterexample.

pub mod bdd;
pub mod buchi;
pub mod cache;
pub mod check;
pub mod dict;
pub mod dot;
pub mod emptiness;
pub mod error;
pub mod kripke;
pub mod ltl;
pub mod model;
pub mod props;
pub mod reference;
pub mod state;
pub mod table;
pub mod utils;
pub mod zg;
pub mod zone;

pub use check::{check, dump_dot, Options, Outcome};
pub use error::{Error, Result};
