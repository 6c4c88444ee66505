//! Load stage dispatch (spec §4.6).

pub mod refocus;

pub use refocus::load;
