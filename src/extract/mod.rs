//! Extract stage dispatch (spec §4.4). One processor module per Extract
//! variant; adding a remote protocol binding means adding a variant plus
//! a matching processor here, not a plugin mechanism (spec §1 Non-goals).

pub mod refocus;

pub use refocus::RefocusSample;
