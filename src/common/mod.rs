//! Common infrastructure: DNS resolution.

pub mod dns;
