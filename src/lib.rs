//! Proof-input preparation for DKIM-anchored domain-ownership proofs.
//!
//! Two independent pipelines feed one proof-input record: the header index
//! locator ([`header`]) finds the byte offsets a downstream proof circuit
//! asserts over, and the DKIM key resolver ([`dkim`]) discovers the RSA
//! modulus a domain publishes for a signing selector. The assembler
//! ([`input`]) merges both with the output of the header/signature
//! extraction collaborator ([`extract`]).
//!
//! DNS caching is the caller's responsibility. This library provides
//! a `DnsResolver` trait — implement it with caching at the resolver layer.

pub mod common;
pub mod dkim;
pub mod extract;
pub mod header;
pub mod input;
