//! Policy corpus access and eligibility resolution.
//!
//! Flow for one decision:
//! 1. `PolicyRetriever::search()` — ranked candidate fragments for the SKU
//! 2. literal SKU filter, then `all_fragments()` exhaustive fallback
//! 3. window extraction from the first matching fragment
//! 4. natural-language fallback when no window pattern is present
//!
//! The retriever is a capability boundary: the in-memory index in `corpus`
//! is the default backend, an external vector store is a drop-in replacement.

pub mod corpus;
pub mod resolver;
pub mod retriever;

pub use corpus::InMemoryPolicyIndex;
pub use resolver::{EligibilityResolver, EligibilityVerdict, ResolutionPath};
pub use retriever::{PolicyFragment, PolicyRetriever};
