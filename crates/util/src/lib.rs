//! Value helpers backing the engine's capability contracts.
//!
//! - `expand`: `$` token expansion and dotted path lookup over a [`DataMap`](runbook_types::DataMap)
//! - `convert`: numeric coercion and structural assignment of untyped payloads
//! - `equivalence`: deep-equivalence assertion used by criteria comparisons

pub mod convert;
pub mod equivalence;
pub mod expand;

pub use convert::{ConversionError, as_data_map, assign_converted, to_float};
pub use equivalence::{DefaultEquivalence, EquivalenceAssertion, Validation, ValidationFailure};
pub use expand::{expand_text, expand_value, render_text, value_at_path};
