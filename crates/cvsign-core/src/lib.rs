//! Component descriptor model and normalization.
//!
//! This crate provides:
//! - The component descriptor data model (resources, sources, references,
//!   signatures, nested digests)
//! - A rule-driven normalization engine with two serialization back-ends
//!   (legacy entry format and RFC 8785 JCS)
//! - The descriptor normalisation algorithms `jsonNormalisation/v1`, `/v2`
//!   and `/v3`, including legacy extra-identity defaulting
//!
//! # Example
//!
//! ```
//! use cvsign_core::compdesc::NormalisationAlgorithm;
//! use cvsign_core::descriptor::ComponentDescriptor;
//!
//! let cd = ComponentDescriptor::new("acme.org/app", "1.0.0", "acme");
//! let bytes = NormalisationAlgorithm::JsonV3.normalize(&cd).unwrap();
//! assert!(bytes.starts_with(br#"{"component":"#));
//! ```

pub mod compdesc;
pub mod descriptor;
mod error;
pub mod normalize;

pub use compdesc::NormalisationAlgorithm;
pub use descriptor::{ComponentDescriptor, DigestSpec, NameVersion};
pub use error::{CoreError, CoreResult};
pub use normalize::{Normalization, Rule};
