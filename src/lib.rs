//! `openstage` reads USDA (text-form Universal Scene Description) and
//! reconstructs an in-memory scene graph of typed prims.
//!
//! # Modules
//!
//! - `sdf` - Scene description foundations: paths, values, properties
//! - `schema` - The closed set of typed prim schemas and their reconstructors
//! - `prim` - The typed `Prim` tree node and its metadata
//! - `stage` - `Stage` (typed output), `Layer` and `PrimSpec` (untyped output)
//! - `usda` - Text format (.usda) tokenizer, streaming parser and reader
//!
//! # Reading a stage
//!
//! ```no_run
//! use openstage::usda::{LoadState, UsdaReader};
//!
//! let source = std::fs::read_to_string("scene.usda").unwrap();
//! let mut reader = UsdaReader::new(Default::default());
//! reader.read(&source, LoadState::Toplevel).unwrap();
//! reader.reconstruct_stage().unwrap();
//! for prim in reader.stage().root_prims() {
//!     println!("{} ({})", prim.name, prim.type_name);
//! }
//! ```

pub mod error;
pub mod prim;
pub mod schema;
pub mod sdf;
pub mod stage;
pub mod usda;

pub use error::Error;
pub use half::f16;
