//! Arbor – typed values, labeled grids and a path-addressed tree of named nodes.
//!
//! Arbor is an in-memory data model for heterogeneous typed values, together
//! with a compact self-describing text encoding for moving them between
//! processes:
//! * A [`datatype::Value`] is one of unknown, string, number, date or grid.
//! * A [`grid::Grid`] is a rectangle of values with a header per column and a
//!   label per row.
//! * A [`tree::Tree`] owns named nodes, each carrying a map of named values,
//!   linked into a hierarchy that can be addressed with `/`-delimited paths.
//!
//! ## Modules
//! * [`datatype`] – The [`datatype::Value`] sum type, its [`datatype::Kind`]
//!   and the YYYYMMDD [`datatype::Date`].
//! * [`grid`] – Labeled two dimensional grids with resize and merge.
//! * [`tree`] – The node arena, path addressing, copy and destroy semantics.
//! * [`path`] – Parsing and joining of slash-delimited paths.
//! * [`codec`] – The dynamic-delimiter text codec shared by everything above.
//! * [`settings`] – Layered configuration read through the `config` crate.
//!
//! ## Text Codec
//! Each encoded item is a list of fields joined by a delimiter that is picked
//! per item, as the first candidate character absent from all of its fields,
//! and repeated as the first byte. Nested items pick their own delimiters, so
//! a grid of grids encodes to one printable string without any escaping.
//!
//! ## Quick Start
//! ```
//! use arbor::{tree::Tree, datatype::Value, grid::Grid};
//! let tree = Tree::new();
//! let root = tree.create_root("").unwrap();
//! tree.put_var_at_path(root, "prices/IBM/close", 55.6).unwrap();
//! let close = tree.get_var_at_path(root, "/prices/IBM/close").unwrap();
//! assert_eq!(close, Some(Value::Number(55.6)));
//!
//! let mut grid = Grid::new(2, 2).unwrap();
//! grid.set(0, 0, "IBM").unwrap();
//! let text = Value::from(grid.clone()).encode().unwrap();
//! assert_eq!(Value::decode(&text).unwrap(), Value::from(grid));
//! ```
//!
//! ## Concurrency
//! A [`tree::Tree`] can be shared between threads behind an `Arc`; every node
//! locks its own value map and child list independently. Values and grids
//! carry no locks of their own.

pub mod codec;
pub mod datatype;
pub mod error;
pub mod grid;
pub mod path;
pub mod settings;
pub mod tree;

pub use error::{ArborError, Result};
