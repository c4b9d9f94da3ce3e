//! Path search and route assembly.
//!
//! - [`finder`]: the incremental best-first [`PathFinder`]
//! - [`assembler`]: [`RouteAssembler`], chaining finders across waypoints
//! - [`segment`]: [`PathSegment`], the legs vehicles drive along

pub mod assembler;
pub mod finder;
pub mod segment;

pub use assembler::{AssemblyStatus, RouteAssembler};
pub use finder::{ConnectionDetails, ConnectionProvider, PathFinder, SearchStatus};
pub use segment::{index_at, validate_path, PathSegment, Track};
