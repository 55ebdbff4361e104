/*!
 * Hierarchical text document: model, addressing, merge and alignment.
 */

pub mod align;
pub mod merge;
pub mod model;
pub mod path;

pub use align::{align_pieces, WhitespacePlacement};
pub use merge::{merge, MergeMode, MergePolicy, Patch, PatchSet};
pub use model::{Annotations, Page, Segment, Text, Token};
pub use path::NodePath;
