//! Related-communities graph: traversal, canonical output, serializers.
//!
//! [`TraversalContext`] walks the corpus from a seed and fills one
//! [`GraphOutput`]; the DOT and JSON writers are stateless views over it.

mod output;
mod sampling;
mod serialize;
mod traversal;

pub use output::{display_size, GraphOutput, OutputLink, OutputNode};
pub use sampling::BreadthSampler;
pub use serialize::{render_image, to_document, to_dot, DocumentLink, DocumentNode, DotWriter, GraphDocument};
pub use traversal::{TraversalContext, TraversalSettings, TraversalStats};
