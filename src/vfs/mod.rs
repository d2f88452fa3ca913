pub mod node;
pub mod path;
pub mod resolver;

pub use node::{ChildEntry, ResourceKind};
pub use path::{
    decode_segment, encode_segment, is_container, parent_url, segments, validate_name,
};
pub use resolver::{ResolveResult, ResolvedPath, resolve_path};
