//! Trigger ingestion: webhook verification, payload normalization and
//! repository dispatch

pub mod dispatch;
pub mod normalize;
pub mod signature;

pub use dispatch::{match_repository, RepoDispatch};
pub use normalize::{branch_from_ref, normalize, parse_payload};
pub use signature::verify;
