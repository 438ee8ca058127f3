//! Command normalization, typed per-verb requests and dispatch.
pub mod dispatch;
pub mod envelope;
pub mod request;

pub use dispatch::{Dispatcher, assemble, check_response, flatten_write_result, normalize};
pub use envelope::CommandEnvelope;
pub use request::{
    BatchInsertRequest, CountRequest, DistinctRequest, EnsureIndexRequest, Fields,
    FindAndModifyRequest, FindRequest, GenericRequest, GroupRequest, InsertRequest, RemoveRequest,
    UpdateRequest,
};
