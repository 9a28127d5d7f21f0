//! Upload intake: multipart parsing, upload validation and the prediction
//! pipeline that ties an upload to the analysis collaborator.

pub mod parser;
pub mod pipeline;
pub mod validate;
