pub mod dispatcher;
pub mod encoder;
pub mod error;
pub mod job;
pub mod pipeline;
pub mod publisher;
pub mod scheduler;
pub mod source;
pub mod transcoder;
pub mod workspace;

#[cfg(test)]
pub(crate) mod test_support;
