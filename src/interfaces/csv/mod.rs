//! CSV intake of submissions and CSV reporting of request status.

pub mod request_reader;
pub mod status_writer;
