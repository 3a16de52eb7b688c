//! HTTP-facing pieces of the service: form decoding, response shaping and the
//! request handler itself.

pub mod form;
pub mod reply;
pub mod request_handler;
