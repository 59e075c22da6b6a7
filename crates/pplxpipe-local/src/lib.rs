//! Stream decoding, answer extraction and the reqwest transport for `pplxpipe`.
//!
//! Pipeline, leaves first: [`frame`] turns bytes into JSON frames, [`event`] picks the fields of
//! interest, [`answer`] interprets the embedded answer document, [`citations`] renders `[n]`
//! markers, and [`accumulator`] folds everything into an [`pplxpipe_core::AskResult`].
//! [`payload`] builds the request and [`client::WebUiClient`] ties it to a transport.

pub mod accumulator;
pub mod answer;
pub mod citations;
pub mod client;
pub mod event;
pub mod frame;
pub mod json;
pub mod payload;
pub mod selftest;
pub mod transport;

pub use client::WebUiClient;
pub use transport::{TransportConfig, WebUiTransport};
