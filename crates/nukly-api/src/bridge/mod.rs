// Bridge HTTP API
//
// The local, unencrypted HTTP surface of a Nuki Bridge. `client` handles
// transport and signing; `models` holds the JSON shapes.

pub mod client;
pub mod models;
