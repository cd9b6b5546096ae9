//! HTTP control surface: `GET`/`DELETE /bridge` and `POST /config`.

pub mod completion;
pub mod routes;
pub mod server;
